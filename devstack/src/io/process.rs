//! Helpers for running child processes with timeouts and bounded output.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

type LogSink = Arc<Option<Mutex<BufWriter<File>>>>;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    /// Last `max_lines` non-empty lines of stderr (stdout if stderr is empty).
    pub fn tail(&self, max_lines: usize) -> String {
        let source = if self.stderr.iter().all(u8::is_ascii_whitespace) {
            &self.stdout
        } else {
            &self.stderr
        };
        let text = String::from_utf8_lossy(source);
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = lines.len().saturating_sub(max_lines);
        lines[start..].join("\n")
    }
}

/// Render `cmd` as a shell-like string for diagnostics.
pub fn describe(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().into_owned()];
    parts.extend(cmd.get_args().map(|arg| arg.to_string_lossy().into_owned()));
    parts.join(" ")
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    run(cmd, timeout, output_limit_bytes, Arc::new(None))
}

/// Like [`run_command_with_timeout`], but every stdout/stderr line is also written to
/// `log_path` as it arrives. The log holds the full output regardless of the memory limit.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes, log = %log_path.display()))]
pub fn run_command_with_log(
    cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
    log_path: &Path,
) -> Result<CommandOutput> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create log dir {}", parent.display()))?;
    }
    let mut file = File::create(log_path)
        .with_context(|| format!("create log file {}", log_path.display()))?;
    writeln!(file, "$ {}", describe(&cmd))
        .with_context(|| format!("write log file {}", log_path.display()))?;
    let sink = Arc::new(Some(Mutex::new(BufWriter::new(file))));
    run(cmd, timeout, output_limit_bytes, sink)
}

fn run(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
    sink: LogSink,
) -> Result<CommandOutput> {
    // Own process group, so a timeout also reaches grandchildren holding the pipes.
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0);

    debug!(command = %describe(&cmd), "spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).with_context(|| format!("spawn `{}`", describe(&cmd)));
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_sink = sink.clone();
    let stderr_sink = sink.clone();
    let stdout_handle =
        thread::spawn(move || read_stream_limited(stdout, output_limit_bytes, stdout_sink));
    let stderr_handle =
        thread::spawn(move || read_stream_limited(stderr, output_limit_bytes, stderr_sink));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            kill_process_group(&mut child)?;
            child.wait().context("wait command after kill")?
        }
    };

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if let Some(ref mutex) = *sink
        && let Ok(mut writer) = mutex.lock()
        && let Err(e) = writer.flush()
    {
        warn!(err = %e, "failed to flush command log");
    }

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

/// SIGKILL the child's whole process group; falls back to the child alone.
fn kill_process_group(child: &mut Child) -> Result<()> {
    let pgid = i32::try_from(child.id()).context("child pid out of range")?;
    if let Err(err) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        warn!(err = %err, "killpg failed, killing the child only");
        child.kill().context("kill command")?;
    }
    Ok(())
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

/// Read a stream line by line, keeping at most `limit` bytes and copying every line to `sink`.
fn read_stream_limited<R: Read>(
    reader: R,
    limit: usize,
    sink: LogSink,
) -> Result<(Vec<u8>, usize)> {
    let mut reader = BufReader::new(reader);
    let mut collected = Vec::new();
    let mut truncated = 0usize;

    loop {
        let mut line = Vec::new();
        let n = reader.read_until(b'\n', &mut line).context("read output")?;
        if n == 0 {
            break;
        }

        if let Some(ref mutex) = *sink
            && let Ok(mut writer) = mutex.lock()
            && let Err(e) = writer.write_all(&line)
        {
            warn!(err = %e, "failed to write command log");
        }

        let remaining = limit.saturating_sub(collected.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            collected.extend_from_slice(&line[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((collected, truncated))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_output_and_status() {
        let out = run_command_with_timeout(
            sh("echo hello; echo oops >&2; exit 3"),
            Duration::from_secs(10),
            1024,
        )
        .expect("run");
        assert!(!out.success());
        assert_eq!(out.status.code(), Some(3));
        assert_eq!(String::from_utf8_lossy(&out.stdout), "hello\n");
        assert_eq!(out.tail(5), "oops");
    }

    #[test]
    fn truncates_beyond_limit() {
        let out = run_command_with_timeout(sh("printf 0123456789"), Duration::from_secs(10), 4)
            .expect("run");
        assert!(out.success());
        assert_eq!(out.stdout, b"0123");
        assert_eq!(out.stdout_truncated, 6);
    }

    #[test]
    fn kills_on_timeout() {
        let out = run_command_with_timeout(sh("exec sleep 5"), Duration::from_millis(200), 1024)
            .expect("run");
        assert!(out.timed_out);
        assert!(!out.success());
    }

    #[test]
    fn timeout_also_stops_grandchildren() {
        let started = std::time::Instant::now();
        let out = run_command_with_timeout(
            sh("sleep 4; echo late"),
            Duration::from_millis(200),
            1024,
        )
        .expect("run");
        assert!(out.timed_out);
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "returned after {:?}",
            started.elapsed()
        );
        assert!(out.stdout.is_empty());
    }

    #[test]
    fn log_receives_command_line_and_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = temp.path().join("logs").join("step.log");
        let cmd = sh("echo one; echo two >&2");
        let out = run_command_with_log(cmd, Duration::from_secs(10), 1024, &log).expect("run");
        assert!(out.success());
        let contents = std::fs::read_to_string(&log).expect("read log");
        assert!(contents.starts_with("$ sh -c echo one; echo two >&2\n"));
        assert!(contents.contains("one\n"));
        assert!(contents.contains("two\n"));
    }

    #[test]
    fn describe_joins_program_and_args() {
        let mut cmd = Command::new("docker");
        cmd.args(["compose", "up", "-d"]);
        assert_eq!(describe(&cmd), "docker compose up -d");
    }
}
