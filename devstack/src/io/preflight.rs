//! Preflight: locate the container runtime and the compose CLI.
//!
//! Runs before anything touches the filesystem. A missing runtime or compose
//! CLI aborts the whole procedure.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Result, bail};
use tracing::{debug, info};

use super::process::run_command_with_timeout;

pub const RUNTIME_BINARY: &str = "docker";
pub const LEGACY_COMPOSE_BINARY: &str = "docker-compose";

const PROBE_TIMEOUT: Duration = Duration::from_secs(15);
const PROBE_OUTPUT_LIMIT: usize = 16 * 1024;

/// How the compose CLI is invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposeForm {
    /// `docker compose ...`
    Plugin { docker: PathBuf },
    /// `docker-compose ...`
    Standalone { binary: PathBuf },
}

impl ComposeForm {
    /// A `Command` ready to receive compose arguments.
    pub fn command(&self) -> Command {
        match self {
            ComposeForm::Plugin { docker } => {
                let mut cmd = Command::new(docker);
                cmd.arg("compose");
                cmd
            }
            ComposeForm::Standalone { binary } => Command::new(binary),
        }
    }
}

impl fmt::Display for ComposeForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComposeForm::Plugin { .. } => f.write_str("docker compose (plugin)"),
            ComposeForm::Standalone { .. } => f.write_str("docker-compose (standalone)"),
        }
    }
}

/// Tools found by preflight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preflight {
    pub runtime: PathBuf,
    pub compose: ComposeForm,
}

/// Looks up executables on the host.
pub trait ToolProbe {
    /// Resolve `name` on `PATH`.
    fn locate(&self, name: &str) -> Option<PathBuf>;
    /// Whether `<docker> compose version` succeeds.
    fn compose_plugin_available(&self, docker: &Path) -> bool;
}

/// Probe backed by `PATH` lookup and a `docker compose version` call.
pub struct SystemProbe;

impl ToolProbe for SystemProbe {
    fn locate(&self, name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }

    fn compose_plugin_available(&self, docker: &Path) -> bool {
        let mut cmd = Command::new(docker);
        cmd.args(["compose", "version"]);
        match run_command_with_timeout(cmd, PROBE_TIMEOUT, PROBE_OUTPUT_LIMIT) {
            Ok(output) => output.success(),
            Err(err) => {
                debug!(err = %err, "compose plugin probe failed");
                false
            }
        }
    }
}

/// Verify the runtime and a compose form are available. Prefers the plugin form.
pub fn preflight<P: ToolProbe>(probe: &P) -> Result<Preflight> {
    let Some(runtime) = probe.locate(RUNTIME_BINARY) else {
        bail!("{RUNTIME_BINARY} is not installed or not on PATH; install Docker and retry");
    };
    debug!(runtime = %runtime.display(), "found container runtime");

    let compose = if probe.compose_plugin_available(&runtime) {
        ComposeForm::Plugin {
            docker: runtime.clone(),
        }
    } else if let Some(binary) = probe.locate(LEGACY_COMPOSE_BINARY) {
        ComposeForm::Standalone { binary }
    } else {
        bail!(
            "neither `{RUNTIME_BINARY} compose` nor `{LEGACY_COMPOSE_BINARY}` is available; \
             install Docker Compose and retry"
        );
    };
    info!(compose = %compose, "preflight passed");
    Ok(Preflight { runtime, compose })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeProbe;

    #[test]
    fn prefers_plugin_form() {
        let found = preflight(&FakeProbe::full()).expect("preflight");
        assert_eq!(
            found.compose,
            ComposeForm::Plugin {
                docker: PathBuf::from("/usr/bin/docker")
            }
        );
        let cmd = found.compose.command();
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, vec!["compose"]);
    }

    #[test]
    fn falls_back_to_standalone_binary() {
        let found = preflight(&FakeProbe::legacy_compose()).expect("preflight");
        assert_eq!(
            found.compose,
            ComposeForm::Standalone {
                binary: PathBuf::from("/usr/bin/docker-compose")
            }
        );
        assert_eq!(found.compose.to_string(), "docker-compose (standalone)");
    }

    #[test]
    fn missing_runtime_is_fatal() {
        let err = preflight(&FakeProbe::without_docker()).unwrap_err();
        assert!(err.to_string().contains("docker is not installed"));
    }

    #[test]
    fn missing_compose_is_fatal() {
        let err = preflight(&FakeProbe::without_compose()).unwrap_err();
        assert!(err.to_string().contains("neither `docker compose` nor `docker-compose`"));
    }
}
