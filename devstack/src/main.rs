//! `devstack`: bootstrap a Laravel + Vite development stack on Docker Compose.
//!
//! Generates `docker-compose.yml` and `Dockerfile` when missing, scaffolds
//! `backend/` and `frontend/` through throwaway containers, wires the backend
//! to the chosen database and launches everything with `compose up -d`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use devstack::core::endpoints::{endpoints, render_summary};
use devstack::core::persistence::Persistence;
use devstack::exit_codes;
use devstack::io::config::{StackConfig, load_config};
use devstack::io::paths::StackPaths;
use devstack::io::preflight::{SystemProbe, preflight};
use devstack::io::toolchain::{DockerToolchain, ToolchainSettings};
use devstack::logging;
use devstack::up::{OwnershipOutcome, run_up, stack_topology};

#[derive(Parser)]
#[command(
    name = "devstack",
    version,
    about = "Bootstrap a local Laravel + Vite development stack on Docker Compose"
)]
struct Cli {
    /// Project root to provision.
    #[arg(short = 'C', long, global = true, default_value = ".")]
    root: PathBuf,

    /// Config file (default: `<root>/devstack.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database to build the stack around: `document` (MongoDB) or `relational` (MySQL).
    #[arg(long, global = true)]
    persistence: Option<Persistence>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Provision and launch the stack (default).
    Up(UpArgs),
    /// Only check that Docker and Compose are available.
    Check,
    /// Print the endpoints the stack publishes.
    Endpoints {
        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Default)]
struct UpArgs {
    /// Leave generated files owned by whoever the containers ran as.
    #[arg(long)]
    skip_chown: bool,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            exit_codes::FAILED
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let cfg = load_effective_config(&cli)?;
    match cli.command.unwrap_or(Command::Up(UpArgs::default())) {
        Command::Up(args) => cmd_up(&cli.root, cfg, &args),
        Command::Check => cmd_check(),
        Command::Endpoints { json } => cmd_endpoints(&cfg, json),
    }
}

/// Config file merged with CLI overrides.
fn load_effective_config(cli: &Cli) -> Result<StackConfig> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| StackPaths::new(&cli.root).config_path);
    let mut cfg = load_config(&path)?;
    if let Some(persistence) = cli.persistence {
        cfg.persistence = persistence;
    }
    Ok(cfg)
}

fn cmd_up(root: &Path, mut cfg: StackConfig, args: &UpArgs) -> Result<i32> {
    if args.skip_chown {
        cfg.ownership.enabled = false;
    }
    let settings = ToolchainSettings {
        timeout: cfg.command_timeout(),
        output_limit_bytes: cfg.output_limit_bytes,
        privilege_command: cfg.ownership.privilege_command.clone(),
    };
    let report = run_up(root, &cfg, &SystemProbe, |found, paths| {
        DockerToolchain::new(paths.clone(), found.compose.clone(), settings)
    })?;

    println!();
    println!("Stack is up ({}):", cfg.persistence);
    print!("{}", render_summary(&report.endpoints));

    if let OwnershipOutcome::Failed { error } = &report.ownership {
        eprintln!("error: the stack is running but fixing file ownership failed: {error}");
        return Ok(exit_codes::OWNERSHIP_FAILED);
    }
    Ok(exit_codes::OK)
}

fn cmd_check() -> Result<i32> {
    let found = preflight(&SystemProbe)?;
    println!("docker: {}", found.runtime.display());
    println!("compose: {}", found.compose);
    Ok(exit_codes::OK)
}

fn cmd_endpoints(cfg: &StackConfig, json: bool) -> Result<i32> {
    print!("{}", endpoints_output(cfg, json)?);
    Ok(exit_codes::OK)
}

fn endpoints_output(cfg: &StackConfig, json: bool) -> Result<String> {
    let announced = endpoints(&stack_topology(cfg));
    if !json {
        return Ok(render_summary(&announced));
    }
    let mut payload =
        serde_json::to_string_pretty(&announced).context("serialize endpoints json")?;
    payload.push('\n');
    Ok(payload)
}
