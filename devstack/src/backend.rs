//! Backend initialization.
//!
//! A fresh directory is scaffolded, wired to the stack's services and
//! prepared for the chosen store:
//! `Uninitialized -> Scaffolding -> Configured -> Ready`.
//!
//! An existing project only gets its environment re-synced and, if the
//! dependency directory is missing, one install:
//! `Existing -> SyncingEnv -> Ready`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

use crate::core::config_patch::register_connection;
use crate::core::env_file::EnvFile;
use crate::core::persistence::{
    MONGODB_DRIVER_PACKAGE, Persistence, backend_env_overrides, mongodb_connection_profile,
};
use crate::io::materialize::{WriteOutcome, write_if_absent};
use crate::io::paths::StackPaths;
use crate::io::toolchain::{BackendTasks, DependencyInstaller, Project, ProjectScaffolder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendState {
    /// No `composer.json` yet.
    Uninitialized,
    Scaffolding,
    /// Environment and persistence wiring applied.
    Configured,
    /// A project was already present.
    Existing,
    SyncingEnv,
    Ready,
}

/// What the backend initializer did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendOutcome {
    /// States visited, in order.
    pub trace: Vec<BackendState>,
    /// Whether `.env` was rewritten.
    pub env_synced: bool,
    /// Whether `composer install` ran.
    pub installed_dependencies: bool,
}

impl BackendOutcome {
    pub fn scaffolded(&self) -> bool {
        self.trace.contains(&BackendState::Scaffolding)
    }
}

/// Bring `backend/` to the ready state for `persistence`.
pub fn initialize_backend<T>(
    paths: &StackPaths,
    persistence: Persistence,
    tools: &T,
) -> Result<BackendOutcome>
where
    T: ProjectScaffolder + DependencyInstaller + BackendTasks,
{
    let mut outcome = BackendOutcome {
        trace: Vec::new(),
        env_synced: false,
        installed_dependencies: false,
    };

    if paths.backend_manifest.exists() {
        outcome.trace.push(BackendState::Existing);
        refresh_existing(paths, persistence, tools, &mut outcome)?;
    } else {
        outcome.trace.push(BackendState::Uninitialized);
        provision_fresh(paths, persistence, tools, &mut outcome)?;
    }

    outcome.trace.push(BackendState::Ready);
    info!(trace = ?outcome.trace, "backend ready");
    Ok(outcome)
}

fn provision_fresh<T>(
    paths: &StackPaths,
    persistence: Persistence,
    tools: &T,
    outcome: &mut BackendOutcome,
) -> Result<()>
where
    T: ProjectScaffolder + DependencyInstaller + BackendTasks,
{
    outcome.trace.push(BackendState::Scaffolding);
    tools
        .scaffold(Project::Backend)
        .context("scaffold backend project")?;
    if !paths.backend_manifest.exists() {
        bail!(
            "backend scaffold finished but {} is missing",
            paths.backend_manifest.display()
        );
    }

    derive_env_file(paths)?;
    outcome.env_synced = sync_env_file(&paths.backend_env, persistence)?;
    outcome.trace.push(BackendState::Configured);

    tools
        .generate_app_key()
        .context("generate backend application key")?;
    configure_persistence(paths, persistence, tools)
}

fn refresh_existing<T>(
    paths: &StackPaths,
    persistence: Persistence,
    tools: &T,
    outcome: &mut BackendOutcome,
) -> Result<()>
where
    T: DependencyInstaller,
{
    outcome.trace.push(BackendState::SyncingEnv);
    if paths.backend_env.exists() {
        outcome.env_synced = sync_env_file(&paths.backend_env, persistence)?;
    } else {
        warn!(path = %paths.backend_env.display(), "no backend .env, skipping env sync");
    }

    if !paths.backend_vendor.exists() {
        tools
            .install(Project::Backend)
            .context("install backend dependencies")?;
        outcome.installed_dependencies = true;
    }
    Ok(())
}

/// Create `.env` from `.env.example` when the project has none.
pub fn derive_env_file(paths: &StackPaths) -> Result<WriteOutcome> {
    let template = match fs::read_to_string(&paths.backend_env_example) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            warn!(
                path = %paths.backend_env_example.display(),
                "no .env.example, starting from an empty .env"
            );
            String::new()
        }
        Err(err) => {
            return Err(err).with_context(|| {
                format!("read {}", paths.backend_env_example.display())
            });
        }
    };
    write_if_absent(&paths.backend_env, &template)
}

/// Rewrite the service-wiring keys of `env_path`. Writes only when something changed.
pub fn sync_env_file(env_path: &Path, persistence: Persistence) -> Result<bool> {
    let text =
        fs::read_to_string(env_path).with_context(|| format!("read {}", env_path.display()))?;
    let mut env = EnvFile::parse(&text);
    if !env.apply(&backend_env_overrides(persistence)) {
        debug!(path = %env_path.display(), "env already in sync");
        return Ok(false);
    }
    fs::write(env_path, env.render()).with_context(|| format!("write {}", env_path.display()))?;
    info!(path = %env_path.display(), persistence = %persistence, "env synced");
    Ok(true)
}

/// Store-specific setup after the scaffold is wired.
pub fn configure_persistence<T>(
    paths: &StackPaths,
    persistence: Persistence,
    tools: &T,
) -> Result<()>
where
    T: DependencyInstaller + BackendTasks,
{
    match persistence {
        Persistence::Document => {
            tools
                .add_package(Project::Backend, MONGODB_DRIVER_PACKAGE)
                .context("add MongoDB driver")?;
            patch_database_config(&paths.backend_database_config, persistence)
        }
        Persistence::Relational => tools.migrate().context("run database migrations"),
    }
}

fn patch_database_config(path: &Path, persistence: Persistence) -> Result<()> {
    let source = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let (patched, report) =
        register_connection(&source, persistence.driver(), &mongodb_connection_profile())
            .with_context(|| format!("patch {}", path.display()))?;
    if report.changed() {
        fs::write(path, patched).with_context(|| format!("write {}", path.display()))?;
    }
    debug!(?report, path = %path.display(), "database config patched");
    Ok(())
}
