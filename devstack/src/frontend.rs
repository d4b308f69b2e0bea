//! Frontend initialization: scaffold once, point it at the API, install.

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::io::materialize::{WriteOutcome, write_if_absent};
use crate::io::paths::StackPaths;
use crate::io::toolchain::{DependencyInstaller, Project, ProjectScaffolder};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontendOutcome {
    pub scaffolded: bool,
    /// `frontend/.env` handling; `None` when the project already existed.
    pub env_file: Option<WriteOutcome>,
    pub installed: bool,
}

/// `frontend/.env` contents pointing the dev server at `backend_url`.
pub fn frontend_env(backend_url: &str) -> String {
    format!("VITE_API_URL={backend_url}\n")
}

/// Scaffold `frontend/` when it has no manifest, then install its dependencies.
pub fn initialize_frontend<T>(
    paths: &StackPaths,
    backend_url: &str,
    tools: &T,
) -> Result<FrontendOutcome>
where
    T: ProjectScaffolder + DependencyInstaller,
{
    let mut outcome = FrontendOutcome {
        scaffolded: false,
        env_file: None,
        installed: false,
    };

    if !paths.frontend_manifest.exists() {
        tools
            .scaffold(Project::Frontend)
            .context("scaffold frontend project")?;
        outcome.scaffolded = true;
        outcome.env_file = Some(write_if_absent(
            &paths.frontend_env,
            &frontend_env(backend_url),
        )?);
    }

    if paths.frontend_manifest.exists() {
        tools
            .install(Project::Frontend)
            .context("install frontend dependencies")?;
        outcome.installed = true;
    } else {
        warn!(
            path = %paths.frontend_manifest.display(),
            "no frontend manifest after scaffold, skipping install"
        );
    }
    info!(?outcome, "frontend ready");
    Ok(outcome)
}
