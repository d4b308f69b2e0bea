//! Orchestration for `devstack up`.
//!
//! Steps run strictly in order and stop at the first failure. Only the
//! ownership post-step may fail without aborting; its outcome is reported
//! so the caller can pick a distinct exit code.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::backend::{BackendOutcome, initialize_backend};
use crate::core::endpoints::{Endpoint, endpoints};
use crate::core::topology::{BACKEND_SERVICE, Topology};
use crate::frontend::{FrontendOutcome, initialize_frontend};
use crate::io::config::StackConfig;
use crate::io::materialize::{Materialized, WriteOutcome, materialize};
use crate::io::ownership::{Owner, invoking_owner, ownership_targets};
use crate::io::paths::StackPaths;
use crate::io::preflight::{Preflight, ToolProbe, preflight};
use crate::io::render::render_stack;
use crate::io::toolchain::Toolchain;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnershipOutcome {
    Fixed { owner: Owner, paths: Vec<PathBuf> },
    Disabled,
    Failed { error: String },
}

/// What `devstack up` did, step by step.
#[derive(Debug, Clone)]
pub struct UpReport {
    pub compose: String,
    pub materialized: Materialized,
    pub backend: BackendOutcome,
    pub frontend: FrontendOutcome,
    pub ownership: OwnershipOutcome,
    pub endpoints: Vec<Endpoint>,
}

impl UpReport {
    pub fn ownership_failed(&self) -> bool {
        matches!(self.ownership, OwnershipOutcome::Failed { .. })
    }
}

/// Provision and launch the stack rooted at `root`.
///
/// `connect` builds the toolchain once preflight has found the compose CLI;
/// nothing is written before preflight passes.
pub fn run_up<P, T, F>(root: &Path, cfg: &StackConfig, probe: &P, connect: F) -> Result<UpReport>
where
    P: ToolProbe,
    T: Toolchain,
    F: FnOnce(&Preflight, &StackPaths) -> T,
{
    let found = preflight(probe)?;
    progress(&format!("using {}", found.compose));

    let paths = StackPaths::new(root);
    let topology = stack_topology(cfg);
    let rendered = render_stack(&topology)?;
    let materialized = materialize(&paths, &rendered)?;
    announce_write("docker-compose.yml", materialized.compose);
    announce_write("Dockerfile", materialized.dockerfile);
    for path in &materialized.drifted {
        progress(&format!(
            "{} differs from the current configuration; delete it to regenerate",
            path.display()
        ));
    }

    let tools = connect(&found, &paths);

    progress("building backend image");
    tools
        .build_image(BACKEND_SERVICE)
        .context("build backend image")?;

    progress(&format!("initializing backend ({})", cfg.persistence));
    let backend = initialize_backend(&paths, cfg.persistence, &tools)?;

    progress("initializing frontend");
    let frontend = initialize_frontend(&paths, &topology.backend_url(), &tools)?;

    progress("starting containers");
    tools.up_detached().context("start the stack")?;

    let ownership = fix_ownership(&paths, cfg, &tools);

    Ok(UpReport {
        compose: found.compose.to_string(),
        materialized,
        backend,
        frontend,
        ownership,
        endpoints: endpoints(&topology),
    })
}

/// Topology described by `cfg`; shared by `up` and `endpoints`.
pub fn stack_topology(cfg: &StackConfig) -> Topology {
    Topology::new(&cfg.project_name, cfg.persistence, cfg.ports())
}

fn fix_ownership<T: Toolchain>(
    paths: &StackPaths,
    cfg: &StackConfig,
    tools: &T,
) -> OwnershipOutcome {
    if !cfg.ownership.enabled {
        info!("ownership fixup disabled");
        return OwnershipOutcome::Disabled;
    }
    let owner = invoking_owner();
    progress(&format!("handing files back to {owner}"));
    let result = ownership_targets(paths).and_then(|targets| {
        tools.chown_recursive(owner, &targets)?;
        Ok(targets)
    });
    match result {
        Ok(paths) => OwnershipOutcome::Fixed { owner, paths },
        Err(err) => {
            warn!(err = %format!("{err:#}"), "ownership fixup failed");
            OwnershipOutcome::Failed {
                error: format!("{err:#}"),
            }
        }
    }
}

fn announce_write(name: &str, outcome: WriteOutcome) {
    match outcome {
        WriteOutcome::Created => progress(&format!("created {name}")),
        WriteOutcome::Skipped => progress(&format!("{name} exists, skipping")),
    }
}

fn progress(message: &str) {
    println!("==> {message}");
}
