//! Write-if-absent materialization of the project layout.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::paths::StackPaths;
use super::render::RenderedStack;

/// Whether a generated file was written or left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Skipped,
}

/// Outcome of materializing the two generated documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Materialized {
    pub compose: WriteOutcome,
    pub dockerfile: WriteOutcome,
    /// Kept files whose contents no longer match the current configuration.
    pub drifted: Vec<PathBuf>,
}

/// Create `backend/` and `frontend/` and write generated files that are missing.
///
/// Existing files are never touched, so user edits survive re-runs. Kept files
/// that differ from what would be rendered now are reported in `drifted`.
pub fn materialize(paths: &StackPaths, rendered: &RenderedStack) -> Result<Materialized> {
    create_dir(&paths.backend_dir)?;
    create_dir(&paths.frontend_dir)?;

    let mut drifted = Vec::new();
    let compose = write_if_absent(&paths.compose_path, &rendered.compose)?;
    check_drift(&paths.compose_path, &rendered.compose, compose, &mut drifted)?;
    let dockerfile = write_if_absent(&paths.dockerfile_path, &rendered.dockerfile)?;
    check_drift(&paths.dockerfile_path, &rendered.dockerfile, dockerfile, &mut drifted)?;
    Ok(Materialized {
        compose,
        dockerfile,
        drifted,
    })
}

fn check_drift(
    path: &Path,
    expected: &str,
    outcome: WriteOutcome,
    drifted: &mut Vec<PathBuf>,
) -> Result<()> {
    if outcome == WriteOutcome::Created {
        return Ok(());
    }
    let current = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    if current != expected.as_bytes() {
        warn!(
            path = %path.display(),
            "kept file differs from the current configuration; delete it to regenerate"
        );
        drifted.push(path.to_path_buf());
    }
    Ok(())
}

pub fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

/// Write `contents` to `path` only if nothing exists there yet.
pub fn write_if_absent(path: &Path, contents: &str) -> Result<WriteOutcome> {
    if let Some(parent) = path.parent() {
        create_dir(parent)?;
    }
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            debug!(path = %path.display(), "exists, skipping");
            return Ok(WriteOutcome::Skipped);
        }
        Err(err) => return Err(err).with_context(|| format!("create {}", path.display())),
    };
    file.write_all(contents.as_bytes())
        .with_context(|| format!("write {}", path.display()))?;
    debug!(path = %path.display(), bytes = contents.len(), "created");
    Ok(WriteOutcome::Created)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered() -> RenderedStack {
        RenderedStack {
            compose: "services: {}\n".to_string(),
            dockerfile: "FROM scratch\n".to_string(),
        }
    }

    #[test]
    fn creates_layout_in_empty_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = StackPaths::new(temp.path());

        let outcome = materialize(&paths, &rendered()).expect("materialize");
        assert_eq!(outcome.compose, WriteOutcome::Created);
        assert_eq!(outcome.dockerfile, WriteOutcome::Created);
        assert!(paths.backend_dir.is_dir());
        assert!(paths.frontend_dir.is_dir());
        assert_eq!(
            fs::read_to_string(&paths.dockerfile_path).expect("read"),
            "FROM scratch\n"
        );
    }

    #[test]
    fn existing_files_are_left_untouched() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = StackPaths::new(temp.path());
        fs::write(&paths.compose_path, "# edited by hand\n").expect("seed compose");

        let outcome = materialize(&paths, &rendered()).expect("materialize");
        assert_eq!(outcome.compose, WriteOutcome::Skipped);
        assert_eq!(outcome.dockerfile, WriteOutcome::Created);
        assert_eq!(
            fs::read_to_string(&paths.compose_path).expect("read"),
            "# edited by hand\n"
        );

        let again = materialize(&paths, &rendered()).expect("rerun");
        assert_eq!(again.compose, WriteOutcome::Skipped);
        assert_eq!(again.dockerfile, WriteOutcome::Skipped);
        assert_eq!(again.drifted, vec![paths.compose_path.clone()]);
    }

    #[test]
    fn unchanged_files_are_not_reported_as_drifted() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = StackPaths::new(temp.path());

        let first = materialize(&paths, &rendered()).expect("materialize");
        assert!(first.drifted.is_empty());
        let again = materialize(&paths, &rendered()).expect("rerun");
        assert_eq!(again.compose, WriteOutcome::Skipped);
        assert!(again.drifted.is_empty());
    }
}
