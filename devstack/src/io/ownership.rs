//! Hands files created by containers back to the invoking user.
//!
//! Containers write as root, so after provisioning every top-level entry
//! (and `frontend/node_modules`) is re-owned recursively.

use std::fmt;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use super::paths::StackPaths;

/// Numeric owner for `chown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
    pub uid: u32,
    pub gid: u32,
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.uid, self.gid)
    }
}

/// The user who invoked devstack, seeing through `sudo`.
pub fn invoking_owner() -> Owner {
    owner_from_sudo(
        std::env::var("SUDO_UID").ok().as_deref(),
        std::env::var("SUDO_GID").ok().as_deref(),
    )
    .unwrap_or_else(|| Owner {
        uid: nix::unistd::getuid().as_raw(),
        gid: nix::unistd::getgid().as_raw(),
    })
}

/// Owner recorded by `sudo`, when both ids are present and numeric.
pub fn owner_from_sudo(uid: Option<&str>, gid: Option<&str>) -> Option<Owner> {
    let uid = uid?.trim().parse().ok()?;
    let gid = gid?.trim().parse().ok()?;
    Some(Owner { uid, gid })
}

/// Paths to re-own: every top-level entry plus `frontend/node_modules`, sorted.
pub fn ownership_targets(paths: &StackPaths) -> Result<Vec<PathBuf>> {
    let mut targets = Vec::new();
    for entry in fs::read_dir(&paths.root)
        .with_context(|| format!("read {}", paths.root.display()))?
    {
        let entry = entry.context("read entry")?;
        targets.push(entry.path());
    }
    targets.sort();
    if paths.frontend_node_modules.exists() {
        targets.push(paths.frontend_node_modules.clone());
    }
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sudo_ids_take_precedence_when_valid() {
        assert_eq!(
            owner_from_sudo(Some("1000"), Some("1001")),
            Some(Owner {
                uid: 1000,
                gid: 1001
            })
        );
        assert_eq!(owner_from_sudo(Some("1000"), None), None);
        assert_eq!(owner_from_sudo(Some("abc"), Some("1")), None);
    }

    #[test]
    fn targets_cover_top_level_entries_and_node_modules() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = StackPaths::new(temp.path());
        fs::create_dir_all(&paths.frontend_node_modules).expect("node_modules");
        fs::create_dir_all(&paths.backend_dir).expect("backend");
        fs::write(&paths.compose_path, "").expect("compose");

        let targets = ownership_targets(&paths).expect("targets");
        assert_eq!(
            targets,
            vec![
                paths.backend_dir.clone(),
                paths.compose_path.clone(),
                paths.frontend_dir.clone(),
                paths.frontend_node_modules.clone(),
            ]
        );
        assert_eq!(Owner { uid: 1, gid: 2 }.to_string(), "1:2");
    }
}
