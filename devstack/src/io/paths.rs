//! Canonical paths of a provisioned project.

use std::path::{Path, PathBuf};

/// All paths devstack reads or writes, relative to one project root.
#[derive(Debug, Clone)]
pub struct StackPaths {
    pub root: PathBuf,
    pub backend_dir: PathBuf,
    pub frontend_dir: PathBuf,
    pub compose_path: PathBuf,
    pub dockerfile_path: PathBuf,
    pub config_path: PathBuf,
    pub logs_dir: PathBuf,
    /// `composer.json`; its presence means the backend is scaffolded.
    pub backend_manifest: PathBuf,
    pub backend_env: PathBuf,
    pub backend_env_example: PathBuf,
    /// `vendor/`; its absence triggers `composer install`.
    pub backend_vendor: PathBuf,
    pub backend_database_config: PathBuf,
    /// `package.json`; its presence means the frontend is scaffolded.
    pub frontend_manifest: PathBuf,
    pub frontend_env: PathBuf,
    pub frontend_node_modules: PathBuf,
}

impl StackPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let backend_dir = root.join("backend");
        let frontend_dir = root.join("frontend");
        let state_dir = root.join(".devstack");
        Self {
            compose_path: root.join("docker-compose.yml"),
            dockerfile_path: root.join("Dockerfile"),
            config_path: root.join("devstack.toml"),
            logs_dir: state_dir.join("logs"),
            backend_manifest: backend_dir.join("composer.json"),
            backend_env: backend_dir.join(".env"),
            backend_env_example: backend_dir.join(".env.example"),
            backend_vendor: backend_dir.join("vendor"),
            backend_database_config: backend_dir.join("config").join("database.php"),
            frontend_manifest: frontend_dir.join("package.json"),
            frontend_env: frontend_dir.join(".env"),
            frontend_node_modules: frontend_dir.join("node_modules"),
            backend_dir,
            frontend_dir,
            root,
        }
    }

    /// Log file for an external command step (e.g. `backend-scaffold`).
    pub fn log_path(&self, step: &str) -> PathBuf {
        self.logs_dir.join(format!("{step}.log"))
    }
}
