//! Run configuration stored in `devstack.toml` at the project root.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::persistence::Persistence;
use crate::core::topology::Ports;

static PROJECT_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9_-]*$").expect("valid project name regex"));

/// Devstack configuration (TOML).
///
/// Every field is optional; a missing file means all defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StackConfig {
    /// Which database the stack is built around.
    pub persistence: Persistence,

    /// Compose project name; also prefixes the backend image.
    pub project_name: String,

    /// Wall-clock budget for each external command.
    pub command_timeout_secs: u64,

    /// Captured stdout/stderr kept in memory per command. Logs are never truncated.
    pub output_limit_bytes: usize,

    pub ports: PortsConfig,
    pub ownership: OwnershipConfig,
}

/// Published host ports. `database` and `admin_ui` default per persistence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PortsConfig {
    pub frontend: u16,
    pub backend: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_ui: Option<u16>,
    pub mail_ui: u16,
    pub smtp: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OwnershipConfig {
    /// Re-own generated files after launch.
    pub enabled: bool,
    /// Prefix for the `chown` call (e.g. `["sudo"]`). Empty runs `chown` directly.
    pub privilege_command: Vec<String>,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            persistence: Persistence::default(),
            project_name: "devstack".to_string(),
            command_timeout_secs: 60 * 60,
            output_limit_bytes: 1_000_000,
            ports: PortsConfig::default(),
            ownership: OwnershipConfig::default(),
        }
    }
}

impl Default for PortsConfig {
    fn default() -> Self {
        let base = Ports::defaults(Persistence::default());
        Self {
            frontend: base.frontend,
            backend: base.backend,
            database: None,
            admin_ui: None,
            mail_ui: base.mail_ui,
            smtp: base.smtp,
        }
    }
}

impl Default for OwnershipConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            privilege_command: vec!["sudo".to_string()],
        }
    }
}

impl PortsConfig {
    /// Concrete host ports for `persistence`.
    pub fn resolve(&self, persistence: Persistence) -> Ports {
        let defaults = Ports::defaults(persistence);
        Ports {
            frontend: self.frontend,
            backend: self.backend,
            database: self.database.unwrap_or(defaults.database),
            admin_ui: self.admin_ui.unwrap_or(defaults.admin_ui),
            mail_ui: self.mail_ui,
            smtp: self.smtp,
        }
    }
}

impl StackConfig {
    pub fn ports(&self) -> Ports {
        self.ports.resolve(self.persistence)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if !PROJECT_NAME_RE.is_match(&self.project_name) {
            return Err(anyhow!(
                "project_name {:?} must be lowercase letters, digits, '-' or '_', \
                 starting with a letter or digit",
                self.project_name
            ));
        }

        let mut seen: HashMap<u16, &str> = HashMap::new();
        for (name, port) in self.ports().as_list() {
            if port == 0 {
                return Err(anyhow!("ports.{name} must be > 0"));
            }
            if let Some(other) = seen.insert(port, name) {
                return Err(anyhow!("ports.{name} and ports.{other} both use {port}"));
            }
        }

        if self.ownership.enabled
            && self
                .ownership
                .privilege_command
                .first()
                .is_some_and(|program| program.trim().is_empty())
        {
            return Err(anyhow!("ownership.privilege_command must not start with an empty entry"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `StackConfig::default()`.
pub fn load_config(path: &Path) -> Result<StackConfig> {
    if !path.exists() {
        let cfg = StackConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: StackConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid {}", path.display()))?;
    Ok(cfg)
}
