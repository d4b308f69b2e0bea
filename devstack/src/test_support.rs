//! Test doubles for the external toolchain, plus Laravel fixture text.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

use crate::core::persistence::Persistence;
use crate::io::config::{OwnershipConfig, StackConfig};
use crate::io::ownership::Owner;
use crate::io::paths::StackPaths;
use crate::io::preflight::ToolProbe;
use crate::io::toolchain::{
    BackendTasks, DependencyInstaller, ImageBuilder, OwnershipFixer, Project, ProjectScaffolder,
    StackOrchestrator,
};

/// `.env.example` as shipped by a fresh Laravel project.
pub const LARAVEL_ENV_EXAMPLE: &str = "APP_NAME=Laravel
APP_ENV=local
APP_KEY=
APP_DEBUG=true
APP_URL=http://localhost

LOG_CHANNEL=stack

DB_CONNECTION=sqlite
# DB_HOST=127.0.0.1
# DB_PORT=3306
# DB_DATABASE=laravel
# DB_USERNAME=root
# DB_PASSWORD=

MAIL_MAILER=log
MAIL_HOST=127.0.0.1
MAIL_PORT=2525
";

/// Trimmed `config/database.php` of a fresh Laravel project.
pub const LARAVEL_DATABASE_CONFIG: &str = r#"<?php

use Illuminate\Support\Str;

return [

    'default' => env('DB_CONNECTION', 'sqlite'),

    'connections' => [

        'sqlite' => [
            'driver' => 'sqlite',
            'database' => env('DB_DATABASE', database_path('database.sqlite')),
        ],

        'mysql' => [
            'driver' => 'mysql',
            'host' => env('DB_HOST', '127.0.0.1'),
            'port' => env('DB_PORT', '3306'),
        ],

    ],

    'migrations' => [
        'table' => 'migrations',
    ],

];
"#;

/// Probe with a configurable set of installed tools.
#[derive(Debug, Clone)]
pub struct FakeProbe {
    pub docker: Option<PathBuf>,
    pub compose_plugin: bool,
    pub legacy_compose: Option<PathBuf>,
}

impl FakeProbe {
    /// Docker with the compose plugin.
    pub fn full() -> Self {
        Self {
            docker: Some(PathBuf::from("/usr/bin/docker")),
            compose_plugin: true,
            legacy_compose: None,
        }
    }

    /// Docker without the plugin, plus a standalone `docker-compose`.
    pub fn legacy_compose() -> Self {
        Self {
            compose_plugin: false,
            legacy_compose: Some(PathBuf::from("/usr/bin/docker-compose")),
            ..Self::full()
        }
    }

    pub fn without_docker() -> Self {
        Self {
            docker: None,
            compose_plugin: false,
            legacy_compose: Some(PathBuf::from("/usr/bin/docker-compose")),
        }
    }

    pub fn without_compose() -> Self {
        Self {
            compose_plugin: false,
            legacy_compose: None,
            ..Self::full()
        }
    }
}

impl ToolProbe for FakeProbe {
    fn locate(&self, name: &str) -> Option<PathBuf> {
        match name {
            "docker" => self.docker.clone(),
            "docker-compose" => self.legacy_compose.clone(),
            _ => None,
        }
    }

    fn compose_plugin_available(&self, _docker: &Path) -> bool {
        self.compose_plugin
    }
}

/// One call made against [`RecordingToolchain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    BuildImage(String),
    Scaffold(Project),
    Install(Project),
    AddPackage(Project, String),
    GenerateAppKey,
    Migrate,
    UpDetached,
    Chown { owner: Owner, targets: Vec<PathBuf> },
}

type FailurePredicate = Box<dyn Fn(&Invocation) -> bool>;

/// Toolchain that records every call and mimics the files real tools leave behind.
pub struct RecordingToolchain {
    paths: StackPaths,
    calls: RefCell<Vec<Invocation>>,
    fail_when: Option<FailurePredicate>,
}

impl RecordingToolchain {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            paths: StackPaths::new(root),
            calls: RefCell::new(Vec::new()),
            fail_when: None,
        }
    }

    /// Fail (after recording) every call matching `predicate`.
    pub fn failing_when(mut self, predicate: impl Fn(&Invocation) -> bool + 'static) -> Self {
        self.fail_when = Some(Box::new(predicate));
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Invocation) -> bool) -> usize {
        self.calls.borrow().iter().filter(|call| predicate(call)).count()
    }

    fn record(&self, call: Invocation) -> Result<()> {
        let fails = self.fail_when.as_ref().is_some_and(|pred| pred(&call));
        self.calls.borrow_mut().push(call.clone());
        if fails {
            bail!("simulated failure: {call:?}");
        }
        Ok(())
    }
}

impl ImageBuilder for RecordingToolchain {
    fn build_image(&self, service: &str) -> Result<()> {
        self.record(Invocation::BuildImage(service.to_string()))
    }
}

impl ProjectScaffolder for RecordingToolchain {
    fn scaffold(&self, project: Project) -> Result<()> {
        self.record(Invocation::Scaffold(project))?;
        match project {
            Project::Backend => {
                write(&self.paths.backend_manifest, "{\"name\": \"laravel/laravel\"}\n")?;
                write(&self.paths.backend_env_example, LARAVEL_ENV_EXAMPLE)?;
                write(&self.paths.backend_database_config, LARAVEL_DATABASE_CONFIG)?;
                fs::create_dir_all(&self.paths.backend_vendor)?;
            }
            Project::Frontend => {
                write(&self.paths.frontend_manifest, "{\"name\": \"frontend\"}\n")?;
            }
        }
        Ok(())
    }
}

impl DependencyInstaller for RecordingToolchain {
    fn install(&self, project: Project) -> Result<()> {
        self.record(Invocation::Install(project))?;
        let dir = match project {
            Project::Backend => &self.paths.backend_vendor,
            Project::Frontend => &self.paths.frontend_node_modules,
        };
        fs::create_dir_all(dir)?;
        Ok(())
    }

    fn add_package(&self, project: Project, package: &str) -> Result<()> {
        self.record(Invocation::AddPackage(project, package.to_string()))
    }
}

impl BackendTasks for RecordingToolchain {
    fn generate_app_key(&self) -> Result<()> {
        self.record(Invocation::GenerateAppKey)
    }

    fn migrate(&self) -> Result<()> {
        self.record(Invocation::Migrate)
    }
}

impl StackOrchestrator for RecordingToolchain {
    fn up_detached(&self) -> Result<()> {
        self.record(Invocation::UpDetached)
    }
}

impl OwnershipFixer for RecordingToolchain {
    fn chown_recursive(&self, owner: Owner, targets: &[PathBuf]) -> Result<()> {
        self.record(Invocation::Chown {
            owner,
            targets: targets.to_vec(),
        })
    }
}

fn write(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    Ok(())
}

/// Lay down a backend that was scaffolded by an earlier run.
pub fn seed_existing_backend(paths: &StackPaths, with_vendor: bool) {
    write(&paths.backend_manifest, "{\"name\": \"laravel/laravel\"}\n").expect("seed manifest");
    write(&paths.backend_env_example, LARAVEL_ENV_EXAMPLE).expect("seed .env.example");
    write(&paths.backend_env, LARAVEL_ENV_EXAMPLE).expect("seed .env");
    write(&paths.backend_database_config, LARAVEL_DATABASE_CONFIG).expect("seed database.php");
    if with_vendor {
        fs::create_dir_all(&paths.backend_vendor).expect("seed vendor");
    }
}

/// Fresh project root in a temp dir.
pub fn project() -> (tempfile::TempDir, StackPaths) {
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = StackPaths::new(temp.path());
    (temp, paths)
}

/// Config for tests: the given store, default ports, no privilege prefix.
pub fn test_config(persistence: Persistence) -> StackConfig {
    StackConfig {
        persistence,
        ownership: OwnershipConfig {
            enabled: true,
            privilege_command: Vec::new(),
        },
        ..StackConfig::default()
    }
}

/// Every file under `root` (except command logs) with its bytes, keyed by relative path.
pub fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    let mut files = BTreeMap::new();
    collect(root, root, &mut files);
    files
}

fn collect(root: &Path, dir: &Path, files: &mut BTreeMap<PathBuf, Vec<u8>>) {
    for entry in fs::read_dir(dir).expect("read dir") {
        let path = entry.expect("dir entry").path();
        if path.file_name().is_some_and(|name| name == ".devstack") {
            continue;
        }
        if path.is_dir() {
            collect(root, &path, files);
        } else {
            let relative = path.strip_prefix(root).expect("relative").to_path_buf();
            files.insert(relative, fs::read(&path).expect("read file"));
        }
    }
}
