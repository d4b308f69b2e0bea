//! Capabilities backed by external tools.
//!
//! Each trait covers one kind of interaction with the container tooling, so
//! provisioning can be driven by [`DockerToolchain`] in production and by a
//! recording fake in tests without a live runtime.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Result, bail};
use tracing::{info, instrument, warn};

use super::ownership::Owner;
use super::paths::StackPaths;
use super::preflight::ComposeForm;
use super::process::{describe, run_command_with_log};
use crate::core::topology::{BACKEND_SERVICE, FRONTEND_SERVICE};

const ERROR_TAIL_LINES: usize = 20;

/// Scaffolded sub-project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Project {
    Backend,
    Frontend,
}

impl Project {
    pub fn service(self) -> &'static str {
        match self {
            Project::Backend => BACKEND_SERVICE,
            Project::Frontend => FRONTEND_SERVICE,
        }
    }

    /// Generator run inside a throwaway container of the project's service.
    fn scaffold_args(self) -> &'static [&'static str] {
        match self {
            Project::Backend => &[
                "composer",
                "create-project",
                "--no-interaction",
                "--prefer-dist",
                "laravel/laravel",
                ".",
            ],
            Project::Frontend => &[
                "npm", "create", "-y", "vite@latest", ".", "--", "--template", "react",
            ],
        }
    }

    fn install_args(self) -> &'static [&'static str] {
        match self {
            Project::Backend => &["composer", "install", "--no-interaction"],
            Project::Frontend => &["npm", "install"],
        }
    }

    fn add_package_args(self, package: &str) -> Vec<String> {
        let base: &[&str] = match self {
            Project::Backend => &["composer", "require", "--no-interaction"],
            Project::Frontend => &["npm", "install"],
        };
        base.iter()
            .map(|arg| (*arg).to_string())
            .chain(std::iter::once(package.to_string()))
            .collect()
    }
}

pub trait ImageBuilder {
    fn build_image(&self, service: &str) -> Result<()>;
}

pub trait ProjectScaffolder {
    /// Generate a starter project into the project's (empty) directory.
    fn scaffold(&self, project: Project) -> Result<()>;
}

pub trait DependencyInstaller {
    /// Install everything the project's manifest declares.
    fn install(&self, project: Project) -> Result<()>;
    /// Add one package to the project's manifest and install it.
    fn add_package(&self, project: Project, package: &str) -> Result<()>;
}

/// Framework commands run inside the backend service.
pub trait BackendTasks {
    fn generate_app_key(&self) -> Result<()>;
    /// Run schema migrations; starts the database the backend depends on.
    fn migrate(&self) -> Result<()>;
}

pub trait StackOrchestrator {
    /// Start every declared service in the background.
    fn up_detached(&self) -> Result<()>;
}

pub trait OwnershipFixer {
    fn chown_recursive(&self, owner: Owner, targets: &[PathBuf]) -> Result<()>;
}

/// Everything provisioning needs from the outside world.
pub trait Toolchain:
    ImageBuilder
    + ProjectScaffolder
    + DependencyInstaller
    + BackendTasks
    + StackOrchestrator
    + OwnershipFixer
{
}

impl<T> Toolchain for T where
    T: ImageBuilder
        + ProjectScaffolder
        + DependencyInstaller
        + BackendTasks
        + StackOrchestrator
        + OwnershipFixer
{
}

impl<T: ImageBuilder + ?Sized> ImageBuilder for &T {
    fn build_image(&self, service: &str) -> Result<()> {
        (**self).build_image(service)
    }
}

impl<T: ProjectScaffolder + ?Sized> ProjectScaffolder for &T {
    fn scaffold(&self, project: Project) -> Result<()> {
        (**self).scaffold(project)
    }
}

impl<T: DependencyInstaller + ?Sized> DependencyInstaller for &T {
    fn install(&self, project: Project) -> Result<()> {
        (**self).install(project)
    }

    fn add_package(&self, project: Project, package: &str) -> Result<()> {
        (**self).add_package(project, package)
    }
}

impl<T: BackendTasks + ?Sized> BackendTasks for &T {
    fn generate_app_key(&self) -> Result<()> {
        (**self).generate_app_key()
    }

    fn migrate(&self) -> Result<()> {
        (**self).migrate()
    }
}

impl<T: StackOrchestrator + ?Sized> StackOrchestrator for &T {
    fn up_detached(&self) -> Result<()> {
        (**self).up_detached()
    }
}

impl<T: OwnershipFixer + ?Sized> OwnershipFixer for &T {
    fn chown_recursive(&self, owner: Owner, targets: &[PathBuf]) -> Result<()> {
        (**self).chown_recursive(owner, targets)
    }
}

/// Settings for [`DockerToolchain`].
#[derive(Debug, Clone)]
pub struct ToolchainSettings {
    pub timeout: Duration,
    pub output_limit_bytes: usize,
    /// Prefix for commands that need root (e.g. `["sudo"]`); empty runs them directly.
    pub privilege_command: Vec<String>,
}

/// Toolchain that shells out to Docker Compose from the project root.
pub struct DockerToolchain {
    paths: StackPaths,
    compose: ComposeForm,
    settings: ToolchainSettings,
}

impl DockerToolchain {
    pub fn new(paths: StackPaths, compose: ComposeForm, settings: ToolchainSettings) -> Self {
        Self {
            paths,
            compose,
            settings,
        }
    }

    fn compose<S: AsRef<str>>(&self, args: &[S]) -> Command {
        let mut cmd = self.compose.command();
        cmd.args(args.iter().map(AsRef::as_ref))
            .current_dir(&self.paths.root);
        cmd
    }

    /// `compose run --rm -T [--no-deps] <service> <args...>`
    fn run_in_service<S: AsRef<str>>(&self, service: &str, with_deps: bool, args: &[S]) -> Command {
        let mut cmd = self.compose(&["run", "--rm", "-T"]);
        if !with_deps {
            cmd.arg("--no-deps");
        }
        cmd.arg(service).args(args.iter().map(AsRef::as_ref));
        cmd
    }

    /// Run `cmd`, logging its output to `.devstack/logs/<step>.log`; fail on non-zero exit.
    #[instrument(skip(self, cmd))]
    fn run_step(&self, step: &str, cmd: Command) -> Result<()> {
        let command_line = describe(&cmd);
        let log_path = self.paths.log_path(step);
        info!(command = %command_line, "running");
        let output = run_command_with_log(
            cmd,
            self.settings.timeout,
            self.settings.output_limit_bytes,
            &log_path,
        )?;

        if output.timed_out {
            warn!(step, "command timed out");
            bail!(
                "`{command_line}` timed out after {}s (log: {})",
                self.settings.timeout.as_secs(),
                log_path.display()
            );
        }
        if !output.status.success() {
            warn!(step, exit_code = ?output.status.code(), "command failed");
            bail!(
                "`{command_line}` exited with status {:?} (log: {})\n{}",
                output.status.code(),
                log_path.display(),
                output.tail(ERROR_TAIL_LINES)
            );
        }
        Ok(())
    }
}

impl ImageBuilder for DockerToolchain {
    fn build_image(&self, service: &str) -> Result<()> {
        self.run_step(&format!("{service}-build"), self.compose(&["build", service]))
    }
}

impl ProjectScaffolder for DockerToolchain {
    fn scaffold(&self, project: Project) -> Result<()> {
        let cmd = self.run_in_service(project.service(), false, project.scaffold_args());
        self.run_step(&format!("{}-scaffold", project.service()), cmd)
    }
}

impl DependencyInstaller for DockerToolchain {
    fn install(&self, project: Project) -> Result<()> {
        let cmd = self.run_in_service(project.service(), false, project.install_args());
        self.run_step(&format!("{}-install", project.service()), cmd)
    }

    fn add_package(&self, project: Project, package: &str) -> Result<()> {
        let cmd = self.run_in_service(project.service(), false, &project.add_package_args(package));
        self.run_step(&format!("{}-add-package", project.service()), cmd)
    }
}

impl BackendTasks for DockerToolchain {
    fn generate_app_key(&self) -> Result<()> {
        let cmd = self.run_in_service(
            BACKEND_SERVICE,
            false,
            &["php", "artisan", "key:generate", "--no-interaction"],
        );
        self.run_step("backend-key-generate", cmd)
    }

    fn migrate(&self) -> Result<()> {
        let cmd = self.run_in_service(BACKEND_SERVICE, true, &["php", "artisan", "migrate", "--force"]);
        self.run_step("backend-migrate", cmd)
    }
}

impl StackOrchestrator for DockerToolchain {
    fn up_detached(&self) -> Result<()> {
        self.run_step("stack-up", self.compose(&["up", "-d"]))
    }
}

impl OwnershipFixer for DockerToolchain {
    fn chown_recursive(&self, owner: Owner, targets: &[PathBuf]) -> Result<()> {
        self.run_step("chown", self.chown_command(owner, targets))
    }
}

impl DockerToolchain {
    /// `[<privilege prefix>] chown -R uid:gid <targets...>`
    fn chown_command(&self, owner: Owner, targets: &[PathBuf]) -> Command {
        let mut cmd = match self.settings.privilege_command.split_first() {
            Some((program, args)) => {
                let mut cmd = Command::new(program);
                cmd.args(args).arg("chown");
                cmd
            }
            None => Command::new("chown"),
        };
        cmd.arg("-R")
            .arg(owner.to_string())
            .args(targets)
            .current_dir(&self.paths.root);
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toolchain(privilege: &[&str]) -> DockerToolchain {
        DockerToolchain::new(
            StackPaths::new("/work/app"),
            ComposeForm::Plugin {
                docker: PathBuf::from("docker"),
            },
            ToolchainSettings {
                timeout: Duration::from_secs(5),
                output_limit_bytes: 1024,
                privilege_command: privilege.iter().map(|s| s.to_string()).collect(),
            },
        )
    }

    #[test]
    fn scaffold_runs_in_a_throwaway_container_without_dependencies() {
        let tools = toolchain(&[]);
        let cmd = tools.run_in_service("backend", false, Project::Backend.scaffold_args());
        assert_eq!(
            describe(&cmd),
            "docker compose run --rm -T --no-deps backend composer create-project \
             --no-interaction --prefer-dist laravel/laravel ."
        );
        assert_eq!(cmd.get_current_dir(), Some(std::path::Path::new("/work/app")));
    }

    #[test]
    fn migrate_keeps_service_dependencies() {
        let tools = toolchain(&[]);
        let cmd = tools.run_in_service("backend", true, &["php", "artisan", "migrate"]);
        assert_eq!(
            describe(&cmd),
            "docker compose run --rm -T backend php artisan migrate"
        );
    }

    #[test]
    fn add_package_appends_the_package() {
        assert_eq!(
            Project::Backend.add_package_args("mongodb/laravel-mongodb"),
            vec!["composer", "require", "--no-interaction", "mongodb/laravel-mongodb"]
        );
        assert_eq!(Project::Frontend.install_args(), &["npm", "install"]);
    }

    #[test]
    fn chown_goes_through_the_privilege_prefix() {
        let owner = Owner { uid: 1000, gid: 1000 };
        let targets = [PathBuf::from("/work/app/backend")];

        let with_sudo = toolchain(&["sudo", "-n"]).chown_command(owner, &targets);
        assert_eq!(
            describe(&with_sudo),
            "sudo -n chown -R 1000:1000 /work/app/backend"
        );

        let direct = toolchain(&[]).chown_command(owner, &targets);
        assert_eq!(describe(&direct), "chown -R 1000:1000 /work/app/backend");
    }

    #[cfg(unix)]
    #[test]
    fn failing_step_reports_command_and_log() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tools = DockerToolchain::new(
            StackPaths::new(temp.path()),
            ComposeForm::Standalone {
                binary: PathBuf::from("false"),
            },
            ToolchainSettings {
                timeout: Duration::from_secs(5),
                output_limit_bytes: 1024,
                privilege_command: Vec::new(),
            },
        );
        let err = tools.up_detached().unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("`false up -d` exited with status Some(1)"), "{msg}");
        assert!(temp.path().join(".devstack/logs/stack-up.log").is_file());
    }
}
