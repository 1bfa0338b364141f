//! Project orchestration
//!
//! Composes environment resolution, install gating, the container runtime
//! and command execution into the user operations. Every operation returns
//! the process exit status for the CLI.

mod context;

pub use context::ProjectContext;

use crate::config::schema::RunConfig;
use crate::config::{Config, ConfigManager};
use crate::environment::{EnvironmentResolver, ResolvedEnvironment};
use crate::error::DotrunResult;
use crate::executor::{CommandExecutor, ExecMode};
use crate::install::{InstallGate, InstallLock, InstallResult, ProjectState};
use crate::manifest::package_scripts;
use crate::orchestration::{ContainerEngine, ContainerRuntime};
use crate::ui::{self, UiContext};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Command names with built-in handling
pub mod commands {
    pub const EXEC: &str = "exec";
    pub const INSTALL: &str = "install";
    pub const CLEAN: &str = "clean";
    pub const VERSION: &str = "version";
}

/// A user operation against a project
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Interactive passthrough, no install check; empty argv opens a shell
    Exec { argv: Vec<String> },
    /// Install dependencies
    Install { force: bool },
    /// Run the clean script, then remove container, volumes and state
    Clean,
    /// Run a named package script
    Run {
        name: String,
        args: Vec<String>,
        skip_install: bool,
    },
}

impl Operation {
    /// Map a command name from the command line to an operation
    ///
    /// `install` always forces; any name without built-in handling is a
    /// package script.
    pub fn from_command(name: &str, args: Vec<String>, skip_install: bool) -> Self {
        match name {
            commands::EXEC => Operation::Exec { argv: args },
            commands::INSTALL => Operation::Install { force: true },
            commands::CLEAN => Operation::Clean,
            _ => Operation::Run {
                name: name.to_string(),
                args,
                skip_install,
            },
        }
    }
}

/// One project directory and everything needed to operate on it
pub struct Project {
    ctx: ProjectContext,
    run: RunConfig,
    runtime: Arc<ContainerRuntime>,
    executor: Arc<CommandExecutor>,
    gate: InstallGate,
    resolver: EnvironmentResolver,
    ui: UiContext,
}

impl Project {
    pub fn new(
        ctx: ProjectContext,
        config: &Config,
        engine: Arc<dyn ContainerEngine>,
        resolver: EnvironmentResolver,
        ui: UiContext,
    ) -> Self {
        let runtime = Arc::new(ContainerRuntime::new(
            engine,
            config.container.clone(),
            ui.clone(),
        ));
        let executor = Arc::new(CommandExecutor::new(Arc::clone(&runtime)));
        let state = ProjectState::new(&ConfigManager::state_dir(config), &ctx);
        let gate = InstallGate::new(
            state,
            config.install.clone(),
            Arc::clone(&runtime),
            Arc::clone(&executor),
            ui.clone(),
        );

        Self {
            ctx,
            run: config.run.clone(),
            runtime,
            executor,
            gate,
            resolver,
            ui,
        }
    }

    pub fn context(&self) -> &ProjectContext {
        &self.ctx
    }

    pub fn gate(&self) -> &InstallGate {
        &self.gate
    }

    pub fn runtime(&self) -> &ContainerRuntime {
        &self.runtime
    }

    /// Run an operation and return its exit status
    pub async fn dispatch(&self, operation: Operation) -> DotrunResult<i32> {
        debug!("Dispatching {:?}", operation);
        match operation {
            Operation::Exec { argv } => self.exec(argv).await,
            Operation::Install { force } => self.install(force).await,
            Operation::Clean => self.clean().await,
            Operation::Run {
                name,
                args,
                skip_install,
            } => self.run_command(&name, args, skip_install).await,
        }
    }

    /// Attach the terminal to a command in the container
    pub async fn exec(&self, argv: Vec<String>) -> DotrunResult<i32> {
        let argv = if argv.is_empty() {
            vec![self.run.shell.clone()]
        } else {
            argv
        };

        let env = self.resolve_env()?;
        let handle = self.runtime.ensure(&self.ctx).await?;
        self.executor
            .run(&self.ctx, &handle, argv, &env, ExecMode::Interactive)
            .await
    }

    /// Install dependencies; 0 on success
    pub async fn install(&self, force: bool) -> DotrunResult<i32> {
        let env = self.resolve_env()?;
        match self.gate.install(&self.ctx, &env, force).await? {
            InstallResult::UpToDate => ui::step_ok(&self.ui, "Dependencies up to date"),
            InstallResult::Installed { steps } if steps.is_empty() => {
                ui::step_info(&self.ui, "No dependency manifests found, nothing to install")
            }
            InstallResult::Installed { .. } => {}
        }
        Ok(0)
    }

    /// Run the clean script if there is one, then always tear everything down
    pub async fn clean(&self) -> DotrunResult<i32> {
        self.run_clean_script().await;

        // The record is only touched under the install lock
        let _lock = InstallLock::acquire(&self.gate.state().lock_path()).await?;
        let teardown = self.runtime.teardown(&self.ctx).await;
        let cleared = self.gate.state().clear().await;
        teardown?;
        cleared?;

        ui::step_ok(
            &self.ui,
            &format!("Removed {} and its cache volumes", self.ctx.container_name()),
        );
        Ok(0)
    }

    /// Best effort; failures are reported and otherwise ignored
    async fn run_clean_script(&self) {
        let scripts = match package_scripts(self.ctx.path()) {
            Ok(scripts) => scripts,
            Err(e) => {
                warn!("Cannot read package scripts: {}", e);
                return;
            }
        };
        if !scripts.contains_key(&self.run.clean_script) {
            debug!("No `{}` script defined", self.run.clean_script);
            return;
        }

        match self.clean_script_status().await {
            Ok(0) => {}
            Ok(code) => ui::step_warn(
                &self.ui,
                &format!("`{}` script exited with {}", self.run.clean_script, code),
            ),
            Err(e) => ui::step_warn_hint(
                &self.ui,
                &format!("`{}` script did not run", self.run.clean_script),
                &e.to_string(),
            ),
        }
    }

    async fn clean_script_status(&self) -> DotrunResult<i32> {
        let env = self.resolve_env()?;
        let handle = self.runtime.ensure(&self.ctx).await?;
        let argv = self.script_argv(&self.run.clean_script, Vec::new());
        self.executor
            .run(&self.ctx, &handle, argv, &env, ExecMode::Batch)
            .await
    }

    /// Install if needed, then run a package script in batch mode
    pub async fn run_command(
        &self,
        name: &str,
        args: Vec<String>,
        skip_install: bool,
    ) -> DotrunResult<i32> {
        let env = self.resolve_env()?;

        if skip_install {
            info!("Skipping dependency install");
        } else {
            self.gate.install(&self.ctx, &env, false).await?;
        }

        let handle = self.runtime.ensure(&self.ctx).await?;
        self.executor
            .run(
                &self.ctx,
                &handle,
                self.script_argv(name, args),
                &env,
                ExecMode::Batch,
            )
            .await
    }

    fn script_argv(&self, name: &str, args: Vec<String>) -> Vec<String> {
        let mut argv = self.run.runner.clone();
        argv.push(name.to_string());
        argv.extend(args);
        argv
    }

    fn resolve_env(&self) -> DotrunResult<ResolvedEnvironment> {
        self.resolver.resolve(self.ctx.path(), self.ctx.overrides())
    }
}
