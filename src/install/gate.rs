//! Decides whether dependencies must be installed, and installs them

use crate::config::schema::InstallConfig;
use crate::environment::ResolvedEnvironment;
use crate::error::{DotrunError, DotrunResult};
use crate::executor::{CommandExecutor, ExecMode};
use crate::install::lock::InstallLock;
use crate::install::state::{FingerprintRecord, ProjectState};
use crate::manifest::{fingerprint, plan_install, InstallStep, ManifestFingerprint};
use crate::orchestration::ContainerRuntime;
use crate::project::ProjectContext;
use crate::ui::{self, UiContext};
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of `InstallGate::install`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallResult {
    /// Recorded fingerprint matched, nothing ran
    UpToDate,
    /// Install steps ran and the new fingerprint was recorded
    ///
    /// `steps` is empty for a project without manifests.
    Installed { steps: Vec<InstallStep> },
}

/// Fingerprint-gated dependency install
pub struct InstallGate {
    state: ProjectState,
    config: InstallConfig,
    runtime: Arc<ContainerRuntime>,
    executor: Arc<CommandExecutor>,
    ui: UiContext,
}

impl InstallGate {
    pub fn new(
        state: ProjectState,
        config: InstallConfig,
        runtime: Arc<ContainerRuntime>,
        executor: Arc<CommandExecutor>,
        ui: UiContext,
    ) -> Self {
        Self {
            state,
            config,
            runtime,
            executor,
            ui,
        }
    }

    /// Persisted state for this project
    pub fn state(&self) -> &ProjectState {
        &self.state
    }

    /// True when no install was recorded or the manifests changed since
    pub async fn needed(&self, ctx: &ProjectContext) -> DotrunResult<bool> {
        let current = fingerprint(ctx.path())?;
        self.is_stale(&current).await
    }

    async fn is_stale(&self, current: &ManifestFingerprint) -> DotrunResult<bool> {
        match self.state.load().await? {
            Some(record) if &record.fingerprint == current => {
                debug!("Dependencies up to date ({})", current.short());
                Ok(false)
            }
            Some(record) => {
                debug!(
                    "Manifests changed: {} -> {}",
                    record.fingerprint.short(),
                    current.short()
                );
                Ok(true)
            }
            None => {
                debug!("No install recorded");
                Ok(true)
            }
        }
    }

    /// Install dependencies if needed (always with `force`)
    ///
    /// Holds the project's install lock for the whole check-and-install, so a
    /// concurrent invocation waits and then sees the fresh fingerprint. The
    /// fingerprint is only recorded when every step exits 0.
    pub async fn install(
        &self,
        ctx: &ProjectContext,
        env: &ResolvedEnvironment,
        force: bool,
    ) -> DotrunResult<InstallResult> {
        let _lock = InstallLock::acquire(&self.state.lock_path()).await?;

        let current = fingerprint(ctx.path())?;
        if !force && !self.is_stale(&current).await? {
            return Ok(InstallResult::UpToDate);
        }

        let steps = plan_install(ctx.path(), &self.config);
        if steps.is_empty() {
            info!("No dependency manifests in {}", ctx.path().display());
            self.record(current, ctx).await?;
            return Ok(InstallResult::Installed { steps });
        }

        let handle = self.runtime.ensure(ctx).await?;

        for step in &steps {
            ui::step_info(&self.ui, &format!("Installing dependencies: {}", step.display()));
            let code = self
                .executor
                .run(ctx, &handle, step.argv.clone(), env, ExecMode::Batch)
                .await?;

            if code != 0 {
                ui::step_error(&self.ui, &format!("`{}` exited with {}", step.display(), code));
                return Err(DotrunError::Install {
                    command: step.display(),
                    code,
                });
            }
        }

        self.record(current, ctx).await?;
        ui::step_ok(&self.ui, "Dependencies installed");
        Ok(InstallResult::Installed { steps })
    }

    async fn record(&self, current: ManifestFingerprint, ctx: &ProjectContext) -> DotrunResult<()> {
        self.state
            .persist(&FingerprintRecord::new(current, ctx.path()))
            .await
    }
}
