//! Per-project container lifecycle
//!
//! One long-lived container per project path, created lazily and reused
//! across invocations. Lifecycle:
//!
//! | State | `ensure` action |
//! |-------|-----------------|
//! | Absent | create volumes, create, start |
//! | Created | start (recreate once if start fails) |
//! | Running | reuse |
//! | Broken / stale image | remove, recreate once |
//!
//! Cache volumes are separate from the container and survive recreation.

use crate::config::schema::ContainerConfig;
use crate::error::{DotrunError, DotrunResult};
use crate::orchestration::container::{
    labels, ContainerHandle, ContainerInfo, ContainerSpec, ContainerState,
};
use crate::orchestration::engine::{ContainerEngine, ExecProcess, ExecRequest, ExecSignal};
use crate::project::ProjectContext;
use crate::ui::{TaskSpinner, UiContext};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Owns creation, reuse and teardown of project containers
pub struct ContainerRuntime {
    engine: Arc<dyn ContainerEngine>,
    config: ContainerConfig,
    ui: UiContext,
    /// Set once the engine has answered a ping
    reachable: OnceCell<()>,
}

impl ContainerRuntime {
    pub fn new(engine: Arc<dyn ContainerEngine>, config: ContainerConfig, ui: UiContext) -> Self {
        Self {
            engine,
            config,
            ui,
            reachable: OnceCell::new(),
        }
    }

    /// Ping the engine the first time only; failures are not remembered
    async fn check_reachable(&self) -> DotrunResult<()> {
        self.reachable
            .get_or_try_init(|| self.engine.ping())
            .await
            .map(|_| ())
    }

    /// Return a running container for the project, creating it if needed
    ///
    /// Idempotent: a healthy running container is returned as-is.
    pub async fn ensure(&self, ctx: &ProjectContext) -> DotrunResult<ContainerHandle> {
        self.check_reachable().await?;

        let name = ctx.container_name();
        let existing = self.engine.inspect(&name).await?;
        let state = existing
            .as_ref()
            .map(|info| info.state)
            .unwrap_or(ContainerState::Absent);
        debug!("Container {} is {}", name, state);

        match existing {
            None => self
                .create_and_start(ctx)
                .await
                .map_err(|e| as_container_error(&name, e)),
            Some(info) if info.image != self.config.image => {
                info!(
                    "Container {} uses image {}, configured {}; recreating",
                    name, info.image, self.config.image
                );
                self.recreate(ctx).await
            }
            Some(info) => match info.state {
                ContainerState::Running => Ok(self.handle(ctx, &info)),
                ContainerState::Created => match self.engine.start(&name).await {
                    Ok(()) => {
                        debug!("Started existing container {}", name);
                        Ok(self.handle(ctx, &info))
                    }
                    Err(e) => {
                        warn!("Container {} failed to start ({}); recreating", name, e);
                        self.recreate(ctx).await
                    }
                },
                ContainerState::Broken | ContainerState::Absent => {
                    warn!("Container {} is in a broken state; recreating", name);
                    self.recreate(ctx).await
                }
            },
        }
    }

    /// Remove the container and recreate it, once
    async fn recreate(&self, ctx: &ProjectContext) -> DotrunResult<ContainerHandle> {
        let name = ctx.container_name();
        self.engine
            .remove(&name)
            .await
            .map_err(|e| as_container_error(&name, e))?;
        self.create_and_start(ctx)
            .await
            .map_err(|e| as_container_error(&name, e))
    }

    async fn create_and_start(&self, ctx: &ProjectContext) -> DotrunResult<ContainerHandle> {
        let name = ctx.container_name();
        let mut spinner = TaskSpinner::new(&self.ui);

        if !self.engine.image_exists(&self.config.image).await? {
            spinner.start(&format!("Pulling {}...", self.config.image));
            let sink = spinner.line_sink();
            if let Err(e) = self.engine.pull(&self.config.image, &sink).await {
                spinner.stop_error(&format!("Failed to pull {}", self.config.image));
                return Err(e);
            }
        }

        spinner.start("Creating dotrun container...");

        let volumes = ctx.volume_set();
        for volume in volumes.all() {
            let mut volume_labels = self.labels(ctx);
            volume_labels.insert(labels::CACHE.to_string(), volume.kind.to_string());
            self.engine.volume_create(&volume.name, &volume_labels).await?;
        }

        let mut volume_args = volumes.volume_args();
        volume_args.extend(self.config.extra_volumes.iter().cloned());

        let spec = ContainerSpec {
            name: name.clone(),
            image: self.config.image.clone(),
            project_dir: ctx.path().to_path_buf(),
            volumes: volume_args,
            env: volumes.env(),
            labels: self.labels(ctx),
            network: self.config.network.clone(),
            user: self.config.user.clone(),
            command: self.config.keepalive.clone(),
        };

        let result = async {
            let id = self.engine.create(&spec).await?;
            self.engine.start(&name).await?;
            Ok::<_, DotrunError>(id)
        }
        .await;

        match result {
            Ok(id) => {
                spinner.stop(&format!("Container {} ready", name));
                info!("Created container {}", name);
                Ok(ContainerHandle {
                    name,
                    id,
                    workdir: ctx.path().to_path_buf(),
                })
            }
            Err(e) => {
                spinner.stop_error(&format!("Failed to create container {}", name));
                Err(e)
            }
        }
    }

    /// Start a command in the project container
    ///
    /// Fails with `Execution` if the container is not running, so the caller
    /// can re-ensure and retry.
    pub async fn exec_inside(
        &self,
        handle: &ContainerHandle,
        request: &ExecRequest,
    ) -> DotrunResult<Box<dyn ExecProcess>> {
        match self.engine.inspect(&handle.name).await? {
            Some(info) if info.state == ContainerState::Running => {}
            Some(info) => {
                return Err(DotrunError::execution(
                    &handle.name,
                    format!("container is {}", info.state),
                ))
            }
            None => return Err(DotrunError::execution(&handle.name, "container is absent")),
        }

        let mut request = request.clone();
        if request.user.is_none() {
            request.user = self.config.user.clone();
        }

        self.engine.exec(&handle.name, &request).await
    }

    /// Forward a signal to a command started with `exec_inside`
    pub async fn signal(
        &self,
        handle: &ContainerHandle,
        request: &ExecRequest,
        signal: ExecSignal,
    ) -> DotrunResult<()> {
        self.engine.signal(&handle.name, request, signal).await
    }

    /// Stop and remove the project container and its volumes
    ///
    /// Idempotent: absent container or volumes are not an error.
    pub async fn teardown(&self, ctx: &ProjectContext) -> DotrunResult<()> {
        self.check_reachable().await?;

        let name = ctx.container_name();
        info!("Removing container {}", name);
        self.engine.stop(&name).await?;
        self.engine.remove(&name).await?;

        for volume in ctx.volume_set().all() {
            self.engine.volume_remove(&volume.name).await?;
        }

        Ok(())
    }

    fn handle(&self, ctx: &ProjectContext, info: &ContainerInfo) -> ContainerHandle {
        ContainerHandle {
            name: ctx.container_name(),
            id: info.id.clone(),
            workdir: ctx.path().to_path_buf(),
        }
    }

    fn labels(&self, ctx: &ProjectContext) -> HashMap<String, String> {
        let mut labels = HashMap::new();
        labels.insert(labels::MANAGED.to_string(), "true".to_string());
        labels.insert(
            labels::PROJECT.to_string(),
            ctx.path().display().to_string(),
        );
        labels
    }
}

/// Creation failures surface as `Container`; engine and pull failures stay as is
fn as_container_error(name: &str, e: DotrunError) -> DotrunError {
    match e {
        DotrunError::Container { .. }
        | DotrunError::RuntimeUnavailable { .. }
        | DotrunError::ImagePull { .. } => e,
        other => DotrunError::container(name, other.to_string()),
    }
}
