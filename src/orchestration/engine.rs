//! Container engine abstraction
//!
//! The narrow surface dotrun needs from docker/podman. The runtime owns the
//! lifecycle policy; implementations only translate calls to the engine.

use crate::environment::ResolvedEnvironment;
use crate::error::DotrunResult;
use crate::orchestration::container::{ContainerInfo, ContainerSpec};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

/// How the in-container process is attached to the caller's stdio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdioMode {
    /// Output forwarded as produced, stdin not connected
    Batch,
    /// Stdin forwarded too; `tty` allocates a pseudo-terminal
    Interactive { tty: bool },
}

/// Signals forwarded to an in-container process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecSignal {
    Interrupt,
    Terminate,
}

impl ExecSignal {
    /// Name understood by `kill -s`
    pub fn name(&self) -> &'static str {
        match self {
            Self::Interrupt => "INT",
            Self::Terminate => "TERM",
        }
    }
}

/// A command to run inside a container
#[derive(Debug, Clone)]
pub struct ExecRequest {
    /// Unique id, used to address the process when forwarding signals
    pub id: Uuid,
    /// Command and arguments
    pub argv: Vec<String>,
    /// Variables to set for the process
    pub env: ResolvedEnvironment,
    /// Working directory inside the container
    pub workdir: PathBuf,
    /// User to run as
    pub user: Option<String>,
    /// Stdio attachment
    pub stdio: StdioMode,
}

impl ExecRequest {
    pub fn new(
        argv: Vec<String>,
        env: ResolvedEnvironment,
        workdir: PathBuf,
        stdio: StdioMode,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            argv,
            env,
            workdir,
            user: None,
            stdio,
        }
    }

    /// Where the in-container pid is recorded
    pub fn pid_file(&self) -> String {
        format!("/tmp/dotrun-exec-{}.pid", self.id.simple())
    }

    /// Command line for messages
    pub fn display(&self) -> String {
        self.argv.join(" ")
    }
}

/// A process started inside a container
#[async_trait]
pub trait ExecProcess: Send {
    /// Wait for the process to exit and return its exit status
    async fn wait(&mut self) -> DotrunResult<i32>;
}

/// Container engine interface
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Human-readable engine name
    fn engine_name(&self) -> &str;

    /// Fail with `RuntimeUnavailable` unless the engine answers
    async fn ping(&self) -> DotrunResult<()>;

    /// Inspect a container by name, `None` if absent
    async fn inspect(&self, name: &str) -> DotrunResult<Option<ContainerInfo>>;

    /// Check if an image exists locally
    async fn image_exists(&self, image: &str) -> DotrunResult<bool>;

    /// Pull an image, reporting each output line
    async fn pull(&self, image: &str, on_output: &(dyn Fn(String) + Send + Sync))
        -> DotrunResult<()>;

    /// Create (but do not start) a container, returning its ID
    async fn create(&self, spec: &ContainerSpec) -> DotrunResult<String>;

    /// Start a created container
    async fn start(&self, name: &str) -> DotrunResult<()>;

    /// Stop a running container
    async fn stop(&self, name: &str) -> DotrunResult<()>;

    /// Force-remove a container; absence is success
    async fn remove(&self, name: &str) -> DotrunResult<()>;

    /// Create a named volume if it does not exist
    async fn volume_create(&self, name: &str, labels: &HashMap<String, String>)
        -> DotrunResult<()>;

    /// Remove a named volume; absence is success
    async fn volume_remove(&self, name: &str) -> DotrunResult<()>;

    /// Start a command inside a running container
    async fn exec(&self, container: &str, request: &ExecRequest)
        -> DotrunResult<Box<dyn ExecProcess>>;

    /// Deliver a signal to the process started by `request`
    async fn signal(
        &self,
        container: &str,
        request: &ExecRequest,
        signal: ExecSignal,
    ) -> DotrunResult<()>;
}
