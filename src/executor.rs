//! Command execution inside the project container
//!
//! `ContainerRuntime::exec_inside` is the transport; this module is the
//! policy: stdio attachment, one re-ensure retry when the container cannot
//! accept the command, signal forwarding while waiting, and exact exit status
//! propagation.

use crate::environment::ResolvedEnvironment;
use crate::error::DotrunResult;
use crate::orchestration::{
    ContainerHandle, ContainerRuntime, ExecProcess, ExecRequest, ExecSignal, StdioMode,
};
use crate::project::ProjectContext;
use std::io::IsTerminal;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// How a command is attached to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// Output streamed, no stdin
    Batch,
    /// Full terminal attachment
    Interactive,
}

impl ExecMode {
    /// Stdio mode for the engine; a TTY is only requested when both ends are terminals
    fn stdio(self) -> StdioMode {
        match self {
            ExecMode::Batch => StdioMode::Batch,
            ExecMode::Interactive => StdioMode::Interactive {
                tty: std::io::stdin().is_terminal() && std::io::stdout().is_terminal(),
            },
        }
    }
}

/// Runs commands in the project container and returns their exit status
pub struct CommandExecutor {
    runtime: Arc<ContainerRuntime>,
    signals: Option<Mutex<UnboundedReceiver<ExecSignal>>>,
}

impl CommandExecutor {
    /// Forward SIGINT and SIGTERM received by this process
    pub fn new(runtime: Arc<ContainerRuntime>) -> Self {
        Self {
            runtime,
            signals: None,
        }
    }

    /// Forward signals sent through `signals` instead of the process's own
    pub fn with_signal_channel(
        runtime: Arc<ContainerRuntime>,
        signals: UnboundedReceiver<ExecSignal>,
    ) -> Self {
        Self {
            runtime,
            signals: Some(Mutex::new(signals)),
        }
    }

    /// Run `argv` in the container and return the in-container exit status
    ///
    /// If the container cannot accept the command it is re-ensured and the
    /// command is retried once.
    pub async fn run(
        &self,
        ctx: &ProjectContext,
        handle: &ContainerHandle,
        argv: Vec<String>,
        env: &ResolvedEnvironment,
        mode: ExecMode,
    ) -> DotrunResult<i32> {
        let request = ExecRequest::new(argv, env.clone(), handle.workdir.clone(), mode.stdio());
        debug!("Running `{}` ({:?})", request.display(), mode);

        let (handle, process) = match self.runtime.exec_inside(handle, &request).await {
            Ok(process) => (handle.clone(), process),
            Err(e) if e.is_retryable() => {
                warn!("{}; re-creating container and retrying", e);
                let handle = self.runtime.ensure(ctx).await?;
                let process = self.runtime.exec_inside(&handle, &request).await?;
                (handle, process)
            }
            Err(e) => return Err(e),
        };

        let code = self.wait_forwarding(&handle, &request, process).await?;
        debug!("`{}` exited with {}", request.display(), code);
        Ok(code)
    }

    /// Wait for the process, forwarding interrupt and terminate to it
    async fn wait_forwarding(
        &self,
        handle: &ContainerHandle,
        request: &ExecRequest,
        mut process: Box<dyn ExecProcess>,
    ) -> DotrunResult<i32> {
        let mut channel = match &self.signals {
            Some(signals) => Some(signals.lock().await),
            None => None,
        };
        let mut signals = match channel.as_deref_mut() {
            Some(receiver) => SignalListener::Channel(receiver),
            None => SignalListener::process(),
        };

        loop {
            tokio::select! {
                status = process.wait() => return status,
                signal = signals.recv() => {
                    debug!("Received SIG{}, forwarding to container", signal.name());
                    if let Err(e) = self.runtime.signal(handle, request, signal).await {
                        warn!("Could not forward SIG{}: {}", signal.name(), e);
                    }
                }
            }
        }
    }
}

/// Source of signals to forward while a command runs
enum SignalListener<'a> {
    /// Interrupt and terminate delivered to this process
    Process {
        #[cfg(unix)]
        terminate: Option<tokio::signal::unix::Signal>,
    },
    Channel(&'a mut UnboundedReceiver<ExecSignal>),
}

impl SignalListener<'_> {
    fn process() -> Self {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let terminate = match signal(SignalKind::terminate()) {
                Ok(s) => Some(s),
                Err(e) => {
                    warn!("Cannot listen for SIGTERM: {}", e);
                    None
                }
            };
            Self::Process { terminate }
        }
        #[cfg(not(unix))]
        {
            Self::Process {}
        }
    }

    /// Next signal; never completes if the source is closed
    async fn recv(&mut self) -> ExecSignal {
        match self {
            Self::Channel(receiver) => match receiver.recv().await {
                Some(signal) => signal,
                None => std::future::pending().await,
            },
            #[cfg(unix)]
            Self::Process { terminate } => {
                let sigterm = terminate.as_mut();
                let terminated = async move {
                    match sigterm {
                        Some(s) => {
                            if s.recv().await.is_none() {
                                std::future::pending::<()>().await;
                            }
                        }
                        None => std::future::pending::<()>().await,
                    }
                };
                tokio::select! {
                    _ = interrupted() => ExecSignal::Interrupt,
                    _ = terminated => ExecSignal::Terminate,
                }
            }
            #[cfg(not(unix))]
            Self::Process {} => {
                interrupted().await;
                ExecSignal::Interrupt
            }
        }
    }
}

/// Completes on Ctrl-C
///
/// Once a Ctrl-C listener exists the default SIGINT action is gone for the
/// rest of the process, so every wait that should be abortable selects on this.
pub(crate) async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
