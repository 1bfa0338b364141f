//! Orchestration module for the project container
//!
//! - `engine`: the narrow container engine interface
//! - `cli_engine`: docker/podman CLI implementation
//! - `runtime`: create/reuse/teardown policy for the per-project container

mod cli_engine;
pub mod container;
pub mod engine;
mod factory;
mod runtime;

pub use cli_engine::CliEngine;
pub use container::{
    CacheVolume, ContainerHandle, ContainerInfo, ContainerSpec, ContainerState, VolumeSet,
};
pub use engine::{ContainerEngine, ExecProcess, ExecRequest, ExecSignal, StdioMode};
pub use factory::{create_engine, EngineKind};
pub use runtime::ContainerRuntime;

use crate::error::{DotrunError, DotrunResult};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Max number of output lines to include in error messages.
const ERROR_TAIL_LINES: usize = 50;

/// Last `ERROR_TAIL_LINES` lines of collected engine output
pub(crate) fn error_tail(lines: &[String]) -> String {
    let start = lines.len().saturating_sub(ERROR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Stream stdout+stderr from a child process, calling `on_output` for each line.
///
/// Returns all collected output lines for error reporting. This is a standalone
/// async function (not behind `async_trait`) to avoid lifetime issues with the
/// `dyn Fn` callback.
pub(crate) async fn stream_child_output(
    child: &mut tokio::process::Child,
    on_output: &(dyn Fn(String) + Send + Sync),
) -> DotrunResult<Vec<String>> {
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| DotrunError::Internal("child stderr not piped".to_string()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| DotrunError::Internal("child stdout not piped".to_string()))?;

    let mut stderr_reader = BufReader::new(stderr).lines();
    let mut stdout_reader = BufReader::new(stdout).lines();

    let mut all_output = Vec::new();
    let mut stderr_done = false;
    let mut stdout_done = false;

    while !stderr_done || !stdout_done {
        tokio::select! {
            line = stderr_reader.next_line(), if !stderr_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    _ => stderr_done = true,
                }
            }
            line = stdout_reader.next_line(), if !stdout_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    _ => stdout_done = true,
                }
            }
        }
    }

    Ok(all_output)
}
