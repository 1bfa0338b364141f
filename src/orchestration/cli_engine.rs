//! Container engine driven through the docker (or podman) CLI
//!
//! Both CLIs accept the same subset of commands used here, so a single
//! implementation parameterised by binary name covers them.

use crate::environment::ResolvedEnvironment;
use crate::error::{DotrunError, DotrunResult};
use crate::orchestration::container::{ContainerInfo, ContainerSpec, ContainerState};
use crate::orchestration::engine::{ContainerEngine, ExecProcess, ExecRequest, ExecSignal, StdioMode};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tempfile::NamedTempFile;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Records the process id for signal forwarding, drops pid files of
/// processes that are gone, then replaces itself with the real command.
/// `$0` is the pid file, `$@` the command.
const EXEC_WRAPPER: &str = r#"for f in /tmp/dotrun-exec-*.pid; do [ -f "$f" ] && ! kill -0 "$(cat "$f")" 2>/dev/null && rm -f "$f"; done; echo $$ > "$0" 2>/dev/null; exec "$@""#;

/// Sends a signal to the pid recorded in `$1` (`$0` is the signal name)
const SIGNAL_SCRIPT: &str = r#"[ -f "$1" ] && kill -s "$0" "$(cat "$1")" 2>/dev/null; true"#;

/// Grace period before `stop` kills the keepalive process
const STOP_TIMEOUT_SECS: &str = "2";

/// Format string for `inspect`: id, status and image separated by `|`
const INSPECT_FORMAT: &str = "{{.Id}}|{{.State.Status}}|{{.Config.Image}}";

/// Container engine backed by an engine CLI binary
pub struct CliEngine {
    binary: String,
}

impl CliEngine {
    /// Create an engine for the given CLI binary (e.g. "docker")
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn unavailable(&self, reason: impl Into<String>) -> DotrunError {
        DotrunError::RuntimeUnavailable {
            engine: self.binary.clone(),
            reason: reason.into(),
        }
    }

    /// Map a spawn failure: a missing binary means the engine is unavailable
    fn spawn_error(&self, args: &[&str], e: std::io::Error) -> DotrunError {
        if e.kind() == ErrorKind::NotFound {
            self.unavailable(format!("'{}' not found in PATH", self.binary))
        } else {
            DotrunError::command_failed(format!("{} {:?}", self.binary, args), e)
        }
    }

    /// Execute an engine command and return the output
    async fn run(&self, args: &[&str]) -> DotrunResult<std::process::Output> {
        debug!("Executing: {} {:?}", self.binary, args);

        Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| self.spawn_error(args, e))
    }

    /// Whether engine stderr says the object does not exist
    fn is_missing(stderr: &str) -> bool {
        stderr.to_lowercase().contains("no such")
    }

    /// Arguments for `create`
    pub(crate) fn create_args(spec: &ContainerSpec) -> Vec<String> {
        let project = spec.project_dir.display().to_string();
        let mut args = vec![
            "create".to_string(),
            "--name".to_string(),
            spec.name.clone(),
        ];

        let mut labels: Vec<_> = spec.labels.iter().collect();
        labels.sort();
        for (k, v) in labels {
            args.push("--label".to_string());
            args.push(format!("{}={}", k, v));
        }

        args.push("-v".to_string());
        args.push(format!("{}:{}", project, project));
        for v in &spec.volumes {
            args.push("-v".to_string());
            args.push(v.clone());
        }

        args.push("-w".to_string());
        args.push(project);

        args.push("--network".to_string());
        args.push(spec.network.clone());

        if let Some(user) = &spec.user {
            args.push("--user".to_string());
            args.push(user.clone());
        }

        for (k, v) in &spec.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", k, v));
        }

        args.push(spec.image.clone());
        args.extend(spec.command.iter().cloned());
        args
    }

    /// Arguments for `exec`
    ///
    /// Variables travel in `env_file` so their values never appear in argv.
    pub(crate) fn exec_args(
        container: &str,
        request: &ExecRequest,
        env_file: Option<&Path>,
    ) -> Vec<String> {
        let mut args = vec!["exec".to_string()];

        if let StdioMode::Interactive { tty } = request.stdio {
            args.push("-i".to_string());
            if tty {
                args.push("-t".to_string());
            }
        }

        if let Some(user) = &request.user {
            args.push("--user".to_string());
            args.push(user.clone());
        }

        args.push("-w".to_string());
        args.push(request.workdir.display().to_string());

        if let Some(path) = env_file {
            args.push("--env-file".to_string());
            args.push(path.display().to_string());
        }

        args.push(container.to_string());
        args.push("sh".to_string());
        args.push("-c".to_string());
        args.push(EXEC_WRAPPER.to_string());
        args.push(request.pid_file());
        args.extend(request.argv.iter().cloned());
        args
    }

    /// Parse `inspect` output produced with `INSPECT_FORMAT`
    fn parse_inspect(stdout: &str) -> Option<ContainerInfo> {
        let mut parts = stdout.trim().splitn(3, '|');
        let id = parts.next()?.to_string();
        let state = ContainerState::from_status(parts.next()?);
        let image = parts.next()?.to_string();
        if id.is_empty() {
            return None;
        }
        Some(ContainerInfo { id, state, image })
    }
}

/// Write `env` to a private file for `exec --env-file`
///
/// The file is created with mode 0600 and deleted when the handle drops.
/// `None` when there is nothing to pass.
fn write_env_file(env: &ResolvedEnvironment) -> DotrunResult<Option<NamedTempFile>> {
    if env.is_empty() {
        return Ok(None);
    }

    let mut file = tempfile::Builder::new()
        .prefix("dotrun-env-")
        .tempfile()
        .map_err(|e| DotrunError::io("creating env file", e))?;

    for (key, value) in env {
        // One variable per line, value taken literally
        if value.contains('\n') {
            warn!("Not passing {}: multi-line values are not supported", key);
            continue;
        }
        writeln!(file, "{}={}", key, value)
            .map_err(|e| DotrunError::io(format!("writing {}", file.path().display()), e))?;
    }
    file.flush()
        .map_err(|e| DotrunError::io(format!("writing {}", file.path().display()), e))?;

    Ok(Some(file))
}

/// Exit code of a finished engine client, following shell conventions for signals
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}

/// An `exec` client process
struct CliExecProcess {
    child: Child,
    command: String,
    /// Kept until the client exits
    _env_file: Option<NamedTempFile>,
}

#[async_trait]
impl ExecProcess for CliExecProcess {
    async fn wait(&mut self) -> DotrunResult<i32> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| DotrunError::command_failed(self.command.clone(), e))?;
        Ok(exit_code(status))
    }
}

#[async_trait]
impl ContainerEngine for CliEngine {
    fn engine_name(&self) -> &str {
        &self.binary
    }

    async fn ping(&self) -> DotrunResult<()> {
        let output = self.run(&["info", "--format", "{{.ID}}"]).await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(self.unavailable(stderr.trim().to_string()))
        }
    }

    async fn inspect(&self, name: &str) -> DotrunResult<Option<ContainerInfo>> {
        let output = self
            .run(&["inspect", "--type", "container", "--format", INSPECT_FORMAT, name])
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if Self::is_missing(&stderr) {
                return Ok(None);
            }
            return Err(DotrunError::command_exec("inspect", stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(Self::parse_inspect(&stdout))
    }

    async fn image_exists(&self, image: &str) -> DotrunResult<bool> {
        let output = self.run(&["image", "inspect", image]).await?;
        Ok(output.status.success())
    }

    async fn pull(
        &self,
        image: &str,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> DotrunResult<()> {
        info!("Pulling image: {}", image);

        let args = ["pull", image];
        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(&args, e))?;

        let all_output = super::stream_child_output(&mut child, on_output).await?;

        let status = child
            .wait()
            .await
            .map_err(|e| DotrunError::command_failed(format!("{} pull", self.binary), e))?;

        if !status.success() {
            return Err(DotrunError::ImagePull {
                image: image.to_string(),
                reason: super::error_tail(&all_output),
            });
        }

        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> DotrunResult<String> {
        let args = Self::create_args(spec);
        debug!("Creating container: {} {:?}", self.binary, args);

        let args_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.run(&args_refs).await?;

        if output.status.success() {
            let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
            debug!(
                "Container created: {}",
                &container_id[..12.min(container_id.len())]
            );
            Ok(container_id)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(DotrunError::container(&spec.name, stderr.trim()))
        }
    }

    async fn start(&self, name: &str) -> DotrunResult<()> {
        debug!("Starting container: {}", name);

        let output = self.run(&["start", name]).await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(DotrunError::container(name, stderr.trim()))
        }
    }

    async fn stop(&self, name: &str) -> DotrunResult<()> {
        debug!("Stopping container: {}", name);

        let output = self.run(&["stop", "--time", STOP_TIMEOUT_SECS, name]).await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if Self::is_missing(&stderr) {
                Ok(())
            } else {
                Err(DotrunError::command_exec(format!("{} stop", self.binary), stderr))
            }
        }
    }

    async fn remove(&self, name: &str) -> DotrunResult<()> {
        debug!("Removing container: {}", name);

        let output = self.run(&["rm", "-f", name]).await?;

        if output.status.success() {
            Ok(())
        } else {
            // Ignore error if container doesn't exist
            let stderr = String::from_utf8_lossy(&output.stderr);
            if Self::is_missing(&stderr) {
                Ok(())
            } else {
                Err(DotrunError::command_exec(format!("{} rm", self.binary), stderr))
            }
        }
    }

    async fn volume_create(&self, name: &str, labels: &HashMap<String, String>) -> DotrunResult<()> {
        let existing = self.run(&["volume", "inspect", name]).await?;
        if existing.status.success() {
            return Ok(());
        }

        debug!("Creating volume: {}", name);

        let mut args = vec!["volume", "create"];

        let label_strings: Vec<String> =
            labels.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        for label in &label_strings {
            args.push("--label");
            args.push(label);
        }

        args.push(name);

        let output = self.run(&args).await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(DotrunError::command_exec(format!("{} volume create", self.binary), stderr))
        }
    }

    async fn volume_remove(&self, name: &str) -> DotrunResult<()> {
        debug!("Removing volume: {}", name);

        let output = self.run(&["volume", "rm", "-f", name]).await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if Self::is_missing(&stderr) {
                Ok(())
            } else {
                Err(DotrunError::command_exec(format!("{} volume rm", self.binary), stderr))
            }
        }
    }

    async fn exec(
        &self,
        container: &str,
        request: &ExecRequest,
    ) -> DotrunResult<Box<dyn ExecProcess>> {
        let env_file = write_env_file(&request.env)?;
        let args = Self::exec_args(container, request, env_file.as_ref().map(|f| f.path()));
        debug!("Executing in {}: {}", container, request.display());

        let mut cmd = Command::new(&self.binary);
        cmd.args(&args);

        match request.stdio {
            StdioMode::Batch => {
                cmd.stdin(Stdio::null());
                // Terminal interrupts reach the command through `signal`, not
                // by killing the client
                #[cfg(unix)]
                cmd.process_group(0);
            }
            StdioMode::Interactive { .. } => {
                cmd.stdin(Stdio::inherit());
            }
        }
        cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());

        let child = cmd.spawn().map_err(|e| {
            let args_refs: Vec<&str> = args.iter().map(String::as_str).collect();
            self.spawn_error(&args_refs, e)
        })?;

        Ok(Box::new(CliExecProcess {
            child,
            command: format!("{} exec {}", self.binary, request.display()),
            _env_file: env_file,
        }))
    }

    async fn signal(
        &self,
        container: &str,
        request: &ExecRequest,
        signal: ExecSignal,
    ) -> DotrunResult<()> {
        debug!("Forwarding SIG{} to {} in {}", signal.name(), request.display(), container);

        let pid_file = request.pid_file();
        let output = self
            .run(&["exec", container, "sh", "-c", SIGNAL_SCRIPT, signal.name(), &pid_file])
            .await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(DotrunError::command_exec(format!("{} exec kill", self.binary), stderr))
        }
    }
}
