//! Error types for dotrun
//!
//! All modules use `DotrunResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for dotrun operations
pub type DotrunResult<T> = Result<T, DotrunError>;

/// Exit codes reported for each error kind (sysexits-style).
pub mod exit_codes {
    pub const CONFIG: u8 = 78;
    pub const IO: u8 = 74;
    pub const RUNTIME_UNAVAILABLE: u8 = 69;
    pub const CONTAINER: u8 = 71;
    pub const INSTALL: u8 = 75;
    pub const EXECUTION: u8 = 126;
    pub const INTERRUPTED: u8 = 130;
    pub const GENERAL: u8 = 1;
}

/// All errors that can occur in dotrun
#[derive(Error, Debug)]
pub enum DotrunError {
    // Configuration errors
    #[error("Malformed line {line} in {path}: {reason}")]
    Config {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // Container engine errors
    #[error("Container engine '{engine}' is not available: {reason}")]
    RuntimeUnavailable { engine: String, reason: String },

    #[error("Container {name} could not be brought up: {reason}")]
    Container { name: String, reason: String },

    #[error("Image pull failed: {image}: {reason}")]
    ImagePull { image: String, reason: String },

    #[error("Command could not be dispatched to container {container}: {reason}")]
    Execution { container: String, reason: String },

    // Install errors
    #[error("Install command failed: {command}, exit code: {code}")]
    Install { command: String, code: i32 },

    #[error("Failed to lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Interrupted while waiting for the install lock")]
    Interrupted,

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl DotrunError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Create a container error
    pub fn container(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Container {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an execution error
    pub fn execution(container: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Execution {
            container: container.into(),
            reason: reason.into(),
        }
    }

    /// Whether the executor should re-ensure the container and try once more
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Execution { .. })
    }

    /// Process exit status reported for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config { .. } | Self::ConfigInvalid { .. } | Self::TomlParse(_) => {
                exit_codes::CONFIG
            }
            Self::Io { .. } | Self::Lock { .. } => exit_codes::IO,
            Self::RuntimeUnavailable { .. } => exit_codes::RUNTIME_UNAVAILABLE,
            Self::Container { .. } | Self::ImagePull { .. } => exit_codes::CONTAINER,
            Self::Install { .. } => exit_codes::INSTALL,
            Self::Execution { .. } => exit_codes::EXECUTION,
            Self::Interrupted => exit_codes::INTERRUPTED,
            _ => exit_codes::GENERAL,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::RuntimeUnavailable { .. } => {
                Some("Make sure Docker is installed and the daemon is running: docker info")
            }
            Self::Install { .. } => Some("Dependencies will be reinstalled on the next run"),
            Self::Container { .. } => Some("Run: dotrun clean, then try again"),
            _ => None,
        }
    }
}
