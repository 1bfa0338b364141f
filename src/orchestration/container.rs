//! Container and volume types shared by the engine and the runtime

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Label keys stamped on every container and volume dotrun creates
pub mod labels {
    /// Marks a resource as managed by dotrun
    pub const MANAGED: &str = "io.dotrun.managed";
    /// Absolute project path the resource belongs to
    pub const PROJECT: &str = "io.dotrun.project";
    /// Cache kind for volumes (yarn, pip)
    pub const CACHE: &str = "io.dotrun.cache";
}

/// Everything needed to create the project container
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    /// Container name
    pub name: String,
    /// Toolchain image
    pub image: String,
    /// Project directory, bind-mounted at the same path inside
    pub project_dir: PathBuf,
    /// Volume mounts (source:target format)
    pub volumes: Vec<String>,
    /// Environment baked into the container
    pub env: Vec<(String, String)>,
    /// Labels
    pub labels: HashMap<String, String>,
    /// Network mode
    pub network: String,
    /// User to run as
    pub user: Option<String>,
    /// Long-running command keeping the container up
    pub command: Vec<String>,
}

/// Lifecycle state of the project container
///
/// `Absent -> Created -> Running`; anything the engine reports that is
/// neither created/stopped nor running is `Broken` and gets recreated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    /// No container with this name
    Absent,
    /// Exists but is not running (created, exited)
    Created,
    /// Running and able to accept exec
    Running,
    /// Dead, restarting, paused or otherwise unusable
    Broken,
}

impl ContainerState {
    /// Map an engine status string (`{{.State.Status}}`) to a lifecycle state
    pub fn from_status(status: &str) -> Self {
        match status.trim() {
            "running" => Self::Running,
            "created" | "exited" | "stopped" | "configured" => Self::Created,
            _ => Self::Broken,
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Broken => write!(f, "broken"),
        }
    }
}

/// What the engine reports about an existing container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    /// Container ID
    pub id: String,
    /// Lifecycle state
    pub state: ContainerState,
    /// Image reference it was created from
    pub image: String,
}

/// The long-lived container bound to one project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    /// Container name
    pub name: String,
    /// Container ID
    pub id: String,
    /// Working directory for commands (the project path)
    pub workdir: PathBuf,
}

/// Cache mount for one package ecosystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheVolume {
    /// Volume name
    pub name: String,
    /// Cache kind label
    pub kind: &'static str,
    /// Mount path inside the container
    pub container_path: &'static str,
    /// Variable pointing the package manager at the mount
    pub env_var: &'static str,
}

impl CacheVolume {
    /// Generate the volume mount string for the engine
    pub fn volume_arg(&self) -> String {
        format!("{}:{}", self.name, self.container_path)
    }
}

/// Named volumes holding a project's dependency caches
///
/// Volumes outlive the container so a recreate does not discard caches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSet {
    pub yarn: CacheVolume,
    pub pip: CacheVolume,
}

impl VolumeSet {
    /// Volume set for a container name prefix
    pub fn for_prefix(prefix: &str) -> Self {
        Self {
            yarn: CacheVolume {
                name: format!("{}-yarn", prefix),
                kind: "yarn",
                container_path: "/cache/yarn",
                env_var: "YARN_CACHE_FOLDER",
            },
            pip: CacheVolume {
                name: format!("{}-pip", prefix),
                kind: "pip",
                container_path: "/cache/pip",
                env_var: "PIP_CACHE_DIR",
            },
        }
    }

    /// All volumes in the set
    pub fn all(&self) -> [&CacheVolume; 2] {
        [&self.yarn, &self.pip]
    }

    /// Mount arguments for container creation
    pub fn volume_args(&self) -> Vec<String> {
        self.all().iter().map(|v| v.volume_arg()).collect()
    }

    /// Cache location variables for container creation
    pub fn env(&self) -> Vec<(String, String)> {
        self.all()
            .iter()
            .map(|v| (v.env_var.to_string(), v.container_path.to_string()))
            .collect()
    }
}
