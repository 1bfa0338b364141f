//! Configuration schema for dotrun
//!
//! Configuration is stored at `~/.config/dotrun/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Container engine settings
    pub engine: EngineConfig,

    /// Container settings
    pub container: ContainerConfig,

    /// Dependency install commands
    pub install: InstallConfig,

    /// Project command settings
    pub run: RunConfig,

    /// Environment layering settings
    pub environment: EnvironmentConfig,
}

/// General application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Where per-project state (fingerprints, locks) is kept.
    /// Defaults to the platform state directory.
    pub state_dir: Option<PathBuf>,
}

/// Container engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine CLI binary ("docker" or "podman")
    pub binary: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
        }
    }
}

/// Container configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Toolchain image to use
    pub image: String,

    /// Network mode
    pub network: String,

    /// Run commands as this user (passed to `--user`)
    pub user: Option<String>,

    /// Command that keeps the container alive between invocations
    pub keepalive: Vec<String>,

    /// Additional volume mounts (host:container)
    pub extra_volumes: Vec<String>,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            image: "canonicalwebteam/dotrun-image:latest".to_string(),
            network: "host".to_string(),
            user: None,
            keepalive: vec!["sleep".to_string(), "infinity".to_string()],
            extra_volumes: vec![],
        }
    }
}

/// Install commands, run inside the container from the project root
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    /// Node install, run when package.json is present
    pub node: Vec<String>,

    /// Python install, run when requirements.txt is present
    pub python_requirements: Vec<String>,

    /// Python install, run when only pyproject.toml is present
    pub python_project: Vec<String>,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            node: strings(&["yarn", "install"]),
            python_requirements: strings(&["pip3", "install", "--requirement", "requirements.txt"]),
            python_project: strings(&["pip3", "install", "."]),
        }
    }
}

/// Project command configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Prefix used to run a package.json script by name
    pub runner: Vec<String>,

    /// Script run when no command is given
    pub default_command: String,

    /// Script run by `dotrun clean`, if package.json defines it
    pub clean_script: String,

    /// Default command for `dotrun exec`
    pub shell: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            runner: strings(&["yarn", "--no-default-rc", "run"]),
            default_command: "start".to_string(),
            clean_script: "clean".to_string(),
            shell: "bash".to_string(),
        }
    }
}

/// Environment layering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Host variables that are never inherited into the container
    pub exclude_host: Vec<String>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            exclude_host: strings(&[
                "PATH",
                "HOME",
                "HOSTNAME",
                "PWD",
                "OLDPWD",
                "SHELL",
                "SHLVL",
                "USER",
                "LOGNAME",
                "TMPDIR",
                "TERM_PROGRAM",
                "_",
            ]),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
