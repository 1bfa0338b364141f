//! Engine factory
//!
//! Picks the container engine implementation from configuration.

use crate::config::Config;
use crate::error::{DotrunError, DotrunResult};
use crate::orchestration::cli_engine::CliEngine;
use crate::orchestration::engine::ContainerEngine;
use std::path::Path;
use std::sync::Arc;

/// Known engine CLIs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Docker,
    Podman,
    /// Any other docker-compatible CLI
    Compatible,
}

impl EngineKind {
    /// Classify an engine binary by its file name
    pub fn detect(binary: &str) -> Self {
        let name = Path::new(binary)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(binary);
        match name {
            "docker" => EngineKind::Docker,
            "podman" => EngineKind::Podman,
            _ => EngineKind::Compatible,
        }
    }

    /// Get a human-readable engine name
    pub fn name(&self) -> &'static str {
        match self {
            EngineKind::Docker => "Docker",
            EngineKind::Podman => "Podman",
            EngineKind::Compatible => "Docker-compatible engine",
        }
    }
}

/// Create the container engine named in `config.engine.binary`
pub fn create_engine(config: &Config) -> DotrunResult<Arc<dyn ContainerEngine>> {
    let binary = config.engine.binary.trim();
    if binary.is_empty() {
        return Err(DotrunError::User(
            "engine.binary must name a container engine CLI".to_string(),
        ));
    }

    tracing::debug!("Using {} ({})", EngineKind::detect(binary).name(), binary);
    Ok(Arc::new(CliEngine::new(binary)))
}
