//! Per-invocation project identity

use crate::error::{DotrunError, DotrunResult};
use crate::orchestration::VolumeSet;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Which project an invocation operates on
///
/// Immutable for the lifetime of one invocation. The id is derived from the
/// absolute path alone, so every invocation against the same directory maps
/// to the same container, volumes and state files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectContext {
    path: PathBuf,
    overrides: Vec<(String, String)>,
    id: String,
    slug: String,
}

impl ProjectContext {
    /// Build a context for `path`, which must be an existing directory
    pub fn new(path: impl AsRef<Path>, overrides: Vec<(String, String)>) -> DotrunResult<Self> {
        let path = path.as_ref();
        let path = path.canonicalize().map_err(|e| {
            DotrunError::io(format!("resolving project path {}", path.display()), e)
        })?;

        if !path.is_dir() {
            return Err(DotrunError::User(format!(
                "Project path is not a directory: {}",
                path.display()
            )));
        }

        Ok(Self::from_canonical(path, overrides))
    }

    fn from_canonical(path: PathBuf, overrides: Vec<(String, String)>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(path.as_os_str().as_encoded_bytes());
        let id = hex::encode(&hasher.finalize()[..6]);

        let slug = path
            .file_name()
            .map(|n| slugify(&n.to_string_lossy()))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "root".to_string());

        Self {
            path,
            overrides,
            id,
            slug,
        }
    }

    /// Absolute project path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Caller-supplied `KEY=VALUE` overrides
    pub fn overrides(&self) -> &[(String, String)] {
        &self.overrides
    }

    /// Stable 12-hex-char identifier derived from the path
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Container name for this project
    pub fn container_name(&self) -> String {
        format!("dotrun-{}-{}", self.slug, self.id)
    }

    /// Dependency cache volumes for this project
    pub fn volume_set(&self) -> VolumeSet {
        VolumeSet::for_prefix(&self.container_name())
    }
}

/// Reduce a directory name to characters valid in container names
fn slugify(name: &str) -> String {
    let slug: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    slug.trim_matches(|c| c == '-' || c == '.').chars().take(32).collect()
}
