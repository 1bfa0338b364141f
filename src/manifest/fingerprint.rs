//! Content fingerprint over the project's dependency manifests
//!
//! Same manifest bytes = same fingerprint. Each recognized manifest
//! contributes its path, a presence marker and (when present) its length
//! and contents, so an absent file hashes differently from an empty one.

use crate::error::{DotrunError, DotrunResult};
use crate::manifest::Manifest;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

/// Opaque SHA256 digest of the project's manifests
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestFingerprint(String);

impl ManifestFingerprint {
    /// Hex representation of the digest
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for log lines
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for ManifestFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read a manifest, mapping "not there" to `None`
fn read_manifest(path: &Path) -> DotrunResult<Option<Vec<u8>>> {
    if path.is_dir() {
        return Ok(None);
    }

    match fs::read(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DotrunError::io(
            format!("reading manifest {}", path.display()),
            e,
        )),
    }
}

/// Compute the fingerprint of all recognized manifests in `project_dir`
///
/// Pure function of filesystem state. A missing manifest is not an error;
/// a present manifest that cannot be read is.
pub fn fingerprint(project_dir: &Path) -> DotrunResult<ManifestFingerprint> {
    let mut hasher = Sha256::new();

    for manifest in Manifest::all() {
        let name = manifest.file_name();
        hasher.update(name.as_bytes());
        hasher.update([0u8]);

        match read_manifest(&manifest.path_in(project_dir))? {
            Some(contents) => {
                debug!("Fingerprinting {} ({} bytes)", name, contents.len());
                hasher.update(b"present\0");
                hasher.update((contents.len() as u64).to_le_bytes());
                hasher.update(&contents);
            }
            None => hasher.update(b"absent\0"),
        }
    }

    Ok(ManifestFingerprint(hex::encode(hasher.finalize())))
}
