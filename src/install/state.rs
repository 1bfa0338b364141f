//! Persisted install state per project
//!
//! Layout under the state directory:
//!
//! ```text
//! projects/<project-id>/fingerprint.json   last successful install
//! projects/<project-id>/install.lock       install lock
//! ```

use crate::error::{DotrunError, DotrunResult};
use crate::manifest::ManifestFingerprint;
use crate::project::ProjectContext;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const FINGERPRINT_FILE: &str = "fingerprint.json";
const LOCK_FILE: &str = "install.lock";

/// Record of the last successful install
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    /// Manifest fingerprint the install ran against
    pub fingerprint: ManifestFingerprint,
    /// Project the record belongs to
    pub project: PathBuf,
    /// When the install finished
    pub installed_at: DateTime<Utc>,
}

impl FingerprintRecord {
    pub fn new(fingerprint: ManifestFingerprint, project: &Path) -> Self {
        Self {
            fingerprint,
            project: project.to_path_buf(),
            installed_at: Utc::now(),
        }
    }
}

/// State files for one project
#[derive(Debug, Clone)]
pub struct ProjectState {
    dir: PathBuf,
}

impl ProjectState {
    pub fn new(state_dir: &Path, ctx: &ProjectContext) -> Self {
        Self {
            dir: state_dir.join("projects").join(ctx.id()),
        }
    }

    /// Directory holding this project's state
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn fingerprint_path(&self) -> PathBuf {
        self.dir.join(FINGERPRINT_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    /// Load the last recorded install, if any
    ///
    /// An unreadable or corrupt record counts as no record, which forces a
    /// reinstall.
    pub async fn load(&self) -> DotrunResult<Option<FingerprintRecord>> {
        let path = self.fingerprint_path();
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(DotrunError::io(
                    format!("reading install record {}", path.display()),
                    e,
                ))
            }
        };

        match serde_json::from_str::<FingerprintRecord>(&content) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!("Ignoring corrupt install record {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    /// Atomically replace the install record
    pub async fn persist(&self, record: &FingerprintRecord) -> DotrunResult<()> {
        let content = serde_json::to_string_pretty(record)?;
        let dir = self.dir.clone();
        let path = self.fingerprint_path();

        tokio::task::spawn_blocking(move || write_atomic(&dir, &path, content.as_bytes()))
            .await
            .map_err(|e| DotrunError::Internal(format!("state write task failed: {}", e)))??;

        debug!("Recorded fingerprint {}", record.fingerprint.short());
        Ok(())
    }

    /// Delete the install record; absence is success
    pub async fn clear(&self) -> DotrunResult<()> {
        let path = self.fingerprint_path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed install record {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DotrunError::io(
                format!("removing install record {}", path.display()),
                e,
            )),
        }
    }
}

/// Write to a temp file in `dir`, then rename over `path`
fn write_atomic(dir: &Path, path: &Path, content: &[u8]) -> DotrunResult<()> {
    std::fs::create_dir_all(dir)
        .map_err(|e| DotrunError::io(format!("creating state directory {}", dir.display()), e))?;

    let mut temp = tempfile::Builder::new()
        .prefix(".fingerprint-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| DotrunError::io(format!("creating temp file in {}", dir.display()), e))?;

    temp.write_all(content)
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|e| DotrunError::io(format!("writing {}", temp.path().display()), e))?;

    temp.persist(path)
        .map_err(|e| DotrunError::io(format!("replacing {}", path.display()), e.error))?;
    Ok(())
}
