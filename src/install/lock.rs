//! Cross-process install lock
//!
//! An advisory exclusive lock on `<state_dir>/projects/<id>/install.lock`.
//! The lock is held by an open file handle, so it is released when the
//! guard drops and also when the process dies. Waiting polls the lock so
//! the wait can be abandoned.

use crate::error::{DotrunError, DotrunResult};
use crate::executor::interrupted;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// How often a waiter retries a contended lock
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Guard for the per-project install lock
#[derive(Debug)]
pub struct InstallLock {
    file: File,
    path: PathBuf,
}

impl InstallLock {
    /// Wait until the lock at `path` is held; Ctrl-C gives up with `Interrupted`
    pub async fn acquire(path: &Path) -> DotrunResult<Self> {
        Self::acquire_until(path, interrupted()).await
    }

    /// Wait until the lock at `path` is held or `cancel` completes
    ///
    /// The lock is tried before `cancel` is first polled, so a free lock is
    /// always taken.
    async fn acquire_until<F>(path: &Path, cancel: F) -> DotrunResult<Self>
    where
        F: Future<Output = ()>,
    {
        let file = Self::open(path)?;
        tokio::pin!(cancel);
        let mut announced = false;

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => break,
                Err(e) if is_contended(&e) => {
                    if !announced {
                        info!("Waiting for another install of this project to finish");
                        announced = true;
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(LOCK_POLL_INTERVAL) => {}
                        _ = &mut cancel => {
                            debug!("Gave up waiting for {}", path.display());
                            return Err(DotrunError::Interrupted);
                        }
                    }
                }
                Err(source) => {
                    return Err(DotrunError::Lock {
                        path: path.to_path_buf(),
                        source,
                    })
                }
            }
        }

        debug!("Acquired install lock {}", path.display());
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Take the lock only if nobody holds it
    #[cfg(test)]
    fn try_acquire(path: &Path) -> DotrunResult<Option<Self>> {
        let file = Self::open(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                file,
                path: path.to_path_buf(),
            })),
            Err(e) if is_contended(&e) => Ok(None),
            Err(source) => Err(DotrunError::Lock {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn open(path: &Path) -> DotrunResult<File> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                DotrunError::io(format!("creating state directory {}", parent.display()), e)
            })?;
        }

        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|source| DotrunError::Lock {
                path: path.to_path_buf(),
                source,
            })
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!("Failed to unlock {}: {}", self.path.display(), e);
        }
    }
}

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
