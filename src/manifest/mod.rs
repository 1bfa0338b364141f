//! Project manifest detection
//!
//! A manifest is any file that declares the project's dependencies. The set
//! of recognized manifests is fixed and ordered; both the fingerprint and the
//! install plan are derived from it.

pub mod fingerprint;
pub mod plan;

pub use fingerprint::{fingerprint, ManifestFingerprint};
pub use plan::{package_scripts, plan_install, InstallStep};

use std::fmt;
use std::path::{Path, PathBuf};

/// Recognized dependency manifests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Manifest {
    /// Node package manifest (package.json)
    Package,
    /// Yarn lock file (yarn.lock)
    YarnLock,
    /// Python requirements file (requirements.txt)
    Requirements,
    /// Python project file (pyproject.toml)
    PyProject,
}

impl Manifest {
    /// File name relative to the project root
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Package => "package.json",
            Self::YarnLock => "yarn.lock",
            Self::Requirements => "requirements.txt",
            Self::PyProject => "pyproject.toml",
        }
    }

    /// All manifests in fingerprint order
    pub fn all() -> &'static [Self] {
        &[Self::Package, Self::YarnLock, Self::Requirements, Self::PyProject]
    }

    /// Absolute path of this manifest inside `project_dir`
    pub fn path_in(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(self.file_name())
    }

    /// Whether the manifest exists as a regular file in `project_dir`
    pub fn is_present(&self, project_dir: &Path) -> bool {
        self.path_in(project_dir).is_file()
    }
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file_name())
    }
}
