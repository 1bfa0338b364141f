//! Dependency install gating
//!
//! - `gate`: fingerprint check and install
//! - `lock`: per-project cross-process install lock
//! - `state`: persisted fingerprint record

mod gate;
mod lock;
mod state;

pub use gate::{InstallGate, InstallResult};
pub use lock::InstallLock;
pub use state::{FingerprintRecord, ProjectState};
