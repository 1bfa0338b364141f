//! CLI command implementations

pub mod project;
pub mod version;

pub use project::execute as project;
pub use version::execute as version;
