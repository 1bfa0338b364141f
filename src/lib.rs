//! dotrun - containerized per-project dependency management
//!
//! Runs a project's commands inside a long-lived per-project container,
//! reinstalling node and Python dependencies only when the project's
//! manifests change.

pub mod cli;
pub mod config;
pub mod environment;
pub mod error;
pub mod executor;
pub mod install;
pub mod manifest;
pub mod orchestration;
pub mod project;
pub mod ui;

pub use error::{DotrunError, DotrunResult};
