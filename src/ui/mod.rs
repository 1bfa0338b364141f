//! Status output for the CLI
//!
//! Everything here writes to stderr so that the stdout of commands run in the
//! project container stays untouched. Interactive terminals get spinners and
//! symbols; CI and pipes get plain bracketed prefixes.
//!
//! # Example
//!
//! ```rust,ignore
//! use dotrun::ui::{self, UiContext, TaskSpinner};
//!
//! let ctx = UiContext::detect();
//!
//! let mut spinner = TaskSpinner::new(&ctx);
//! spinner.start("Creating dotrun container...");
//! // ... do work ...
//! spinner.stop("Container ready");
//!
//! ui::step_ok(&ctx, "Dependencies up to date");
//! ```

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{step_error, step_info, step_ok, step_warn, step_warn_hint};
pub use progress::TaskSpinner;
