//! Progress indicators with CI fallback

use super::context::UiContext;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Widest engine output line shown next to the spinner
const MAX_LINE_WIDTH: usize = 60;

/// A task spinner with CI fallback
pub struct TaskSpinner {
    spinner: Option<ProgressBar>,
    interactive: bool,
}

impl TaskSpinner {
    /// Create a new spinner; nothing is drawn until `start`
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            interactive: ctx.use_fancy_output(),
        }
    }

    /// Start the spinner with a message
    ///
    /// Starting again while running just replaces the message.
    pub fn start(&mut self, message: &str) {
        if !self.interactive {
            eprintln!("{} {}", style("...").dim(), message);
            return;
        }

        match self.spinner {
            Some(ref spinner) => spinner.set_message(message.to_string()),
            None => {
                let spinner = ProgressBar::new_spinner();
                spinner.set_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner:.cyan} {msg}  {prefix:.dim}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner())
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "),
                );
                spinner.set_message(message.to_string());
                spinner.enable_steady_tick(Duration::from_millis(120));
                self.spinner = Some(spinner);
            }
        }
    }

    /// A callback that shows each engine output line beside the spinner
    ///
    /// In plain mode lines only go to the debug log.
    pub fn line_sink(&self) -> impl Fn(String) + Send + Sync {
        let spinner = self.spinner.clone();
        move |line: String| {
            tracing::debug!("{}", line);
            if let Some(ref spinner) = spinner {
                spinner.set_prefix(truncate_line(&line));
            }
        }
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        self.finish_with(style("✓").green(), style("[OK]").green(), message);
    }

    /// Stop with error message
    pub fn stop_error(&mut self, message: &str) {
        self.finish_with(style("✗").red(), style("[FAIL]").red(), message);
    }

    /// Clear the spinner without any message
    pub fn clear(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    fn finish_with(
        &mut self,
        symbol: console::StyledObject<&str>,
        plain: console::StyledObject<&str>,
        message: &str,
    ) {
        self.clear();
        if self.interactive {
            eprintln!("{} {}", symbol, message);
        } else {
            eprintln!("{} {}", plain, message);
        }
    }
}

impl Drop for TaskSpinner {
    fn drop(&mut self) {
        self.clear();
    }
}

fn truncate_line(line: &str) -> String {
    let trimmed = line.trim();
    if trimmed.chars().count() > MAX_LINE_WIDTH {
        let head: String = trimmed.chars().take(MAX_LINE_WIDTH - 3).collect();
        format!("{}...", head)
    } else {
        trimmed.to_string()
    }
}
