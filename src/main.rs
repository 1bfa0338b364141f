//! dotrun - containerized per-project dependency management
//!
//! CLI entry point that dispatches to commands.

use clap::Parser;
use console::style;
use dotrun::cli::{commands, Cli};
use dotrun::config::ConfigManager;
use dotrun::error::{exit_codes, DotrunResult};
use dotrun::project::commands::VERSION;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(exit_codes::GENERAL)),
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> DotrunResult<i32> {
    let cli = Cli::parse();

    // Initialize logging: 0 = warn (spinners only), 1 = info, 2 = debug, 3+ = RUST_LOG
    let filter = match cli.verbose {
        0 => EnvFilter::new("dotrun=warn"),
        1 => EnvFilter::new("dotrun=info"),
        2 => EnvFilter::new("dotrun=debug"),
        _ => EnvFilter::from_default_env(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    // Version doesn't need config or a project
    if cli.command.as_deref() == Some(VERSION) {
        return Ok(commands::version());
    }

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    commands::project(cli, &config).await
}
