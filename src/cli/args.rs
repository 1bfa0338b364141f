//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// dotrun - run project commands in a per-project container
///
/// Installs node and Python dependencies inside a reusable container when
/// the project's manifests change, then runs the requested package script
/// there. `exec`, `install`, `clean` and `version` are built in; any other
/// COMMAND is a package.json script.
#[derive(Parser, Debug)]
#[command(name = "dotrun")]
#[command(author, version, long_about = None)]
pub struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short = 'C', long = "directory", value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Don't check whether dependencies need installing
    #[arg(short, long)]
    pub skip_install: bool,

    /// Extra environment variable for the command (KEY=VALUE)
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_var)]
    pub env: Vec<(String, String)>,

    /// Increase verbosity (-v info, -vv debug, -vvv honour RUST_LOG)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, env = "DOTRUN_CONFIG")]
    pub config: Option<PathBuf>,

    /// exec, install, clean, version, or a package script (default: start)
    pub command: Option<String>,

    /// Arguments passed to the command
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

/// Parse environment variable in KEY=VALUE format
fn parse_env_var(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE format: no '=' found in '{s}'"))?;
    if pos == 0 {
        return Err(format!("invalid KEY=VALUE format: empty key in '{s}'"));
    }
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}
