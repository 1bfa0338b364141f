//! Project commands - everything except `version`

use crate::cli::Cli;
use crate::config::Config;
use crate::environment::EnvironmentResolver;
use crate::error::{DotrunError, DotrunResult};
use crate::orchestration::create_engine;
use crate::project::{Operation, Project, ProjectContext};
use crate::ui::UiContext;
use tracing::debug;

/// Build the project for the invocation and run the requested operation
pub async fn execute(cli: Cli, config: &Config) -> DotrunResult<i32> {
    let directory = match cli.directory {
        Some(dir) => dir,
        None => std::env::current_dir()
            .map_err(|e| DotrunError::io("getting current directory", e))?,
    };

    let ctx = ProjectContext::new(&directory, cli.env)?;
    debug!(
        "Project {} ({})",
        ctx.path().display(),
        ctx.container_name()
    );

    let engine = create_engine(config)?;
    let resolver = EnvironmentResolver::from_process(&config.environment);
    let project = Project::new(ctx, config, engine, resolver, UiContext::detect());

    let name = cli
        .command
        .unwrap_or_else(|| config.run.default_command.clone());
    project
        .dispatch(Operation::from_command(&name, cli.args, cli.skip_install))
        .await
}
