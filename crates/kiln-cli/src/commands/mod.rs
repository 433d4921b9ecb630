//! Command implementations.

pub mod build;
pub mod dev;

pub use build::{BuildOutcome, build_all};

use kiln_config::{CliOverrides, DevOverrides};

use crate::cli::{Cli, Command};
use crate::error::Result;
use crate::logger;
use crate::project::Project;

/// Load the project, initialise logging and run the selected command.
pub async fn execute(cli: Cli) -> Result<()> {
    let overrides = match &cli.command {
        Command::Build(args) => CliOverrides {
            production: args.production.then_some(true),
            ..CliOverrides::default()
        },
        Command::Dev(args) => CliOverrides {
            dev: DevOverrides {
                host: args.host.clone(),
                port: args.port,
                open: args.open.then_some(true),
            },
            ..CliOverrides::default()
        },
    };

    let project = Project::load(&cli, overrides);
    let debug = project.as_ref().is_ok_and(|p| p.config.debug);
    logger::init_logger(cli.verbose || debug, cli.quiet, cli.no_color);
    let project = project?;

    match cli.command {
        Command::Build(_) => build::execute(project).await,
        Command::Dev(_) => dev::execute(project).await,
    }
}
