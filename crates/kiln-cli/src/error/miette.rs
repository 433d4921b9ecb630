//! Conversion of CLI errors into miette reports.

use ::miette::Report;

use crate::error::{BuildError, CliError};

pub fn cli_error_to_miette(err: CliError) -> Report {
    match err {
        CliError::Build(e) => build_error_to_miette(e),
        CliError::Config(e) => ::miette::miette!("Configuration error: {}", e),
        CliError::Server(e) => ::miette::miette!("Dev server error: {}", e),
        _ => ::miette::miette!("{}", err),
    }
}

pub fn build_error_to_miette(err: BuildError) -> Report {
    match err {
        BuildError::StepsFailed(categories) if categories.len() == 1 => {
            ::miette::miette!(
                "The {} step failed\n\nHint: Compiler output is printed above",
                categories[0]
            )
        }
        _ => ::miette::miette!("{}", err),
    }
}
