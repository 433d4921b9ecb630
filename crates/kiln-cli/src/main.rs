//! Kiln CLI entry point.

use clap::Parser;
use kiln_cli::{cli, commands, error, ui};
use miette::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    ui::init_colors();

    // Logging is initialised by `execute` once the config is known, since
    // `debug = true` there implies `--verbose`
    commands::execute(args)
        .await
        .map_err(error::cli_error_to_miette)
}
