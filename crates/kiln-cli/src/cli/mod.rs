//! Command-line interface definition.
//!
//! - `kiln build` - compile every category once, then run modules
//! - `kiln dev` - initial build, live-reload server and watch loop

mod commands;

use std::path::PathBuf;

use clap::Parser;

pub use commands::{BuildArgs, Command, DevArgs};

/// Kiln - incremental front-end asset builds with live reload
#[derive(Parser, Debug)]
#[command(
    name = "kiln",
    version,
    about = "Incremental front-end asset builds with live reload",
    long_about = "Kiln watches template, style, script and static sources, rebuilds only the\n\
                  categories that changed and reloads connected browsers once the new output\n\
                  is on disk."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Config file to use instead of kiln.toml / package.json discovery,
    /// relative to the project root
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Project root (defaults to the current directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}
