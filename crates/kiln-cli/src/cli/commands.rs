use clap::{Args, Subcommand};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build every category once
    ///
    /// Runs the configured compiler of each category, copies static folders
    /// into dist and runs the configured modules. Exits non-zero if any step
    /// fails.
    Build(BuildArgs),

    /// Start the live-reload dev server and rebuild on change
    ///
    /// Changes are debounced into batches; each batch rebuilds only the
    /// categories it touched, then reloads connected browsers.
    Dev(DevArgs),
}

#[derive(Args, Debug, Default)]
pub struct BuildArgs {
    /// Production build (sets NODE_ENV=production for compilers)
    #[arg(long)]
    pub production: bool,
}

#[derive(Args, Debug, Default)]
pub struct DevArgs {
    /// Port for the dev server [default: 3000]
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Host to bind [default: 127.0.0.1]
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Open the browser once the server is up
    #[arg(long)]
    pub open: bool,
}
