use anyhow::{Context, Result};
use clap::Parser;

mod cli;
mod megacli;
mod system;

use cli::{execute_command, Cli};

fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    env_logger::builder()
        .format_timestamp(None)
        .filter_level(cli.verbosity)
        .init();

    // Execute the selected operations
    execute_command(&cli).with_context(|| "command execution failed")
}
