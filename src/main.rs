mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    molnus::observability::init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => commands::serve(args).await?,
        Commands::Fetch(args) => commands::fetch(args).await?,
        Commands::Check(args) => commands::check(args).await?,
    }

    Ok(())
}
