mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use thumbfetch::config::Config;
use thumbfetch::observability;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let config = Config::load_with(cli.config)?;
    observability::init_tracing(&config.telemetry.log_filter);

    match cli.command {
        Commands::Gallery(args) => commands::gallery(&config, args).await?,
        Commands::Fetch(args) => commands::fetch(&config, args).await?,
        Commands::Config => commands::print_config(&config)?,
    }

    Ok(())
}
