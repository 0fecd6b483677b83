mod agents;
mod cli;
mod config;
mod error;
#[cfg(test)]
mod fakes;
mod registry;
mod services;
mod utils;
mod workflow;

use clap::Parser;
use cli::{Cli, Commands};
use colored::Colorize;
use config::Config;
use std::process;
use tracing_subscriber::EnvFilter;

fn init_tracing(level: &str, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::InitConfig { output, force } = &cli.command {
        init_tracing("info", cli.verbose);
        return workflow::execute_init_config(output, *force);
    }

    let config = Config::load(cli.config.as_deref())?;
    init_tracing(&config.logging.level, cli.verbose);

    match cli.command {
        Commands::Update => workflow::execute_update(&config).await,
        Commands::Check => workflow::execute_check(&config).await,
        Commands::List => workflow::execute_list(&config),
        Commands::Maintenance { skip_warnings } => {
            workflow::execute_maintenance(&config, skip_warnings).await
        }
        Commands::Health => workflow::execute_health(&config).await,
        Commands::Server { action } => workflow::execute_server(&config, action).await,
        Commands::Backup { action } => workflow::execute_backup(&config, action).await,
        Commands::InitConfig { .. } => Ok(()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}
