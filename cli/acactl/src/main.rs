//! acactl - revision rollouts for container apps
//!
//! Builds or retags images, assembles a revision from a YAML app config,
//! submits it and waits until the revision is healthy, unhealthy or out of
//! time. Exit codes: 0 healthy, 1 error, 2 unhealthy, 3 timed out.

use anyhow::Result;
use clap::Parser;

mod arm;
mod commands;
mod config;
mod error;
mod hash;
mod keyvault;
mod output;
mod resolve;
mod telemetry;
mod token;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = cli.run().await {
        error::print_error(&e);
        std::process::exit(error::exit_code(&e));
    }

    Ok(())
}
