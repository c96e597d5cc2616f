//! Bazaar CLI - Command-line interface for the Bazaar service marketplace.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bazaar=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate(args) => commands::validate::run(&args),
        Commands::CheckOpenapi(args) => commands::check_openapi::run(&args),
        Commands::Publish(args) => commands::publish::execute(args).await,
        Commands::Version => {
            println!("bazaar {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
