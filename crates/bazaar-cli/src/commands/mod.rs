//! CLI commands and argument parsing.

pub mod check_openapi;
pub mod publish;
pub mod validate;

use clap::{Parser, Subcommand};

/// Bazaar - Service marketplace publishing tools
#[derive(Parser)]
#[command(name = "bazaar")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Validate a service specification
    Validate(validate::ValidateArgs),

    /// Validate an OpenAPI document
    CheckOpenapi(check_openapi::CheckOpenApiArgs),

    /// Run a specification through the publishing pipeline
    Publish(publish::PublishArgs),

    /// Print version information
    Version,
}
