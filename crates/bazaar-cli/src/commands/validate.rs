//! Validate command implementation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use bazaar_core::{
    Environment, OpenApiMode, OpenApiValidator, ServiceSpecification, ServiceValidator,
    ValidationReport,
};

/// Arguments for the validate command.
#[derive(Args)]
pub struct ValidateArgs {
    /// Path to a service specification (YAML or JSON)
    pub path: PathBuf,

    /// Environment to validate for (production, staging, development)
    #[arg(short, long, default_value = "production", env = "BAZAAR_ENVIRONMENT")]
    pub environment: Environment,

    /// Accept OpenAPI documents with warnings only
    #[arg(long)]
    pub lenient: bool,

    /// Show detailed output
    #[arg(short, long)]
    pub verbose: bool,
}

/// Structural and OpenAPI reports for one specification.
pub struct SpecReport {
    /// The loaded specification.
    pub spec: ServiceSpecification,
    /// Structural validation.
    pub structure: ValidationReport,
    /// OpenAPI validation, when a document is attached.
    pub openapi: Option<ValidationReport>,
}

impl SpecReport {
    /// True when every report passed.
    pub fn is_valid(&self) -> bool {
        self.structure.valid && self.openapi.as_ref().is_none_or(|r| r.valid)
    }
}

/// Runs the validate command.
pub fn run(args: &ValidateArgs) -> Result<()> {
    info!(path = ?args.path, environment = %args.environment, "Validating service specification");

    println!("Bazaar Specification Validator");
    println!("==============================");
    println!("Path: {}", args.path.display());
    println!("Environment: {}", args.environment);
    println!();

    let mode = if args.lenient {
        OpenApiMode::Lenient
    } else {
        OpenApiMode::Strict
    };
    let report = check_file(&args.path, args.environment, mode)?;

    if args.verbose {
        println!("Service: {}@{}", report.spec.name, report.spec.version);
        println!("  Category: {}", report.spec.category);
        println!("  Capabilities: {}", report.spec.capabilities.len());
        println!("  Requires approval: {}", report.spec.requires_approval());
    }

    print_report("structure", &report.structure);
    match &report.openapi {
        Some(openapi) => print_report("openapi", openapi),
        None if args.verbose => println!("- openapi: no document attached"),
        None => {}
    }

    if !report.is_valid() {
        anyhow::bail!("Specification {} is invalid", args.path.display());
    }

    println!("\n✓ Specification validated successfully");
    Ok(())
}

/// Loads and validates a specification file.
pub fn check_file(path: &Path, environment: Environment, mode: OpenApiMode) -> Result<SpecReport> {
    if !path.is_file() {
        anyhow::bail!("Path does not exist: {}", path.display());
    }

    let spec = ServiceSpecification::from_file(path)
        .with_context(|| format!("Failed to load specification {}", path.display()))?;
    let structure = ServiceValidator::new(environment).validate(&spec);
    let openapi = spec
        .openapi
        .as_ref()
        .map(|doc| OpenApiValidator::new(mode).validate(doc));

    Ok(SpecReport {
        spec,
        structure,
        openapi,
    })
}

pub(crate) fn print_report(label: &str, report: &ValidationReport) {
    if report.valid {
        println!("✓ {label}");
    } else {
        println!("✗ {label}");
        for error in report.errors.iter() {
            println!("    {}: {}", error.field, error.message);
        }
    }
    for warning in &report.warnings {
        println!("  ⚠ Warning: {warning}");
    }
}
