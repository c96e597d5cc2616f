//! Check-openapi command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use bazaar_core::{OpenApiMode, OpenApiValidator, ValidationReport};

use super::validate::print_report;

/// Arguments for the check-openapi command.
#[derive(Args)]
pub struct CheckOpenApiArgs {
    /// Path to an OpenAPI document (YAML or JSON)
    pub path: PathBuf,

    /// Check version, info and operation responses as well
    #[arg(long)]
    pub strict: bool,
}

/// Runs the check-openapi command.
pub fn run(args: &CheckOpenApiArgs) -> Result<()> {
    info!(path = ?args.path, strict = args.strict, "Checking OpenAPI document");

    let report = check(args)?;
    print_report(&args.path.display().to_string(), &report);

    if !report.valid {
        anyhow::bail!("{} validation errors", report.errors.len());
    }
    Ok(())
}

fn check(args: &CheckOpenApiArgs) -> Result<ValidationReport> {
    let text = std::fs::read_to_string(&args.path)
        .with_context(|| format!("Failed to read {}", args.path.display()))?;
    let mode = if args.strict {
        OpenApiMode::Strict
    } else {
        OpenApiMode::Lenient
    };
    Ok(OpenApiValidator::new(mode).validate_str(&text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn document(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_lenient_accepts_minimal_document() {
        let file = document("openapi: 3.1.0\ninfo: {}\npaths: {}\n");
        let args = CheckOpenApiArgs {
            path: file.path().to_path_buf(),
            strict: false,
        };

        assert!(check(&args).unwrap().valid);
        assert!(run(&args).is_ok());
    }

    #[test]
    fn test_missing_paths_rejected() {
        let file = document(r#"{"openapi": "3.1.0", "info": {"title": "t", "version": "1"}}"#);
        let args = CheckOpenApiArgs {
            path: file.path().to_path_buf(),
            strict: false,
        };

        let report = check(&args).unwrap();
        assert!(!report.valid);
        assert!(report.errors.has_field("paths"));
        assert!(run(&args).is_err());
    }

    #[test]
    fn test_unreadable_path() {
        let args = CheckOpenApiArgs {
            path: PathBuf::from("/nonexistent/openapi.yaml"),
            strict: true,
        };
        assert!(run(&args).is_err());
    }
}
