//! Publish command implementation.
//!
//! Runs a specification through the full publishing pipeline. Without
//! collaborator URLs the pipeline runs against in-process doubles, which is
//! useful for checking a submission before sending it to a live marketplace.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;
use url::Url;

use bazaar_audit::{AnalyticsSink, EventLogger, TracingBackend};
use bazaar_core::{Environment, ServiceSpecification};
use bazaar_publisher::{
    Collaborators, Governance, HttpGovernanceClient, HttpPolicyEngine, HttpProbe,
    InMemoryServiceStore, PolicyEngine, PolicyRules, Publisher, PublisherConfig,
    RulePolicyEngine, StaticGovernance,
};
use bazaar_registry::{HttpRegistryClient, InMemoryRegistry, Registry, RegistryAuth, RegistryConfig};

/// Arguments for the publish command.
#[derive(Args)]
pub struct PublishArgs {
    /// Path to the service specification to publish
    #[arg(required = true)]
    pub spec: PathBuf,

    /// Provider submitting the service
    #[arg(short, long, env = "BAZAAR_PROVIDER")]
    pub provider: String,

    /// Publisher configuration file (YAML or JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the configured environment
    #[arg(short, long)]
    pub environment: Option<Environment>,

    /// Registry base URL; uses an in-memory registry when omitted
    #[arg(long, env = "BAZAAR_REGISTRY_URL")]
    pub registry_url: Option<String>,

    /// Bearer token for the registry, policy engine and governance services
    #[arg(long, env = "BAZAAR_REGISTRY_TOKEN", hide_env_values = true)]
    pub registry_token: Option<String>,

    /// Policy engine base URL; uses the built-in rules when omitted
    #[arg(long, env = "BAZAAR_POLICY_URL")]
    pub policy_url: Option<String>,

    /// Governance service base URL; approves automatically when omitted
    #[arg(long, env = "BAZAAR_GOVERNANCE_URL")]
    pub governance_url: Option<String>,

    /// Print the outcome as JSON
    #[arg(long)]
    pub json: bool,
}

/// Runs the publish command.
///
/// # Errors
///
/// Returns an error if:
/// - The specification or configuration cannot be loaded
/// - A collaborator client cannot be built
/// - The publication does not end with an active service
pub async fn execute(args: PublishArgs) -> Result<()> {
    info!(spec = ?args.spec, provider = %args.provider, "Publishing service");

    if !args.spec.exists() {
        anyhow::bail!("Specification file does not exist: {}", args.spec.display());
    }

    let config = load_config(&args)?;
    let spec = ServiceSpecification::from_file(&args.spec).context("Failed to load specification")?;

    if !args.json {
        println!("Bazaar Service Publisher");
        println!("========================");
        println!();
        println!("Service:     {}@{}", spec.name, spec.version);
        println!("Provider:    {}", args.provider);
        println!("Environment: {}", config.environment);
        println!("Registry:    {}", args.registry_url.as_deref().unwrap_or("in-memory"));
        println!("Policy:      {}", args.policy_url.as_deref().unwrap_or("built-in rules"));
        println!(
            "Governance:  {}",
            args.governance_url.as_deref().unwrap_or("auto-approve")
        );
        println!();
    }

    let collaborators = build_collaborators(&args, &config)?;
    let publisher = Publisher::new(collaborators, config);

    let outcome = publisher.publish(&args.provider, spec).await;
    publisher.flush().await;
    let outcome = outcome.context("Failed to publish service")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).context("Failed to serialize outcome")?
        );
    } else if outcome.is_active() {
        println!("✓ {}", outcome.message);
        println!("  Service ID: {}", outcome.service_id);
    } else {
        println!("✗ {}", outcome.message);
        println!("  Status: {}", outcome.status);
        if let Some(kind) = outcome.kind {
            println!("  Reason: {kind:?}");
        }
    }

    if !outcome.is_active() {
        anyhow::bail!("Service ended as {}", outcome.status);
    }
    Ok(())
}

/// Loads the configuration file, if any, and applies the environment override.
fn load_config(args: &PublishArgs) -> Result<PublisherConfig> {
    let mut config = match &args.config {
        Some(path) => PublisherConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PublisherConfig::default(),
    };
    if let Some(environment) = args.environment {
        config.environment = environment;
    }
    Ok(config)
}

/// Determines registry authentication from arguments.
fn determine_auth(args: &PublishArgs) -> RegistryAuth {
    args.registry_token
        .as_ref()
        .map_or(RegistryAuth::None, RegistryAuth::bearer)
}

fn parse_url(flag: &str, value: &str) -> Result<Url> {
    Url::parse(value).with_context(|| format!("Invalid --{flag} URL: {value}"))
}

fn build_collaborators(args: &PublishArgs, config: &PublisherConfig) -> Result<Collaborators> {
    let registry: Arc<dyn Registry> = match &args.registry_url {
        Some(raw) => {
            let url = parse_url("registry-url", raw)?;
            let registry_config = RegistryConfig::new(url.as_str())
                .with_timeout(config.timeouts.registry)
                .with_auth(determine_auth(args));
            Arc::new(
                HttpRegistryClient::new(registry_config)
                    .context("Failed to create registry client")?,
            )
        }
        None => Arc::new(InMemoryRegistry::default()),
    };

    let policy: Arc<dyn PolicyEngine> = match &args.policy_url {
        Some(raw) => {
            let url = parse_url("policy-url", raw)?;
            let mut engine = HttpPolicyEngine::new(url.as_str(), config.timeouts.policy)
                .context("Failed to create policy engine client")?;
            if let Some(token) = &args.registry_token {
                engine = engine.with_token(token);
            }
            Arc::new(engine)
        }
        None => Arc::new(RulePolicyEngine::new(PolicyRules {
            require_encrypted_transport: config.environment.is_production(),
            ..PolicyRules::default()
        })),
    };

    let governance: Arc<dyn Governance> = match &args.governance_url {
        Some(raw) => {
            let url = parse_url("governance-url", raw)?;
            let mut client = HttpGovernanceClient::new(url.as_str(), config.timeouts.governance)
                .context("Failed to create governance client")?;
            if let Some(token) = &args.registry_token {
                client = client.with_token(token);
            }
            Arc::new(client)
        }
        None => Arc::new(StaticGovernance::approving()),
    };

    let analytics: Arc<dyn AnalyticsSink> = Arc::new(
        EventLogger::builder()
            .with_backend(Arc::new(TracingBackend::new()))
            .build(),
    );
    let probe = HttpProbe::new(config.timeouts.test_check).context("Failed to create probe")?;

    Ok(Collaborators {
        policy,
        registry,
        governance,
        store: Arc::new(InMemoryServiceStore::new()),
        analytics,
        probe: Arc::new(probe),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args() -> PublishArgs {
        PublishArgs {
            spec: PathBuf::from("service.yaml"),
            provider: "acme".to_string(),
            config: None,
            environment: None,
            registry_url: None,
            registry_token: None,
            policy_url: None,
            governance_url: None,
            json: false,
        }
    }

    #[test]
    fn test_determine_auth_none() {
        assert!(matches!(determine_auth(&args()), RegistryAuth::None));
    }

    #[test]
    fn test_determine_auth_bearer() {
        let args = PublishArgs {
            registry_token: Some("test-token".to_string()),
            ..args()
        };

        match determine_auth(&args) {
            RegistryAuth::Bearer { token } => assert_eq!(token, "test-token"),
            _ => panic!("Expected Bearer auth"),
        }
    }

    #[test]
    fn test_load_config_defaults() {
        let config = load_config(&args()).unwrap();
        assert_eq!(config, PublisherConfig::default());
    }

    #[test]
    fn test_load_config_file_with_override() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(b"environment: staging\napprovalWaitMs: 2000\n").unwrap();

        let from_file = load_config(&PublishArgs {
            config: Some(file.path().to_path_buf()),
            ..args()
        })
        .unwrap();
        assert_eq!(from_file.environment, Environment::Staging);
        assert_eq!(from_file.approval_wait, std::time::Duration::from_secs(2));

        let overridden = load_config(&PublishArgs {
            config: Some(file.path().to_path_buf()),
            environment: Some(Environment::Development),
            ..args()
        })
        .unwrap();
        assert_eq!(overridden.environment, Environment::Development);
        assert_eq!(overridden.approval_wait, std::time::Duration::from_secs(2));
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config(&PublishArgs {
            config: Some(PathBuf::from("/nonexistent/bazaar.yaml")),
            ..args()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_local_collaborators() {
        let config = PublisherConfig::default();
        assert!(build_collaborators(&args(), &config).is_ok());
    }

    #[test]
    fn test_remote_collaborators() {
        let args = PublishArgs {
            registry_url: Some("https://registry.example.com".to_string()),
            registry_token: Some("test-token".to_string()),
            policy_url: Some("https://policy.example.com".to_string()),
            governance_url: Some("https://governance.example.com".to_string()),
            ..args()
        };
        assert!(build_collaborators(&args, &PublisherConfig::default()).is_ok());
    }

    #[test]
    fn test_invalid_collaborator_url() {
        let args = PublishArgs {
            policy_url: Some("not a url".to_string()),
            ..args()
        };
        let err = build_collaborators(&args, &PublisherConfig::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("--policy-url"));
    }

    #[tokio::test]
    async fn test_missing_spec_file() {
        let args = PublishArgs {
            spec: PathBuf::from("/nonexistent/service.yaml"),
            ..args()
        };
        assert!(execute(args).await.is_err());
    }
}
