//! Service specification model.
//!
//! A [`ServiceSpecification`] is the provider-submitted description of a
//! service. It is immutable once accepted by the publishing pipeline.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::validation::{Validate, ValidationError, ValidationErrors};

/// Provider-submitted description of a service to be published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpecification {
    /// Catalog name, unique together with `version`.
    pub name: String,

    /// Semantic version string.
    pub version: String,

    /// Human-readable description.
    pub description: String,

    /// Marketplace category.
    pub category: ServiceCategory,

    /// Free-form search tags.
    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Declared capabilities (e.g. `chat`, `streaming`).
    #[serde(default)]
    pub capabilities: Vec<String>,

    /// Where and how the service is reached.
    pub endpoint: EndpointDescriptor,

    /// Pricing model.
    pub pricing: PricingDescriptor,

    /// Service-level agreement.
    pub sla: SlaDescriptor,

    /// Compliance posture.
    pub compliance: ComplianceDescriptor,

    /// Optional OpenAPI interface document.
    #[serde(
        default,
        deserialize_with = "crate::openapi::deserialize_document",
        skip_serializing_if = "Option::is_none"
    )]
    pub openapi: Option<serde_json::Value>,
}

impl ServiceSpecification {
    /// Parses a specification from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SpecParseError`] if the document is malformed.
    pub fn from_json_str(input: &str) -> Result<Self> {
        serde_json::from_str(input).map_err(|e| Error::SpecParseError {
            reason: e.to_string(),
        })
    }

    /// Parses a specification from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SpecParseError`] if the document is malformed.
    pub fn from_yaml_str(input: &str) -> Result<Self> {
        serde_yaml::from_str(input).map_err(|e| Error::SpecParseError {
            reason: e.to_string(),
        })
    }

    /// Loads a specification file, choosing the format by extension
    /// (`.json` is JSON, anything else is read as YAML).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| Error::SpecLoadError {
            path: path.display().to_string(),
            source,
        })?;

        if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json_str(&raw)
        } else {
            Self::from_yaml_str(&raw)
        }
    }

    /// Whether publishing this specification needs a human approval step.
    ///
    /// Approval is required for `confidential` or `restricted` data, or for
    /// an `enterprise` support tier.
    #[must_use]
    pub fn requires_approval(&self) -> bool {
        matches!(
            self.compliance.level,
            ComplianceLevel::Confidential | ComplianceLevel::Restricted
        ) || self.sla.support_level == SupportLevel::Enterprise
    }

    /// Returns the `(name, version)` uniqueness key.
    #[must_use]
    pub fn key(&self) -> (&str, &str) {
        (&self.name, &self.version)
    }
}

/// Marketplace category of a service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ServiceCategory {
    /// Large language model text generation.
    TextGeneration,
    /// Vector embeddings.
    Embeddings,
    /// Image synthesis.
    ImageGeneration,
    /// Speech recognition or synthesis.
    Speech,
    /// Machine translation.
    Translation,
    /// Classification models.
    Classification,
    /// Computer vision.
    Vision,
    /// Data processing pipelines.
    DataProcessing,
    /// Anything else.
    Other,
    /// A value outside the recognized set; rejected by validation.
    Unrecognized(String),
}

impl ServiceCategory {
    /// Returns the wire name of this category.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::TextGeneration => "text-generation",
            Self::Embeddings => "embeddings",
            Self::ImageGeneration => "image-generation",
            Self::Speech => "speech",
            Self::Translation => "translation",
            Self::Classification => "classification",
            Self::Vision => "vision",
            Self::DataProcessing => "data-processing",
            Self::Other => "other",
            Self::Unrecognized(raw) => raw,
        }
    }

    /// Returns true for a recognized category.
    #[must_use]
    pub const fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }

    /// Categories whose benchmark includes a throughput check.
    #[must_use]
    pub const fn is_high_throughput(&self) -> bool {
        matches!(self, Self::TextGeneration | Self::Embeddings)
    }
}

impl From<String> for ServiceCategory {
    fn from(value: String) -> Self {
        match value.as_str() {
            "text-generation" => Self::TextGeneration,
            "embeddings" => Self::Embeddings,
            "image-generation" => Self::ImageGeneration,
            "speech" => Self::Speech,
            "translation" => Self::Translation,
            "classification" => Self::Classification,
            "vision" => Self::Vision,
            "data-processing" => Self::DataProcessing,
            "other" => Self::Other,
            _ => Self::Unrecognized(value),
        }
    }
}

impl From<ServiceCategory> for String {
    fn from(value: ServiceCategory) -> Self {
        match value {
            ServiceCategory::Unrecognized(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network endpoint of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDescriptor {
    /// Base URL.
    pub url: String,
    /// Wire protocol.
    #[serde(default)]
    pub protocol: Protocol,
    /// Authentication mode.
    #[serde(default)]
    pub auth_mode: AuthMode,
}

impl EndpointDescriptor {
    /// Returns true if the URL uses an encrypted transport (`https` or `wss`).
    #[must_use]
    pub fn uses_encrypted_transport(&self) -> bool {
        url::Url::parse(&self.url).is_ok_and(|u| matches!(u.scheme(), "https" | "wss"))
    }
}

/// Endpoint wire protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// HTTP/JSON.
    #[default]
    Rest,
    /// gRPC.
    Grpc,
    /// GraphQL.
    Graphql,
    /// WebSocket.
    Websocket,
}

/// Endpoint authentication mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    /// Unauthenticated.
    None,
    /// API key header.
    #[default]
    ApiKey,
    /// OAuth 2.0 bearer tokens.
    Oauth2,
    /// Mutual TLS.
    Mtls,
}

/// Pricing of a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingDescriptor {
    /// Pricing model.
    pub model: PricingModel,
    /// Price per unit, required for `pay-per-use`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<f64>,
    /// Monthly price, required for `subscription`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_price: Option<f64>,
    /// Volume tiers, required for `tiered`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tiers: Vec<PricingTier>,
    /// ISO 4217 currency code.
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

/// One tier of a tiered price list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingTier {
    /// Upper bound of units covered by this tier; `None` for the last tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up_to: Option<u64>,
    /// Price per unit in this tier.
    pub unit_price: f64,
}

/// Pricing model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PricingModel {
    /// No charge.
    Free,
    /// Charged per unit consumed.
    PayPerUse,
    /// Flat monthly fee.
    Subscription,
    /// Volume tiers.
    Tiered,
}

impl Validate for PricingDescriptor {
    fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let positive = |value: Option<f64>| value.is_some_and(|v| v.is_finite() && v > 0.0);

        match self.model {
            PricingModel::Free => {
                if self.unit_price.is_some_and(|p| p != 0.0) {
                    errors.add(ValidationError::constraint(
                        "unitPrice",
                        "free services cannot declare a non-zero unit price",
                    ));
                }
            }
            PricingModel::PayPerUse => {
                if self.unit_price.is_none() {
                    errors.add(ValidationError::constraint(
                        "unitPrice",
                        "pay-per-use pricing requires a unit price",
                    ));
                } else if !positive(self.unit_price) {
                    errors.add(ValidationError::range("unitPrice", "must be greater than 0"));
                }
            }
            PricingModel::Subscription => {
                if self.monthly_price.is_none() {
                    errors.add(ValidationError::constraint(
                        "monthlyPrice",
                        "subscription pricing requires a monthly price",
                    ));
                } else if !positive(self.monthly_price) {
                    errors.add(ValidationError::range("monthlyPrice", "must be greater than 0"));
                }
            }
            PricingModel::Tiered => {
                if self.tiers.is_empty() {
                    errors.add(ValidationError::empty("tiers"));
                }
                let mut previous: Option<u64> = None;
                for (i, tier) in self.tiers.iter().enumerate() {
                    if !(tier.unit_price.is_finite() && tier.unit_price >= 0.0) {
                        errors.add(ValidationError::range(
                            format!("tiers[{i}].unitPrice"),
                            "must be a non-negative number",
                        ));
                    }
                    match (previous, tier.up_to) {
                        (Some(prev), Some(bound)) if bound <= prev => {
                            errors.add(ValidationError::constraint(
                                format!("tiers[{i}].upTo"),
                                "tier bounds must be strictly increasing",
                            ));
                        }
                        (_, None) if i + 1 != self.tiers.len() => {
                            errors.add(ValidationError::constraint(
                                format!("tiers[{i}].upTo"),
                                "only the last tier may be unbounded",
                            ));
                        }
                        _ => {}
                    }
                    previous = tier.up_to.or(previous);
                }
            }
        }

        if !(self.currency.len() == 3 && self.currency.chars().all(|c| c.is_ascii_uppercase())) {
            errors.add(ValidationError::format(
                "currency",
                "must be a three-letter uppercase currency code",
            ));
        }

        errors.into_result()
    }
}

/// Service-level agreement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaDescriptor {
    /// Availability target in percent, within `(0, 100]`.
    pub availability: f64,
    /// Maximum response latency in milliseconds.
    pub max_latency_ms: u64,
    /// Support tier.
    pub support_level: SupportLevel,
}

impl Validate for SlaDescriptor {
    fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !(self.availability > 0.0 && self.availability <= 100.0) {
            errors.add(ValidationError::range(
                "availability",
                "must be greater than 0 and at most 100",
            ));
        }

        if self.max_latency_ms == 0 {
            errors.add(ValidationError::range("maxLatencyMs", "must be positive"));
        }

        errors.into_result()
    }
}

/// Support tier promised by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupportLevel {
    /// Community / best effort.
    Basic,
    /// Business hours.
    Standard,
    /// Extended hours.
    Premium,
    /// Dedicated enterprise support.
    Enterprise,
}

/// Compliance posture of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceDescriptor {
    /// Data classification level.
    pub level: ComplianceLevel,
    /// ISO 3166 country codes where data may be stored or processed.
    #[serde(default)]
    pub data_residency: Vec<String>,
    /// Compliance certifications held (e.g. `SOC2`, `ISO27001`).
    #[serde(default)]
    pub certifications: Vec<String>,
}

/// Data classification level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplianceLevel {
    /// Publicly shareable data.
    Public,
    /// Internal data.
    Internal,
    /// Confidential data.
    Confidential,
    /// Restricted data.
    Restricted,
}

impl ComplianceLevel {
    /// Returns the wire name of this level.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Internal => "internal",
            Self::Confidential => "confidential",
            Self::Restricted => "restricted",
        }
    }
}

impl fmt::Display for ComplianceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A specification that passes every structural check.
    pub fn sample_spec() -> ServiceSpecification {
        ServiceSpecification {
            name: "gpt-x".to_string(),
            version: "1.0.0".to_string(),
            description: "General purpose text generation model".to_string(),
            category: ServiceCategory::TextGeneration,
            tags: ["llm".to_string(), "chat".to_string()].into_iter().collect(),
            capabilities: vec!["chat".to_string(), "completion".to_string()],
            endpoint: EndpointDescriptor {
                url: "https://api.example.com/v1".to_string(),
                protocol: Protocol::Rest,
                auth_mode: AuthMode::ApiKey,
            },
            pricing: PricingDescriptor {
                model: PricingModel::PayPerUse,
                unit_price: Some(0.002),
                monthly_price: None,
                tiers: Vec::new(),
                currency: "USD".to_string(),
            },
            sla: SlaDescriptor {
                availability: 99.9,
                max_latency_ms: 500,
                support_level: SupportLevel::Standard,
            },
            compliance: ComplianceDescriptor {
                level: ComplianceLevel::Public,
                data_residency: vec!["US".to_string()],
                certifications: Vec::new(),
            },
            openapi: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::sample_spec;
    use super::*;

    const SAMPLE_YAML: &str = r"
name: gpt-x
version: 1.0.0
description: General purpose text generation model
category: text-generation
tags: [llm]
capabilities: [chat]
endpoint:
  url: https://api.example.com/v1
  protocol: rest
  authMode: api-key
pricing:
  model: pay-per-use
  unitPrice: 0.002
sla:
  availability: 99.9
  maxLatencyMs: 500
  supportLevel: standard
compliance:
  level: public
  dataResidency: [US]
";

    #[test]
    fn test_parse_yaml() {
        let spec = ServiceSpecification::from_yaml_str(SAMPLE_YAML).unwrap();
        assert_eq!(spec.name, "gpt-x");
        assert_eq!(spec.category, ServiceCategory::TextGeneration);
        assert_eq!(spec.endpoint.auth_mode, AuthMode::ApiKey);
        assert_eq!(spec.pricing.currency, "USD");
        assert!(spec.openapi.is_none());
    }

    #[test]
    fn test_embedded_openapi_keys_become_strings() {
        let yaml = format!(
            "{SAMPLE_YAML}openapi:\n  openapi: 3.1.0\n  paths:\n    /chat:\n      post:\n        responses:\n          200:\n            description: ok\n"
        );
        let spec = ServiceSpecification::from_yaml_str(&yaml).unwrap();
        let doc = spec.openapi.unwrap();
        assert_eq!(
            doc["paths"]["/chat"]["post"]["responses"]["200"]["description"],
            "ok"
        );
    }

    #[test]
    fn test_parse_json_rejects_garbage() {
        let err = ServiceSpecification::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, Error::SpecParseError { .. }));
    }

    #[test]
    fn test_unknown_category_is_kept() {
        let yaml = SAMPLE_YAML.replace("text-generation", "telepathy");
        let spec = ServiceSpecification::from_yaml_str(&yaml).unwrap();
        assert_eq!(
            spec.category,
            ServiceCategory::Unrecognized("telepathy".to_string())
        );
        assert!(!spec.category.is_recognized());
        assert_eq!(spec.category.to_string(), "telepathy");
    }

    #[test]
    fn test_json_uses_camel_case() {
        let json = serde_json::to_value(sample_spec()).unwrap();
        assert_eq!(json["sla"]["maxLatencyMs"], 500);
        assert_eq!(json["compliance"]["dataResidency"][0], "US");
        assert_eq!(json["pricing"]["model"], "pay-per-use");
    }

    #[test]
    fn test_requires_approval() {
        let mut spec = sample_spec();
        assert!(!spec.requires_approval());

        spec.compliance.level = ComplianceLevel::Confidential;
        assert!(spec.requires_approval());

        spec.compliance.level = ComplianceLevel::Restricted;
        assert!(spec.requires_approval());

        spec.compliance.level = ComplianceLevel::Internal;
        spec.sla.support_level = SupportLevel::Enterprise;
        assert!(spec.requires_approval());
    }

    #[test]
    fn test_encrypted_transport() {
        let mut endpoint = sample_spec().endpoint;
        assert!(endpoint.uses_encrypted_transport());
        endpoint.url = "http://api.example.com".to_string();
        assert!(!endpoint.uses_encrypted_transport());
        endpoint.url = "wss://stream.example.com".to_string();
        assert!(endpoint.uses_encrypted_transport());
    }

    #[test]
    fn test_pricing_pay_per_use_requires_unit_price() {
        let mut pricing = sample_spec().pricing;
        assert!(pricing.is_valid());

        pricing.unit_price = None;
        let errors = pricing.validate().unwrap_err();
        assert!(errors.has_field("unitPrice"));
    }

    #[test]
    fn test_pricing_tiers_must_increase() {
        let pricing = PricingDescriptor {
            model: PricingModel::Tiered,
            unit_price: None,
            monthly_price: None,
            tiers: vec![
                PricingTier { up_to: Some(1000), unit_price: 0.01 },
                PricingTier { up_to: Some(500), unit_price: 0.005 },
                PricingTier { up_to: None, unit_price: 0.001 },
            ],
            currency: "EUR".to_string(),
        };
        let errors = pricing.validate().unwrap_err();
        assert!(errors.has_field("tiers[1].upTo"));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_pricing_currency_format() {
        let mut pricing = sample_spec().pricing;
        pricing.currency = "usd".to_string();
        assert!(pricing.validate().unwrap_err().has_field("currency"));
    }

    #[test]
    fn test_sla_bounds() {
        let mut sla = sample_spec().sla;
        sla.availability = 100.0;
        assert!(sla.is_valid());

        sla.availability = 0.0;
        assert!(sla.validate().unwrap_err().has_field("availability"));

        sla.availability = 100.1;
        sla.max_latency_ms = 0;
        let errors = sla.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
