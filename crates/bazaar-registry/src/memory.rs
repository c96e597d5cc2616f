//! In-process registry used by local mode and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use bazaar_core::{ServiceId, ServiceSpecification, ServiceStatus};
use parking_lot::Mutex;

use crate::error::RegistryError;
use crate::registry::{derived_registry_id, Registry};

/// A catalog entry held by [`InMemoryRegistry`].
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryEntry {
    /// Registry-assigned identifier.
    pub registry_id: String,
    /// Current specification.
    pub spec: ServiceSpecification,
    /// Last mirrored lifecycle status.
    pub status: Option<ServiceStatus>,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, RegistryEntry>,
    register_calls: usize,
    rollbacks: Vec<(ServiceId, String)>,
}

/// Idempotent registry keyed on `(name, version)`.
///
/// # Examples
///
/// ```no_run
/// use bazaar_registry::{InMemoryRegistry, Registry};
/// # async fn demo(spec: bazaar_core::ServiceSpecification) {
/// let registry = InMemoryRegistry::new();
/// let first = registry.register_service(&spec).await.unwrap();
/// let second = registry.register_service(&spec).await.unwrap();
/// assert_eq!(first, second);
/// # }
/// ```
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    state: Mutex<State>,
}

impl InMemoryRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry with `registry_id`, if present.
    #[must_use]
    pub fn entry(&self, registry_id: &str) -> Option<RegistryEntry> {
        self.state.lock().entries.get(registry_id).cloned()
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Returns true if the registry holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Number of `register_service` calls received.
    #[must_use]
    pub fn register_calls(&self) -> usize {
        self.state.lock().register_calls
    }

    /// Rollbacks received, in order.
    #[must_use]
    pub fn rollbacks(&self) -> Vec<(ServiceId, String)> {
        self.state.lock().rollbacks.clone()
    }
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn register_service(&self, spec: &ServiceSpecification) -> Result<String, RegistryError> {
        let registry_id = derived_registry_id(&spec.name, &spec.version);
        let mut state = self.state.lock();
        state.register_calls += 1;
        state
            .entries
            .entry(registry_id.clone())
            .or_insert_with(|| RegistryEntry {
                registry_id: registry_id.clone(),
                spec: spec.clone(),
                status: None,
            });
        Ok(registry_id)
    }

    async fn update_service(
        &self,
        registry_id: &str,
        spec: &ServiceSpecification,
    ) -> Result<(), RegistryError> {
        let mut state = self.state.lock();
        let entry = state
            .entries
            .get_mut(registry_id)
            .ok_or_else(|| RegistryError::NotFound {
                registry_id: registry_id.to_string(),
            })?;
        entry.spec = spec.clone();
        Ok(())
    }

    async fn update_service_status(
        &self,
        registry_id: &str,
        status: ServiceStatus,
    ) -> Result<(), RegistryError> {
        let mut state = self.state.lock();
        let entry = state
            .entries
            .get_mut(registry_id)
            .ok_or_else(|| RegistryError::NotFound {
                registry_id: registry_id.to_string(),
            })?;
        entry.status = Some(status);
        Ok(())
    }

    async fn rollback(&self, service_id: &ServiceId, registry_id: &str) -> Result<(), RegistryError> {
        let mut state = self.state.lock();
        state.rollbacks.push((*service_id, registry_id.to_string()));
        if state.entries.remove(registry_id).is_none() {
            tracing::debug!(%registry_id, "Registry entry already absent");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_core::{
        AuthMode, ComplianceDescriptor, ComplianceLevel, EndpointDescriptor, PricingDescriptor,
        PricingModel, Protocol, ServiceCategory, SlaDescriptor, SupportLevel,
    };

    fn spec(version: &str) -> ServiceSpecification {
        ServiceSpecification {
            name: "gpt-x".to_string(),
            version: version.to_string(),
            description: "General purpose text generation model".to_string(),
            category: ServiceCategory::TextGeneration,
            tags: std::collections::BTreeSet::new(),
            capabilities: vec!["chat".to_string()],
            endpoint: EndpointDescriptor {
                url: "https://api.example.com/v1".to_string(),
                protocol: Protocol::Rest,
                auth_mode: AuthMode::ApiKey,
            },
            pricing: PricingDescriptor {
                model: PricingModel::Free,
                unit_price: None,
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
                data_residency: Vec::new(),
                certifications: Vec::new(),
            },
            openapi: None,
        }
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let registry = InMemoryRegistry::new();
        let first = registry.register_service(&spec("1.0.0")).await.unwrap();
        let second = registry.register_service(&spec("1.0.0")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.register_calls(), 2);
    }

    #[tokio::test]
    async fn test_versions_get_distinct_ids() {
        let registry = InMemoryRegistry::new();
        let a = registry.register_service(&spec("1.0.0")).await.unwrap();
        let b = registry.register_service(&spec("1.0.1")).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_status_and_update() {
        let registry = InMemoryRegistry::new();
        let id = registry.register_service(&spec("1.0.0")).await.unwrap();

        registry
            .update_service_status(&id, ServiceStatus::Active)
            .await
            .unwrap();
        let mut updated = spec("1.0.0");
        updated.description = "Updated text generation model".to_string();
        registry.update_service(&id, &updated).await.unwrap();

        let entry = registry.entry(&id).unwrap();
        assert_eq!(entry.status, Some(ServiceStatus::Active));
        assert_eq!(entry.spec.description, "Updated text generation model");
    }

    #[tokio::test]
    async fn test_update_unknown_entry() {
        let registry = InMemoryRegistry::new();
        let err = registry
            .update_service_status("reg-missing", ServiceStatus::Active)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_rollback_is_delete_if_exists() {
        let registry = InMemoryRegistry::new();
        let id = registry.register_service(&spec("1.0.0")).await.unwrap();
        let service_id = ServiceId::generate();

        registry.rollback(&service_id, &id).await.unwrap();
        registry.rollback(&service_id, &id).await.unwrap();

        assert!(registry.is_empty());
        assert_eq!(registry.rollbacks().len(), 2);
    }
}
