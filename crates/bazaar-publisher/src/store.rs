//! Service record storage.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bazaar_core::{Service, ServiceCategory, ServiceId, ServiceSpecification, ServiceStatus, StatusChange};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::StoreError;

/// Default page size for [`SearchFilter`].
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Largest page a search returns.
pub const MAX_PAGE_SIZE: usize = 100;

/// Partial update applied by [`ServiceStore::update`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordUpdate {
    /// Requested status change, checked against the state machine.
    pub status: Option<StatusChange>,
    /// Replacement specification (same name and version).
    pub spec: Option<ServiceSpecification>,
    /// Registry identifier.
    pub registry_id: Option<String>,
    /// Suspension reason.
    pub suspension_reason: Option<String>,
    /// Approval workflow identifier.
    pub approval_workflow_id: Option<String>,
}

impl RecordUpdate {
    /// An update changing only the status.
    #[must_use]
    pub fn status(change: StatusChange) -> Self {
        Self {
            status: Some(change),
            ..Self::default()
        }
    }

    /// An update replacing only the specification.
    #[must_use]
    pub fn spec(spec: ServiceSpecification) -> Self {
        Self {
            spec: Some(spec),
            ..Self::default()
        }
    }

    /// An update recording the approval workflow.
    #[must_use]
    pub fn approval_workflow(workflow_id: impl Into<String>) -> Self {
        Self {
            approval_workflow_id: Some(workflow_id.into()),
            ..Self::default()
        }
    }

    /// Adds a suspension reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.suspension_reason = Some(reason.into());
        self
    }
}

/// Search criteria; unset fields match everything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchFilter {
    /// Owning provider.
    pub provider_id: Option<String>,
    /// Current status.
    pub status: Option<ServiceStatus>,
    /// Category.
    pub category: Option<ServiceCategory>,
    /// Records carrying this tag.
    pub tag: Option<String>,
    /// Case-insensitive substring of the name.
    pub text: Option<String>,
    /// Records to skip.
    pub offset: usize,
    /// Page size, capped at [`MAX_PAGE_SIZE`].
    pub limit: usize,
}

impl Default for SearchFilter {
    fn default() -> Self {
        Self {
            provider_id: None,
            status: None,
            category: None,
            tag: None,
            text: None,
            offset: 0,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl SearchFilter {
    /// Returns true if `service` satisfies every set criterion.
    #[must_use]
    pub fn matches(&self, service: &Service) -> bool {
        self.provider_id
            .as_ref()
            .map_or(true, |p| *p == service.provider_id)
            && self.status.map_or(true, |s| s == service.status)
            && self
                .category
                .as_ref()
                .map_or(true, |c| *c == service.spec.category)
            && self
                .tag
                .as_ref()
                .map_or(true, |t| service.spec.tags.contains(t))
            && self.text.as_ref().map_or(true, |t| {
                service
                    .spec
                    .name
                    .to_lowercase()
                    .contains(&t.to_lowercase())
            })
    }

    fn page_size(&self) -> usize {
        self.limit.clamp(1, MAX_PAGE_SIZE)
    }
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    /// Matching records on this page.
    pub services: Vec<Service>,
    /// Matching records across all pages.
    pub total: usize,
}

/// Durable storage contract for service records.
#[async_trait]
pub trait ServiceStore: Send + Sync {
    /// Persists a new record.
    ///
    /// Creating a record whose id already exists returns the stored record.
    /// Fails with [`StoreError::Conflict`] if another live record holds the
    /// same `(name, version)`.
    async fn create(&self, service: Service) -> Result<Service, StoreError>;

    /// Looks up a record by id.
    async fn find_by_id(&self, id: &ServiceId) -> Result<Option<Service>, StoreError>;

    /// Returns the live record for `(name, version)`, ignoring retired and
    /// failed submissions.
    async fn find_by_name_and_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Option<Service>, StoreError>;

    /// Applies `update` to the record as one read-modify-write.
    ///
    /// Illegal status changes are rejected and leave the record unchanged.
    async fn update(&self, id: &ServiceId, update: RecordUpdate) -> Result<Service, StoreError>;

    /// Searches records, sorted by creation time then id.
    async fn search(&self, filter: &SearchFilter) -> Result<SearchPage, StoreError>;
}

/// Whether a record still holds its `(name, version)`.
fn holds_key(service: &Service) -> bool {
    !matches!(
        service.status,
        ServiceStatus::Retired | ServiceStatus::FailedValidation
    )
}

/// Thread-safe in-memory [`ServiceStore`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryServiceStore {
    records: Arc<RwLock<HashMap<ServiceId, Service>>>,
}

impl InMemoryServiceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, including retired ones.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Returns true if nothing has been stored.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ServiceStore for InMemoryServiceStore {
    async fn create(&self, service: Service) -> Result<Service, StoreError> {
        let mut records = self.records.write().await;

        if let Some(existing) = records.get(&service.id) {
            return Ok(existing.clone());
        }
        if let Some(other) = records.values().find(|s| {
            holds_key(s) && s.spec.name == service.spec.name && s.spec.version == service.spec.version
        }) {
            return Err(StoreError::Conflict {
                name: service.spec.name.clone(),
                version: service.spec.version.clone(),
                existing: other.id,
            });
        }

        records.insert(service.id, service.clone());
        Ok(service)
    }

    async fn find_by_id(&self, id: &ServiceId) -> Result<Option<Service>, StoreError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn find_by_name_and_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Option<Service>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .find(|s| holds_key(s) && s.spec.name == name && s.spec.version == version)
            .cloned())
    }

    async fn update(&self, id: &ServiceId, update: RecordUpdate) -> Result<Service, StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or(StoreError::NotFound { service_id: *id })?;

        let mut next = record.clone();
        if let Some(change) = update.status {
            next.apply_status(change)?;
        }
        if let Some(spec) = update.spec {
            next.spec = spec;
        }
        if let Some(registry_id) = update.registry_id {
            next.registry_id = Some(registry_id);
        }
        if let Some(reason) = update.suspension_reason {
            next.suspension_reason = Some(reason);
        }
        if let Some(workflow_id) = update.approval_workflow_id {
            next.approval_workflow_id = Some(workflow_id);
        }
        next.updated_at = Utc::now();

        *record = next.clone();
        Ok(next)
    }

    async fn search(&self, filter: &SearchFilter) -> Result<SearchPage, StoreError> {
        let records = self.records.read().await;
        let mut matches: Vec<&Service> = records.values().filter(|s| filter.matches(s)).collect();
        matches.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let total = matches.len();
        let services = matches
            .into_iter()
            .skip(filter.offset)
            .take(filter.page_size())
            .cloned()
            .collect();

        Ok(SearchPage { services, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_core::{
        AuthMode, ComplianceDescriptor, ComplianceLevel, EndpointDescriptor, PricingDescriptor,
        PricingModel, Protocol, SlaDescriptor, StatusError, SupportLevel,
    };

    fn spec(name: &str, version: &str) -> ServiceSpecification {
        ServiceSpecification {
            name: name.to_string(),
            version: version.to_string(),
            description: "General purpose text generation model".to_string(),
            category: ServiceCategory::TextGeneration,
            tags: ["llm".to_string()].into_iter().collect(),
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

    fn record(name: &str, version: &str) -> Service {
        Service::new(ServiceId::generate(), "acme", spec(name, version), Some("reg-1".to_string()))
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let store = InMemoryServiceStore::new();
        let service = store.create(record("gpt-x", "1.0.0")).await.unwrap();

        assert_eq!(store.find_by_id(&service.id).await.unwrap(), Some(service.clone()));
        assert_eq!(
            store
                .find_by_name_and_version("gpt-x", "1.0.0")
                .await
                .unwrap()
                .map(|s| s.id),
            Some(service.id)
        );
        assert!(store
            .find_by_name_and_version("gpt-x", "2.0.0")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_version_conflicts() {
        let store = InMemoryServiceStore::new();
        let first = store.create(record("gpt-x", "1.0.0")).await.unwrap();

        let err = store.create(record("gpt-x", "1.0.0")).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::Conflict {
                name: "gpt-x".to_string(),
                version: "1.0.0".to_string(),
                existing: first.id,
            }
        );
    }

    #[tokio::test]
    async fn test_same_id_is_idempotent() {
        let store = InMemoryServiceStore::new();
        let service = record("gpt-x", "1.0.0");
        store.create(service.clone()).await.unwrap();
        store.create(service).await.unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_failed_record_releases_key() {
        let store = InMemoryServiceStore::new();
        let first = store.create(record("gpt-x", "1.0.0")).await.unwrap();
        store
            .update(
                &first.id,
                RecordUpdate::status(StatusChange::to(ServiceStatus::FailedValidation)),
            )
            .await
            .unwrap();

        assert!(store.create(record("gpt-x", "1.0.0")).await.is_ok());
    }

    #[tokio::test]
    async fn test_illegal_update_leaves_record() {
        let store = InMemoryServiceStore::new();
        let service = store.create(record("gpt-x", "1.0.0")).await.unwrap();

        let err = store
            .update(
                &service.id,
                RecordUpdate::status(StatusChange::to(ServiceStatus::Deprecated))
                    .with_reason("should not stick"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Status(StatusError::IllegalTransition { .. })));
        let stored = store.find_by_id(&service.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ServiceStatus::PendingApproval);
        assert_eq!(stored.suspension_reason, None);
    }

    #[tokio::test]
    async fn test_update_unknown_record() {
        let store = InMemoryServiceStore::new();
        let err = store
            .update(&ServiceId::generate(), RecordUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_search_filters_and_pages() {
        let store = InMemoryServiceStore::new();
        for i in 0..5 {
            store
                .create(record("gpt-x", &format!("1.0.{i}")))
                .await
                .unwrap();
        }
        let mut other = record("embed-large", "1.0.0");
        other.provider_id = "globex".to_string();
        store.create(other).await.unwrap();

        let page = store
            .search(&SearchFilter {
                provider_id: Some("acme".to_string()),
                offset: 1,
                limit: 2,
                ..SearchFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.services.len(), 2);

        let page = store
            .search(&SearchFilter {
                text: Some("EMBED".to_string()),
                ..SearchFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.services[0].provider_id, "globex");
    }

    #[tokio::test]
    async fn test_search_orders_by_creation() {
        let store = InMemoryServiceStore::new();
        let mut ids = Vec::new();
        for i in 0..3 {
            let service = store
                .create(record("gpt-x", &format!("2.0.{i}")))
                .await
                .unwrap();
            ids.push(service.id);
        }

        let page = store.search(&SearchFilter::default()).await.unwrap();
        let found: Vec<_> = page.services.iter().map(|s| s.id).collect();
        let mut expected = ids.clone();
        expected.sort_by_key(|id| {
            let s = page.services.iter().find(|s| s.id == *id).unwrap();
            (s.created_at, s.id)
        });
        assert_eq!(found, expected);
    }

    #[test]
    fn test_page_size_is_capped() {
        let filter = SearchFilter {
            limit: 1000,
            ..SearchFilter::default()
        };
        assert_eq!(filter.page_size(), MAX_PAGE_SIZE);
    }
}
