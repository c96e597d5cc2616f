//! The registry collaborator contract.

use async_trait::async_trait;
use bazaar_core::{ServiceId, ServiceSpecification, ServiceStatus};
use sha2::{Digest, Sha256};

use crate::error::RegistryError;

/// External catalog that holds the canonical entry of every published service.
///
/// Registration is idempotent on `(name, version)`: registering the same
/// pair twice yields the same registry identifier.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Registers a specification and returns the registry-assigned identifier.
    async fn register_service(&self, spec: &ServiceSpecification) -> Result<String, RegistryError>;

    /// Replaces the catalog entry's specification.
    async fn update_service(
        &self,
        registry_id: &str,
        spec: &ServiceSpecification,
    ) -> Result<(), RegistryError>;

    /// Mirrors a lifecycle status onto the catalog entry.
    async fn update_service_status(
        &self,
        registry_id: &str,
        status: ServiceStatus,
    ) -> Result<(), RegistryError>;

    /// Removes the catalog entry created for `service_id`, if it still exists.
    async fn rollback(&self, service_id: &ServiceId, registry_id: &str) -> Result<(), RegistryError>;
}

/// Returns the idempotency key for a specification: the hex SHA-256 of
/// `name@version`.
///
/// # Examples
///
/// ```
/// use bazaar_registry::idempotency_key;
///
/// let key = idempotency_key("gpt-x", "1.0.0");
/// assert_eq!(key.len(), 64);
/// assert_eq!(key, idempotency_key("gpt-x", "1.0.0"));
/// assert_ne!(key, idempotency_key("gpt-x", "1.0.1"));
/// ```
#[must_use]
pub fn idempotency_key(name: &str, version: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(b"@");
    hasher.update(version.as_bytes());
    hex::encode(hasher.finalize())
}

/// Derives the deterministic registry identifier used by the in-process registry.
#[must_use]
pub fn derived_registry_id(name: &str, version: &str) -> String {
    let key = idempotency_key(name, version);
    format!("reg-{}", &key[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotency_key_is_sha256_hex() {
        let key = idempotency_key("a", "1");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_key_separates_name_and_version() {
        assert_ne!(idempotency_key("ab", "c"), idempotency_key("a", "bc"));
    }

    #[test]
    fn test_derived_registry_id() {
        let id = derived_registry_id("gpt-x", "1.0.0");
        assert!(id.starts_with("reg-"));
        assert_eq!(id.len(), 4 + 16);
    }
}
