//! # Bazaar Registry
//!
//! Clients for the external catalog registry that holds the canonical entry
//! of every published service.
//!
//! ## Features
//!
//! - **[`Registry`] trait**: the collaborator contract used by the publisher
//! - **[`HttpRegistryClient`]**: JSON API client with basic/bearer auth and TLS options
//! - **[`InMemoryRegistry`]**: idempotent in-process registry for local mode and tests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bazaar_registry::{HttpRegistryClient, Registry, RegistryAuth, RegistryConfig};
//!
//! # async fn demo(spec: bazaar_core::ServiceSpecification) -> Result<(), bazaar_registry::RegistryError> {
//! let config = RegistryConfig::new("https://catalog.example.com")
//!     .with_auth(RegistryAuth::bearer("token"));
//! let client = HttpRegistryClient::new(config)?;
//!
//! let registry_id = client.register_service(&spec).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod error;
mod memory;
mod registry;

pub use client::{HttpRegistryClient, IDEMPOTENCY_KEY};
pub use config::{RegistryAuth, RegistryConfig, TlsConfig, DEFAULT_TIMEOUT};
pub use error::RegistryError;
pub use memory::{InMemoryRegistry, RegistryEntry};
pub use registry::{derived_registry_id, idempotency_key, Registry};
