//! Lifecycle event emission for the Bazaar publishing pipeline.
//!
//! The publisher reports every phase boundary as a [`LifecycleEvent`] with a
//! stable `service.*` tag. Events flow through an [`AnalyticsSink`]; the
//! bundled [`EventLogger`] fans them out to one or more [`EventBackend`]s.
//!
//! # Example
//!
//! ```rust
//! use bazaar_audit::{EventLogger, LifecycleEvent, LifecycleEventType, TracingBackend};
//! use bazaar_core::ServiceId;
//! use std::sync::Arc;
//!
//! let logger = EventLogger::builder()
//!     .with_backend(Arc::new(TracingBackend::new()))
//!     .build();
//!
//! let event = LifecycleEvent::new(LifecycleEventType::Submitted, ServiceId::generate(), "acme");
//! logger.log(&event).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod event;
mod logger;

pub use event::{EventSeverity, LifecycleEvent, LifecycleEventType};
pub use logger::{
    AnalyticsSink, EmitError, EventBackend, EventLogger, EventLoggerBuilder, InMemoryBackend,
    TracingBackend,
};
