//! Event logger and its output backends.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::event::{EventSeverity, LifecycleEvent, LifecycleEventType};

/// Output backend for serialized lifecycle events.
pub trait EventBackend: Send + Sync + Debug {
    /// Writes one serialized event.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be written.
    fn emit(&self, event_json: &str) -> Result<(), EmitError>;

    /// Flushes any buffered events.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&self) -> Result<(), EmitError>;

    /// Returns the backend name for identification.
    fn name(&self) -> &'static str;
}

/// Errors that can occur while emitting events.
#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    /// Serialization error
    #[error("Failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend-specific error
    #[error("Backend error: {0}")]
    Backend(String),
}

/// One-way sink for lifecycle events.
///
/// Callers treat the sink as fire-and-forget: a failed emission is logged by
/// the caller and never aborts the operation that produced the event.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    /// Enqueues an event.
    async fn emit(&self, event: LifecycleEvent) -> Result<(), EmitError>;
}

/// Sends lifecycle events to configured backends.
#[derive(Debug)]
pub struct EventLogger {
    backends: Vec<Arc<dyn EventBackend>>,
    enabled: bool,
    min_severity: EventSeverity,
}

impl Default for EventLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLogger {
    /// Creates a logger with no backends.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            backends: Vec::new(),
            enabled: true,
            min_severity: EventSeverity::Info,
        }
    }

    /// Creates a builder for configuring the logger.
    #[must_use]
    pub fn builder() -> EventLoggerBuilder {
        EventLoggerBuilder::new()
    }

    /// Adds a backend to the logger.
    pub fn add_backend(&mut self, backend: Arc<dyn EventBackend>) {
        self.backends.push(backend);
    }

    /// Logs an event to all configured backends.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be serialized.
    /// Backend errors are logged but do not cause this method to fail.
    pub fn log(&self, event: &LifecycleEvent) -> Result<(), EmitError> {
        if !self.enabled {
            debug!("Event logging disabled, skipping event");
            return Ok(());
        }

        if event.severity < self.min_severity {
            debug!(
                severity = %event.severity,
                threshold = %self.min_severity,
                "Event below severity threshold, skipping"
            );
            return Ok(());
        }

        let json = serde_json::to_string(event)?;

        for backend in &self.backends {
            if let Err(e) = backend.emit(&json) {
                error!(backend = backend.name(), error = %e, "Failed to write event to backend");
            }
        }

        Ok(())
    }

    /// Flushes all backends.
    ///
    /// # Errors
    ///
    /// Returns an error if any backend fails to flush.
    pub fn flush(&self) -> Result<(), EmitError> {
        for backend in &self.backends {
            backend.flush()?;
        }
        Ok(())
    }

    /// Returns the number of configured backends.
    #[must_use]
    pub fn backend_count(&self) -> usize {
        self.backends.len()
    }
}

#[async_trait]
impl AnalyticsSink for EventLogger {
    async fn emit(&self, event: LifecycleEvent) -> Result<(), EmitError> {
        self.log(&event)
    }
}

/// Builder for [`EventLogger`].
#[derive(Debug)]
pub struct EventLoggerBuilder {
    backends: Vec<Arc<dyn EventBackend>>,
    enabled: bool,
    min_severity: EventSeverity,
}

impl Default for EventLoggerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoggerBuilder {
    /// Creates a new builder.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            backends: Vec::new(),
            enabled: true,
            min_severity: EventSeverity::Info,
        }
    }

    /// Adds a backend to the logger.
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn EventBackend>) -> Self {
        self.backends.push(backend);
        self
    }

    /// Enables or disables the logger.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the minimum severity level.
    #[must_use]
    pub const fn min_severity(mut self, severity: EventSeverity) -> Self {
        self.min_severity = severity;
        self
    }

    /// Builds the logger.
    #[must_use]
    pub fn build(self) -> EventLogger {
        EventLogger {
            backends: self.backends,
            enabled: self.enabled,
            min_severity: self.min_severity,
        }
    }
}

/// Backend that writes events through `tracing`.
#[derive(Debug, Default)]
pub struct TracingBackend;

impl TracingBackend {
    /// Creates a new tracing backend.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl EventBackend for TracingBackend {
    fn emit(&self, event_json: &str) -> Result<(), EmitError> {
        let value: serde_json::Value = serde_json::from_str(event_json)?;
        let event_type = value
            .get("eventType")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");

        match value.get("severity").and_then(|v| v.as_str()) {
            Some("warning" | "error") => {
                warn!(event_type, lifecycle_event = %event_json, "Lifecycle event");
            }
            _ => info!(event_type, lifecycle_event = %event_json, "Lifecycle event"),
        }

        Ok(())
    }

    fn flush(&self) -> Result<(), EmitError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}

/// In-memory backend for tests and local inspection.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    events: Mutex<Vec<String>>,
}

impl InMemoryBackend {
    /// Creates a new in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all serialized events.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// Returns all events decoded, skipping any that fail to parse.
    #[must_use]
    pub fn decoded(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|json| serde_json::from_str(json).ok())
            .collect()
    }

    /// Returns the event types in emission order.
    #[must_use]
    pub fn event_types(&self) -> Vec<LifecycleEventType> {
        self.decoded().into_iter().map(|e| e.event_type).collect()
    }

    /// Clears all events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventBackend for InMemoryBackend {
    fn emit(&self, event_json: &str) -> Result<(), EmitError> {
        self.events.lock().push(event_json.to_string());
        Ok(())
    }

    fn flush(&self) -> Result<(), EmitError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}
