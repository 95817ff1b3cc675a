//! Analytics sink abstraction for decoupled telemetry emission.
//!
//! Trackers hand their terminal records to an `AnalyticsSink` instead of
//! talking to a transport directly, so they can be exercised without one.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Errors reported by an analytics sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The record could not be converted into a JSON payload.
    #[error("failed to serialize telemetry record: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The downstream transport refused or lost the record.
    #[error("telemetry transport failed: {0}")]
    Transport(String),
}

/// Receives flat telemetry records.
pub trait AnalyticsSink: Send + Sync {
    /// Emit a record with a JSON payload.
    ///
    /// # Arguments
    /// * `topic` - Record name (e.g., "session:summary")
    /// * `payload` - Flat JSON object
    fn emit(&self, topic: &str, payload: serde_json::Value) -> Result<(), SinkError>;
}

/// Type alias for shared sink reference.
pub type AnalyticsSinkRef = Arc<dyn AnalyticsSink>;

/// Serialize `record` and hand it to `sink`.
///
/// Losing a metric is acceptable, so failures are logged and dropped here.
pub fn emit_record<T: Serialize>(sink: &dyn AnalyticsSink, topic: &str, record: &T) {
    let result = serde_json::to_value(record)
        .map_err(SinkError::from)
        .and_then(|payload| sink.emit(topic, payload));

    if let Err(e) = result {
        tracing::warn!(topic, error = %e, "dropping telemetry record");
    }
}

/// In-memory sink for testing.
///
/// Captures all emitted records for later inspection.
#[derive(Default)]
pub struct InMemoryAnalyticsSink {
    records: Mutex<Vec<EmittedRecord>>,
}

/// A captured record from `InMemoryAnalyticsSink`.
#[derive(Debug, Clone)]
pub struct EmittedRecord {
    pub topic: String,
    pub payload: serde_json::Value,
}

impl EmittedRecord {
    /// Decode the payload back into a typed record.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, SinkError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

impl InMemoryAnalyticsSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, Vec<EmittedRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get all captured records.
    pub fn records(&self) -> Vec<EmittedRecord> {
        self.guard().clone()
    }

    /// Get records for a specific topic.
    pub fn records_for(&self, topic: &str) -> Vec<EmittedRecord> {
        self.guard()
            .iter()
            .filter(|r| r.topic == topic)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.guard().clear();
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }
}

impl AnalyticsSink for InMemoryAnalyticsSink {
    fn emit(&self, topic: &str, payload: serde_json::Value) -> Result<(), SinkError> {
        self.guard().push(EmittedRecord {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }
}

/// No-op sink that discards all records.
pub struct NullAnalyticsSink;

impl AnalyticsSink for NullAnalyticsSink {
    fn emit(&self, _topic: &str, _payload: serde_json::Value) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Sink that writes every record to the `tracing` log at info level.
pub struct TracingAnalyticsSink;

impl AnalyticsSink for TracingAnalyticsSink {
    fn emit(&self, topic: &str, payload: serde_json::Value) -> Result<(), SinkError> {
        tracing::info!(topic, %payload, "telemetry record");
        Ok(())
    }
}
