//! Audit subsystem.
//!
//! # Data Flow
//! ```text
//! RelayEngine (request complete)
//!     → RequestContext::into_record
//!     → AuditPipeline::emit
//!         → AuditStore (tracing summary, JSON lines, custom sinks)
//!         → metrics (requests, duration, errors, storage latency)
//! ```
//!
//! # Design Decisions
//! - Exactly one emission per request, from a single call site in the engine
//! - Persistence failures are logged and counted, never surfaced to the client

pub mod record;
pub mod sink;

use std::time::{Duration, Instant};

pub use record::{AuditRecord, OpaqueInspector, ResponseInspector, TokenUsage};
pub use sink::{AuditError, AuditSink, AuditStore, FanoutAuditSink, JsonlAuditSink, TracingAuditSink};

use crate::observability::metrics;

/// Persists a finished record and records its metrics.
#[derive(Debug, Clone, Default)]
pub struct AuditPipeline {
    store: AuditStore,
}

impl AuditPipeline {
    pub fn new(store: AuditStore) -> Self {
        Self { store }
    }

    /// Persist `record`. Never fails.
    pub async fn emit(&self, record: AuditRecord) {
        if self.store.is_enabled() {
            let started = Instant::now();
            let result = self.store.persist(&record).await;
            metrics::record_storage_write(started.elapsed());

            if let Err(e) = result {
                metrics::record_storage_error();
                tracing::warn!(
                    request_id = %record.request_id,
                    error = %e,
                    "Failed to persist audit record"
                );
            }
        }

        metrics::record_request(
            &record.route,
            record.status_code,
            Duration::from_millis(record.duration_ms),
        );
        if let Some(kind) = record.error_type {
            metrics::record_error(&record.route, kind);
        }
    }
}
