//! Audit persistence sinks.
//!
//! # Responsibilities
//! - Persist one [`AuditRecord`] per completed request
//! - Fan a record out to several sinks
//! - Model "no persistence configured" as an explicit no-op variant
//!
//! # Design Decisions
//! - Sinks are async so file or network writers never block a runtime thread
//! - A fan-out tries every sink even when an earlier one fails

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::audit::record::AuditRecord;
use crate::config::StorageConfig;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit io: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode audit record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("audit sink: {0}")]
    Sink(String),
}

/// Destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn persist(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

/// Writes a one-line summary per request through `tracing`.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn persist(&self, record: &AuditRecord) -> Result<(), AuditError> {
        tracing::info!(
            target: "stream_relay::audit",
            request_id = %record.request_id,
            tenant = %record.tenant_id,
            route = %record.route,
            status = record.status_code,
            duration_ms = record.duration_ms,
            bytes_out = record.bytes_out,
            chunks = record.chunks_count,
            error = record.error_type.map(|k| k.as_str()).unwrap_or(""),
            "request completed"
        );
        Ok(())
    }
}

/// Appends records as JSON lines to a file.
#[derive(Debug)]
pub struct JsonlAuditSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlAuditSink {
    /// Open `path` for appending, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(File::from_std(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn persist(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Forwards each record to every registered sink in order.
#[derive(Default)]
pub struct FanoutAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutAuditSink {
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn AuditSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl AuditSink for FanoutAuditSink {
    async fn persist(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.persist(record).await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Optional persistence collaborator.
#[derive(Clone, Default)]
pub enum AuditStore {
    #[default]
    Disabled,
    Enabled(Arc<dyn AuditSink>),
}

impl AuditStore {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        AuditStore::Enabled(sink)
    }

    /// Build the configured sinks. A sink that cannot be opened is logged and
    /// left out.
    pub fn from_config(config: &StorageConfig) -> Self {
        let mut fanout = FanoutAuditSink::default();

        if config.log_summary {
            fanout.push(Arc::new(TracingAuditSink));
        }

        if let Some(path) = &config.jsonl_path {
            match JsonlAuditSink::open(path) {
                Ok(sink) => {
                    tracing::info!(path = %sink.path().display(), "JSON-lines audit sink opened");
                    fanout.push(Arc::new(sink));
                }
                Err(e) => {
                    tracing::error!(path = %path, error = %e, "Audit file unavailable, continuing without it");
                }
            }
        }

        if fanout.is_empty() {
            AuditStore::Disabled
        } else {
            AuditStore::Enabled(Arc::new(fanout))
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, AuditStore::Enabled(_))
    }

    pub async fn persist(&self, record: &AuditRecord) -> Result<(), AuditError> {
        match self {
            AuditStore::Disabled => Ok(()),
            AuditStore::Enabled(sink) => sink.persist(record).await,
        }
    }
}

impl std::fmt::Debug for AuditStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditStore::Disabled => f.write_str("AuditStore::Disabled"),
            AuditStore::Enabled(_) => f.write_str("AuditStore::Enabled"),
        }
    }
}
