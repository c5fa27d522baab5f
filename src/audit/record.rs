//! Audit record data model.

use serde::{Deserialize, Serialize};

use crate::config::StreamKind;
use crate::error::ErrorKind;
use crate::routing::RouteSpec;

/// Provider name recorded when no inspector recognises the upstream.
pub const UNKNOWN_PROVIDER: &str = "unknown";

/// Route name recorded when the request failed before a route resolved.
pub const NO_ROUTE: &str = "none";

/// Immutable summary of one relayed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub request_id: String,
    pub tenant_id: String,
    /// Unix epoch milliseconds.
    pub created_at: u64,
    pub route: String,
    pub provider: String,
    pub kind: Option<StreamKind>,
    pub request_body: String,
    pub status_code: u16,
    /// Forwarded units; only line-events streams keep these.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_chunks: Vec<String>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttft_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttfa_ms: Option<u64>,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub chunks_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_out: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Token counts reported by an upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

/// Hook for extracting provider metadata from a completed exchange.
///
/// Response formats differ per provider and are not parsed by the relay
/// itself; implementations plug in here.
pub trait ResponseInspector: Send + Sync {
    fn provider(&self, route: &RouteSpec) -> Option<String>;

    fn usage(&self, transcript: &[String]) -> Option<TokenUsage>;
}

/// Inspector that recognises nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpaqueInspector;

impl ResponseInspector for OpaqueInspector {
    fn provider(&self, _route: &RouteSpec) -> Option<String> {
        None
    }

    fn usage(&self, _transcript: &[String]) -> Option<TokenUsage> {
        None
    }
}
