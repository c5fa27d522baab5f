//! Per-request relay state.

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::audit::record::{AuditRecord, ResponseInspector, NO_ROUTE, UNKNOWN_PROVIDER};
use crate::error::ErrorKind;
use crate::http::request::{RequestId, TenantId};
use crate::routing::RouteSpec;

/// Everything observed about one request, owned by the task handling it.
///
/// Built up while the request is relayed and converted exactly once into an
/// [`AuditRecord`] when it completes.
#[derive(Debug)]
pub struct RequestContext {
    pub request_id: RequestId,
    pub tenant: TenantId,
    route: Option<Arc<RouteSpec>>,
    started: Instant,
    created_at: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub chunks: u64,
    ttft_ms: Option<u64>,
    ttfa_ms: Option<u64>,
    transcript: Vec<String>,
    pub status: u16,
    error: Option<(ErrorKind, String)>,
}

impl RequestContext {
    pub fn new(request_id: RequestId, tenant: TenantId) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            request_id,
            tenant,
            route: None,
            started: Instant::now(),
            created_at,
            bytes_in: 0,
            bytes_out: 0,
            chunks: 0,
            ttft_ms: None,
            ttfa_ms: None,
            transcript: Vec::new(),
            status: 0,
            error: None,
        }
    }

    pub fn set_route(&mut self, route: Arc<RouteSpec>) {
        self.route = Some(route);
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn ttft_ms(&self) -> Option<u64> {
        self.ttft_ms
    }

    pub fn ttfa_ms(&self) -> Option<u64> {
        self.ttfa_ms
    }

    /// Record time-to-first-token. Only the first call has an effect.
    pub fn mark_first_token(&mut self) {
        if self.ttft_ms.is_none() {
            self.ttft_ms = Some(self.elapsed_ms());
        }
    }

    /// Record time-to-first-audio. Only the first call has an effect.
    pub fn mark_first_audio(&mut self) {
        if self.ttfa_ms.is_none() {
            self.ttfa_ms = Some(self.elapsed_ms());
        }
    }

    /// Account for one forwarded line; the line is kept in the transcript and
    /// counted with its newline.
    pub fn record_line(&mut self, line: &[u8]) {
        self.transcript
            .push(String::from_utf8_lossy(line).into_owned());
        self.bytes_out += line.len() as u64 + 1;
        self.chunks += 1;
    }

    /// Account for one forwarded binary chunk. The payload is not retained.
    pub fn record_chunk(&mut self, len: usize) {
        self.bytes_out += len as u64;
        self.chunks += 1;
    }

    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    pub fn fail(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.error = Some((kind, message.into()));
    }

    /// Freeze into the audit record for this request.
    pub fn into_record(self, request_body: &[u8], inspector: &dyn ResponseInspector) -> AuditRecord {
        let duration_ms = self.elapsed_ms();
        let usage = inspector.usage(&self.transcript);
        let (route, provider, kind) = match self.route.as_deref() {
            Some(route) => (
                route.name.clone(),
                inspector
                    .provider(route)
                    .unwrap_or_else(|| UNKNOWN_PROVIDER.to_string()),
                Some(route.kind),
            ),
            None => (NO_ROUTE.to_string(), UNKNOWN_PROVIDER.to_string(), None),
        };
        let (error_type, error_message) = match self.error {
            Some((kind, message)) => (Some(kind), Some(message)),
            None => (None, None),
        };

        AuditRecord {
            request_id: self.request_id.as_str().to_string(),
            tenant_id: self.tenant.as_str().to_string(),
            created_at: self.created_at,
            route,
            provider,
            kind,
            request_body: String::from_utf8_lossy(request_body).into_owned(),
            status_code: self.status,
            response_chunks: self.transcript,
            duration_ms,
            ttft_ms: self.ttft_ms,
            ttfa_ms: self.ttfa_ms,
            bytes_in: self.bytes_in,
            bytes_out: self.bytes_out,
            chunks_count: self.chunks,
            tokens_in: usage.map(|u| u.input),
            tokens_out: usage.map(|u| u.output),
            error_type,
            error_message,
        }
    }
}
