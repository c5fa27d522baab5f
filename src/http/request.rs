//! Request identity.
//!
//! # Responsibilities
//! - Generate unique request IDs (UUID v4)
//! - Extract the tenant key used for rate-limit accounting
//!
//! # Design Decisions
//! - Request ID generated once per relayed request and echoed to the client
//! - A missing or unusable tenant header falls back to a fixed sentinel tenant

use axum::http::{HeaderMap, HeaderName};
use uuid::Uuid;

/// Response header echoing the request ID.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Request header naming the tenant.
pub const X_TENANT_ID: HeaderName = HeaderName::from_static("x-tenant-id");

/// Tenant used when the client does not name one.
pub const DEFAULT_TENANT: &str = "default";

/// Unique identifier of one relayed request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tenant key for rate limiting and audit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Read `X-Tenant-ID`, falling back to [`DEFAULT_TENANT`].
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let id = headers
            .get(X_TENANT_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_TENANT);
        Self(id.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
