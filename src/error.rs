//! Gateway error taxonomy.
//!
//! Every failure a request can hit is classified into an [`ErrorKind`]. The kind is what
//! lands in audit records and metric labels; [`GatewayError`] carries the detail and decides
//! the HTTP status when the failure happens before any response bytes were sent.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable classification of a request failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RouteNotFound,
    Unauthorized,
    RateLimited,
    UpstreamError,
    StreamError,
    BodyTooLarge,
}

impl ErrorKind {
    /// Label used in metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::RouteNotFound => "route_not_found",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::UpstreamError => "upstream_error",
            ErrorKind::StreamError => "stream_error",
            ErrorKind::BodyTooLarge => "body_too_large",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by the gateway before the upstream response starts streaming.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("route not found for path: {0}")]
    RouteNotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("read request body: {0}")]
    BodyRead(String),

    #[error("build upstream request: {0}")]
    InvalidUpstreamRequest(String),

    #[error("upstream request: {0}")]
    Upstream(#[source] reqwest::Error),

    #[error("upstream timed out: {0}")]
    UpstreamTimeout(#[source] reqwest::Error),

    #[error("request aborted by shutdown")]
    Aborted,
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::RouteNotFound(_) => ErrorKind::RouteNotFound,
            GatewayError::Unauthorized => ErrorKind::Unauthorized,
            GatewayError::RateLimited => ErrorKind::RateLimited,
            GatewayError::BodyTooLarge { .. } => ErrorKind::BodyTooLarge,
            GatewayError::BodyRead(_) => ErrorKind::StreamError,
            GatewayError::InvalidUpstreamRequest(_)
            | GatewayError::Upstream(_)
            | GatewayError::UpstreamTimeout(_)
            | GatewayError::Aborted => ErrorKind::UpstreamError,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::BodyRead(_) => StatusCode::BAD_REQUEST,
            GatewayError::InvalidUpstreamRequest(_) | GatewayError::Upstream(_) => {
                StatusCode::BAD_GATEWAY
            }
            GatewayError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Aborted => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Classify a transport error from the upstream client.
    pub fn from_upstream(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::UpstreamTimeout(err)
        } else {
            GatewayError::Upstream(err)
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind: ErrorKind,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
            kind: self.kind(),
        };
        (self.status(), Json(body)).into_response()
    }
}
