//! Response construction.
//!
//! # Responsibilities
//! - Attach the request ID to every response the relay produces
//! - Turn an upstream status and headers plus a streaming body into a client response
//!
//! # Design Decisions
//! - Streaming responses never buffer the body
//! - Hop-by-hop and length headers are stripped before relaying

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;

use crate::http::request::{RequestId, X_REQUEST_ID};
use crate::security::headers::client_response_headers;

/// Set `X-Request-ID` on `response`.
pub fn with_request_id(mut response: Response, id: &RequestId) -> Response {
    if let Ok(value) = HeaderValue::from_str(id.as_str()) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }
    response
}

/// Client response relaying an upstream status and headers over `body`.
pub fn streaming(status: StatusCode, upstream_headers: &HeaderMap, body: Body, id: &RequestId) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = client_response_headers(upstream_headers);
    with_request_id(response, id)
}
