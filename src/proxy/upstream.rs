//! Pooled outbound client.
//!
//! # Responsibilities
//! - Keep a bounded pool of idle connections per upstream host
//! - Mirror the inbound method, path, query and body onto the route's upstream
//! - Replace the client's credential with the route's own
//!
//! # Design Decisions
//! - One total timeout bounds the whole exchange, body included
//! - Redirects are relayed to the client, never followed
//! - No retries: a partially delivered stream cannot be replayed

use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue, Method, Uri};
use bytes::Bytes;
use reqwest::redirect::Policy;
use url::Url;

use crate::config::UpstreamConfig;
use crate::error::GatewayError;
use crate::http::request::{RequestId, X_REQUEST_ID};
use crate::routing::RouteSpec;
use crate::security::headers::upstream_request_headers;

/// Join the route's base URL with the inbound path and query.
pub fn upstream_url(base: &Url, uri: &Uri) -> Result<Url, url::ParseError> {
    let mut target = format!("{}{}", base.as_str().trim_end_matches('/'), uri.path());
    if let Some(query) = uri.query() {
        target.push('?');
        target.push_str(query);
    }
    Url::parse(&target)
}

/// Outbound HTTP client shared by every request.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig, request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(request_timeout)
            .redirect(Policy::none())
            .build()?;
        Ok(Self { client })
    }

    /// Build the upstream request for `route`.
    pub fn build_request(
        &self,
        route: &RouteSpec,
        method: &Method,
        uri: &Uri,
        inbound: &HeaderMap,
        request_id: &RequestId,
        body: Bytes,
    ) -> Result<reqwest::Request, GatewayError> {
        let url = upstream_url(&route.upstream, uri)
            .map_err(|e| GatewayError::InvalidUpstreamRequest(e.to_string()))?;

        let mut headers = upstream_request_headers(inbound);
        if let Some(auth) = &route.auth {
            match auth.header_value() {
                Some(value) => {
                    headers.insert(auth.header.clone(), value);
                }
                None => tracing::warn!(
                    route = %route.name,
                    env = auth.secret.name(),
                    "Upstream credential is not set, forwarding without it"
                ),
            }
        }
        if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
            headers.insert(X_REQUEST_ID, value);
        }

        self.client
            .request(method.clone(), url)
            .headers(headers)
            .body(body)
            .build()
            .map_err(|e| GatewayError::InvalidUpstreamRequest(e.to_string()))
    }

    pub async fn send(&self, request: reqwest::Request) -> Result<reqwest::Response, reqwest::Error> {
        self.client.execute(request).await
    }
}
