//! Request orchestration.
//!
//! # Responsibilities
//! - Resolve the route, read the bounded request body, issue the upstream call
//! - Hand the upstream body to the forwarder matching the route's stream kind
//! - Emit exactly one audit record per request, on every path
//!
//! # Design Decisions
//! - Failures before the upstream responds become gateway errors; their audit
//!   record is written before the error response is returned
//! - Once headers are relayed the body streams from a spawned task; the handler
//!   returns immediately with a channel-backed body
//! - Mid-stream failures cut the client connection and live only in the audit trail
//! - A request is tracked from admission until its audit record is written, so
//!   shutdown waits for requests still waiting on upstream headers too

use std::io;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Request};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::TryStreamExt;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::audit::record::{OpaqueInspector, ResponseInspector};
use crate::audit::AuditPipeline;
use crate::config::{RelayConfig, StreamConfig, StreamKind};
use crate::error::{ErrorKind, GatewayError};
use crate::http::request::{RequestId, TenantId};
use crate::http::response::{streaming, with_request_id};
use crate::lifecycle::{StreamGuard, StreamTracker};
use crate::proxy::context::RequestContext;
use crate::proxy::forwarder::{forward_lines, forward_raw};
use crate::proxy::sink::ChannelSink;
use crate::proxy::upstream::UpstreamClient;
use crate::routing::route::RouteError;
use crate::routing::{RouteSpec, RouteTable};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Route(#[from] RouteError),

    #[error("build upstream client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Relays requests to their upstream and records the outcome.
pub struct RelayEngine {
    routes: RouteTable,
    client: UpstreamClient,
    audit: AuditPipeline,
    inspector: Arc<dyn ResponseInspector>,
    stream: StreamConfig,
    max_body_size: usize,
    tracker: StreamTracker,
    abort: CancellationToken,
}

impl RelayEngine {
    pub fn new(config: &RelayConfig, audit: AuditPipeline) -> Result<Self, EngineError> {
        let routes = RouteTable::from_config(&config.routes)?;
        let client = UpstreamClient::new(&config.upstream, config.server.request_timeout())?;

        tracing::info!(routes = routes.len(), "Relay engine initialized");

        Ok(Self {
            routes,
            client,
            audit,
            inspector: Arc::new(OpaqueInspector),
            stream: config.stream.clone(),
            max_body_size: config.server.max_body_size,
            tracker: StreamTracker::new(),
            abort: CancellationToken::new(),
        })
    }

    /// Replace the provider/usage inspector.
    pub fn with_inspector(mut self, inspector: Arc<dyn ResponseInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    /// Requests admitted and not yet audited.
    pub fn tracker(&self) -> &StreamTracker {
        &self.tracker
    }

    /// Cancelling this token ends every in-flight request, whether it is
    /// still waiting on the upstream or already streaming.
    pub fn abort_token(&self) -> CancellationToken {
        self.abort.clone()
    }

    /// Relay one admitted request.
    pub async fn handle(self: &Arc<Self>, tenant: TenantId, request: Request<Body>) -> Response {
        let ctx = RequestContext::new(RequestId::new(), tenant);
        let span = tracing::info_span!(
            "relay",
            request_id = %ctx.request_id,
            tenant = %ctx.tenant,
            route = tracing::field::Empty,
        );
        let guard = self.tracker.track();
        self.relay(ctx, request, guard).instrument(span).await
    }

    async fn relay(
        self: &Arc<Self>,
        mut ctx: RequestContext,
        request: Request<Body>,
        guard: StreamGuard,
    ) -> Response {
        let (parts, body) = request.into_parts();

        let Some(route) = self.routes.resolve(parts.uri.path()) else {
            let err = GatewayError::RouteNotFound(parts.uri.path().to_string());
            return self.reject(ctx, Bytes::new(), err).await;
        };
        tracing::Span::current().record("route", route.name.as_str());
        ctx.set_route(Arc::clone(&route));

        let read = tokio::select! {
            biased;
            _ = self.abort.cancelled() => Err(GatewayError::Aborted),
            read = read_body(&parts.headers, body, self.max_body_size) => read,
        };
        let body = match read {
            Ok(body) => body,
            Err(err) => return self.reject(ctx, Bytes::new(), err).await,
        };
        ctx.bytes_in = body.len() as u64;

        let upstream_request = match self.client.build_request(
            &route,
            &parts.method,
            &parts.uri,
            &parts.headers,
            &ctx.request_id,
            body.clone(),
        ) {
            Ok(request) => request,
            Err(err) => return self.reject(ctx, body, err).await,
        };

        tracing::debug!(method = %parts.method, url = %upstream_request.url(), "Forwarding upstream");

        let sent = tokio::select! {
            biased;
            _ = self.abort.cancelled() => Err(GatewayError::Aborted),
            sent = self.client.send(upstream_request) => sent.map_err(GatewayError::from_upstream),
        };
        let response = match sent {
            Ok(response) => response,
            Err(err) => return self.reject(ctx, body, err).await,
        };

        let status = response.status();
        ctx.status = status.as_u16();
        let (sink, client_body) = ChannelSink::channel(self.stream.channel_capacity);
        let client_response = streaming(status, response.headers(), client_body, &ctx.request_id);

        let engine = Arc::clone(self);
        tokio::spawn(
            async move {
                engine.stream(ctx, route, response, sink, body, guard).await;
            }
            .in_current_span(),
        );

        client_response
    }

    /// Forward the upstream body, then emit the audit record.
    async fn stream(
        &self,
        mut ctx: RequestContext,
        route: Arc<RouteSpec>,
        response: reqwest::Response,
        mut sink: ChannelSink,
        request_body: Bytes,
        _guard: StreamGuard,
    ) {
        let upstream = Box::pin(response.bytes_stream().map_err(io::Error::other));

        let result = match route.kind {
            StreamKind::Sse => {
                forward_lines(upstream, &mut sink, &mut ctx, self.stream.max_line_bytes, &self.abort)
                    .await
            }
            StreamKind::Raw => {
                forward_raw(upstream, &mut sink, &mut ctx, self.stream.raw_chunk_size, &self.abort)
                    .await
            }
        };

        match result {
            Ok(()) => drop(sink),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    bytes_out = ctx.bytes_out,
                    chunks = ctx.chunks,
                    "Stream interrupted"
                );
                ctx.fail(ErrorKind::StreamError, e.to_string());
                sink.abort(e.to_string()).await;
            }
        }

        self.finish(ctx, &request_body).await;
    }

    /// Record a failure that happened before any response bytes were sent.
    async fn reject(&self, mut ctx: RequestContext, request_body: Bytes, err: GatewayError) -> Response {
        let status = err.status();
        match err.kind() {
            ErrorKind::UpstreamError => tracing::error!(error = %err, "Upstream request failed"),
            _ => tracing::warn!(error = %err, status = status.as_u16(), "Request rejected"),
        }

        ctx.status = status.as_u16();
        ctx.fail(err.kind(), err.to_string());
        let id = ctx.request_id.clone();
        self.finish(ctx, &request_body).await;

        with_request_id(err.into_response(), &id)
    }

    async fn finish(&self, ctx: RequestContext, request_body: &[u8]) {
        let record = ctx.into_record(request_body, self.inspector.as_ref());
        self.audit.emit(record).await;
    }
}

/// Buffer the inbound body, refusing anything over `limit` bytes.
async fn read_body(headers: &HeaderMap, body: Body, limit: usize) -> Result<Bytes, GatewayError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > limit as u64) {
        return Err(GatewayError::BodyTooLarge { limit });
    }

    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(GatewayError::BodyTooLarge { limit })
        }
        Err(e) => Err(GatewayError::BodyRead(e.to_string())),
    }
}
