//! HTTP server setup and request admission.
//!
//! # Responsibilities
//! - Create the Axum router: probes, metrics scrape, proxy fallback
//! - Authenticate and rate-limit before handing a request to the relay engine
//! - Bind the server to a listener and run it until shutdown
//! - Drain in-flight streams within the grace period, then abort the rest

use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{FromRef, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::RelayConfig;
use crate::error::{ErrorKind, GatewayError};
use crate::http::probes::{self, HEALTH_PATH, READY_PATH};
use crate::http::request::TenantId;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::proxy::RelayEngine;
use crate::security::{ApiKeys, TenantLimiter};

/// How long aborted forwarders get to unwind once the grace period is over.
const ABORT_SETTLE: Duration = Duration::from_secs(5);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RelayEngine>,
    pub auth: Arc<ApiKeys>,
    pub limiter: Arc<TenantLimiter>,
    pub metrics: Option<PrometheusHandle>,
    pub shutdown: Shutdown,
}

impl FromRef<AppState> for Shutdown {
    fn from_ref(state: &AppState) -> Self {
        state.shutdown.clone()
    }
}

/// The gateway's HTTP front end.
pub struct GatewayServer {
    state: AppState,
    metrics_path: Option<String>,
    grace: Duration,
}

impl GatewayServer {
    pub fn new(config: &RelayConfig, engine: Arc<RelayEngine>, shutdown: Shutdown) -> Self {
        let auth = ApiKeys::new(config.auth.api_keys.iter().cloned());
        if auth.is_empty() {
            tracing::warn!("No API keys configured, every proxied request will be rejected");
        }

        let state = AppState {
            engine,
            auth: Arc::new(auth),
            limiter: Arc::new(TenantLimiter::new(&config.rate_limit)),
            metrics: None,
            shutdown,
        };

        Self {
            state,
            metrics_path: config
                .observability
                .metrics_enabled
                .then(|| config.observability.metrics_path.clone()),
            grace: config.server.shutdown_grace(),
        }
    }

    /// Serve Prometheus text on the configured metrics path.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics = Some(handle);
        self
    }

    pub fn limiter(&self) -> &Arc<TenantLimiter> {
        &self.state.limiter
    }

    /// Build the Axum router with all middleware layers.
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route(HEALTH_PATH, get(probes::health))
            .route(READY_PATH, get(probes::ready));

        if let (Some(path), Some(_)) = (&self.metrics_path, &self.state.metrics) {
            router = router.route(path, get(metrics_handler));
        }

        router
            .fallback(proxy_handler)
            .with_state(self.state.clone())
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
    }

    /// Run the server on `listener` until shutdown is triggered and in-flight
    /// streams have drained or been aborted.
    pub async fn run(self, listener: TcpListener) -> io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let sweeper_stop = CancellationToken::new();
        self.state.limiter.spawn_sweeper(sweeper_stop.clone());

        let app = self.router();
        let stop_accepting = self.state.shutdown.subscribe();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(stop_accepting.recv())
                .await
        });

        tokio::select! {
            result = &mut server => {
                sweeper_stop.cancel();
                return flatten(result);
            }
            _ = self.state.shutdown.subscribe().recv() => {}
        }

        let engine = &self.state.engine;
        let tracker = engine.tracker();
        tracing::info!(
            active_streams = tracker.active_count(),
            grace_secs = self.grace.as_secs(),
            "Stopped accepting connections, draining streams"
        );

        if tokio::time::timeout(self.grace, tracker.wait_idle()).await.is_err() {
            tracing::warn!(
                active_streams = tracker.active_count(),
                "Grace period expired, aborting in-flight streams"
            );
            engine.abort_token().cancel();
        }

        let result = match tokio::time::timeout(ABORT_SETTLE, &mut server).await {
            Ok(joined) => flatten(joined),
            Err(_) => {
                tracing::warn!("Connections still open, forcing server stop");
                server.abort();
                Ok(())
            }
        };

        sweeper_stop.cancel();
        tracing::info!("HTTP server stopped");
        result
    }
}

fn flatten(joined: Result<io::Result<()>, tokio::task::JoinError>) -> io::Result<()> {
    joined.map_err(io::Error::other)?
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Admission gate in front of the relay engine.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    if !state.auth.authenticate(request.headers()) {
        metrics::record_rejection(ErrorKind::Unauthorized);
        tracing::debug!(path = %request.uri().path(), "Missing or unknown API key");
        return GatewayError::Unauthorized.into_response();
    }

    let tenant = TenantId::from_headers(request.headers());
    if !state.limiter.allow(tenant.as_str()) {
        metrics::record_rejection(ErrorKind::RateLimited);
        tracing::info!(tenant = %tenant, "Rate limit exceeded");
        return GatewayError::RateLimited.into_response();
    }

    state.engine.handle(tenant, request).await
}
