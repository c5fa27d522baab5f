//! Liveness and readiness probes.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::lifecycle::Shutdown;

pub const HEALTH_PATH: &str = "/healthz";
pub const READY_PATH: &str = "/readyz";

#[derive(Debug, Serialize)]
pub struct ProbeStatus {
    pub status: &'static str,
    /// Unix seconds.
    pub time: u64,
}

impl ProbeStatus {
    fn now(status: &'static str) -> Self {
        let time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self { status, time }
    }
}

/// The process is up.
pub async fn health() -> Json<ProbeStatus> {
    Json(ProbeStatus::now("healthy"))
}

/// The process accepts traffic; reports draining once shutdown began.
pub async fn ready(State(shutdown): State<Shutdown>) -> (StatusCode, Json<ProbeStatus>) {
    if shutdown.is_triggered() {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ProbeStatus::now("draining")),
        )
    } else {
        (StatusCode::OK, Json(ProbeStatus::now("ready")))
    }
}
