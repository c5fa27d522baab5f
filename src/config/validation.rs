//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic, including the stream kind)
//! - Validate value ranges (sizes > 0, bind address parses)
//! - Check route integrity (unique names, absolute upstream URLs, paired auth settings)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::HeaderName;
use thiserror::Error;
use url::Url;

use crate::config::schema::RelayConfig;
use crate::http::probes::{HEALTH_PATH, READY_PATH};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid bind address: {0}")]
    BindAddress(String),

    #[error("no routes configured")]
    NoRoutes,

    #[error("route #{0}: name is required")]
    RouteName(usize),

    #[error("route {0}: duplicate name")]
    DuplicateRoute(String),

    #[error("route {0}: path must start with '/'")]
    RoutePath(String),

    #[error("route {0}: upstream must be an absolute http(s) URL, got {1:?}")]
    RouteUpstream(String, String),

    #[error("route {0}: invalid auth_header {1:?}")]
    AuthHeader(String, String),

    #[error("route {0}: auth_header and auth_env must be set together")]
    AuthPairing(String),

    #[error("rate_limit: {0} must be greater than zero")]
    RateLimit(&'static str),

    #[error("{0} must be greater than zero")]
    NonPositive(&'static str),

    #[error("metrics path {0:?} must start with '/' and not shadow a probe")]
    MetricsPath(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.server.bind_address.clone(),
        ));
    }

    let sizes = [
        ("server.max_body_size", config.server.max_body_size as u64),
        ("server.shutdown_grace_secs", config.server.shutdown_grace_secs),
        ("server.request_timeout_secs", config.server.request_timeout_secs),
        ("stream.raw_chunk_size", config.stream.raw_chunk_size as u64),
        ("stream.max_line_bytes", config.stream.max_line_bytes as u64),
        ("stream.channel_capacity", config.stream.channel_capacity as u64),
    ];
    for (name, value) in sizes {
        if value == 0 {
            errors.push(ValidationError::NonPositive(name));
        }
    }

    if config.routes.is_empty() {
        errors.push(ValidationError::NoRoutes);
    }

    let mut seen = HashSet::new();
    for (index, route) in config.routes.iter().enumerate() {
        if route.name.is_empty() {
            errors.push(ValidationError::RouteName(index));
            continue;
        }
        if !seen.insert(route.name.as_str()) {
            errors.push(ValidationError::DuplicateRoute(route.name.clone()));
        }
        if !route.path.starts_with('/') {
            errors.push(ValidationError::RoutePath(route.name.clone()));
        }
        let upstream_ok = Url::parse(&route.upstream)
            .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
            .unwrap_or(false);
        if !upstream_ok {
            errors.push(ValidationError::RouteUpstream(
                route.name.clone(),
                route.upstream.clone(),
            ));
        }
        match (&route.auth_header, &route.auth_env) {
            (Some(header), Some(env)) => {
                if HeaderName::from_bytes(header.as_bytes()).is_err() {
                    errors.push(ValidationError::AuthHeader(
                        route.name.clone(),
                        header.clone(),
                    ));
                }
                if env.is_empty() {
                    errors.push(ValidationError::AuthPairing(route.name.clone()));
                }
            }
            (None, None) => {}
            _ => errors.push(ValidationError::AuthPairing(route.name.clone())),
        }
    }

    if config.rate_limit.enabled {
        if config.rate_limit.requests_per_minute == 0 {
            errors.push(ValidationError::RateLimit("requests_per_minute"));
        }
        if config.rate_limit.burst == 0 {
            errors.push(ValidationError::RateLimit("burst"));
        }
        if config.rate_limit.idle_ttl_secs == 0 {
            errors.push(ValidationError::RateLimit("idle_ttl_secs"));
        }
        if config.rate_limit.sweep_interval_secs == 0 {
            errors.push(ValidationError::RateLimit("sweep_interval_secs"));
        }
    }

    let metrics_path = &config.observability.metrics_path;
    if config.observability.metrics_enabled
        && (!metrics_path.starts_with('/')
            || metrics_path == HEALTH_PATH
            || metrics_path == READY_PATH)
    {
        errors.push(ValidationError::MetricsPath(metrics_path.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
