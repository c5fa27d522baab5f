//! Compiled route specification.

use axum::http::{HeaderName, HeaderValue};
use url::Url;

use crate::config::{RouteConfig, StreamKind};
use crate::routing::matcher::PathPrefixMatcher;

/// Where an upstream credential comes from.
///
/// Only the variable name is stored; the value is read on every request so a
/// rotated secret takes effect without a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretSource {
    env: String,
}

impl SecretSource {
    pub fn env(name: impl Into<String>) -> Self {
        Self { env: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.env
    }

    /// Current value, or `None` when unset or empty.
    pub fn resolve(&self) -> Option<String> {
        std::env::var(&self.env).ok().filter(|v| !v.is_empty())
    }
}

/// Header injection rule for the upstream credential.
#[derive(Debug, Clone)]
pub struct UpstreamAuth {
    pub header: HeaderName,
    pub secret: SecretSource,
}

impl UpstreamAuth {
    /// Resolve the secret into a header value, adding the bearer scheme when the
    /// target is `Authorization` and the secret lacks it.
    pub fn header_value(&self) -> Option<HeaderValue> {
        let secret = self.secret.resolve()?;
        let value = if self.header == axum::http::header::AUTHORIZATION
            && !secret.starts_with("Bearer ")
        {
            format!("Bearer {secret}")
        } else {
            secret
        };
        HeaderValue::from_str(&value).ok()
    }
}

/// An immutable route, compiled from [`RouteConfig`] at startup.
#[derive(Debug, Clone)]
pub struct RouteSpec {
    pub name: String,
    pub matcher: PathPrefixMatcher,
    pub upstream: Url,
    pub auth: Option<UpstreamAuth>,
    pub kind: StreamKind,
}

/// Error compiling a route; validation normally rules these out.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("route {0}: invalid upstream url: {1}")]
    Upstream(String, url::ParseError),

    #[error("route {0}: invalid auth header name {1:?}")]
    Header(String, String),
}

impl RouteSpec {
    pub fn from_config(config: &RouteConfig) -> Result<Self, RouteError> {
        let upstream = Url::parse(&config.upstream)
            .map_err(|e| RouteError::Upstream(config.name.clone(), e))?;

        let auth = match (&config.auth_header, &config.auth_env) {
            (Some(header), Some(env)) => {
                let header = HeaderName::from_bytes(header.as_bytes())
                    .map_err(|_| RouteError::Header(config.name.clone(), header.clone()))?;
                Some(UpstreamAuth {
                    header,
                    secret: SecretSource::env(env.clone()),
                })
            }
            _ => None,
        };

        Ok(Self {
            name: config.name.clone(),
            matcher: PathPrefixMatcher::new(config.path.clone()),
            upstream,
            auth,
            kind: config.kind,
        })
    }
}
