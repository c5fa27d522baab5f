//! Streaming relay gateway.
//!
//! A reverse proxy for token-streaming and audio APIs that forwards responses
//! as they arrive and records per-request stream telemetry.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────▶ http::server ──▶ security (auth, tenant rate limit)
//!                                        │
//!                                        ▼
//!                                  proxy::engine ──▶ routing (first prefix match)
//!                                        │
//!                                        ▼
//!                                  proxy::upstream ──────────────────────▶ Upstream API
//!                                        │
//!     Client Response                    ▼
//!     ◀────────── proxy::sink ◀── proxy::forwarder (line events | raw bytes)
//!                                        │
//!                                        ▼
//!                                  audit (record → sinks, metrics)
//!
//!     Cross-cutting: config, observability, lifecycle (shutdown, drain)
//! ```

// Core subsystems
pub mod config;
pub mod http;
pub mod proxy;
pub mod routing;

// Cross-cutting concerns
pub mod audit;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::RelayConfig;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
pub use proxy::RelayEngine;
