//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, fanned out to console + file)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON file)
//!     → Metrics endpoint (Prometheus scrape on the gateway listener)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON optional) for machine parsing
//! - Request ID flows through the relay span of every request
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
