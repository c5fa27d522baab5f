//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → auth.rs (bearer key must match the configured set)
//!     → rate_limit.rs (per-tenant token bucket)
//!     → Pass to the relay engine
//!     → headers.rs (strip inbound credential and hop-by-hop headers)
//! ```
//!
//! # Design Decisions
//! - Authentication runs before any other work, including route lookup
//! - Fail closed: reject on any security check failure
//! - Admission never blocks: a denied tenant is answered immediately

pub mod auth;
pub mod headers;
pub mod rate_limit;

pub use auth::ApiKeys;
pub use rate_limit::TenantLimiter;
