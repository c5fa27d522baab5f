//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → router.rs (ordered scan)
//!     → matcher.rs (literal prefix test)
//!     → Return: matched RouteSpec or NoMatch
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → route.rs (parse upstream URL, auth header name, secret source)
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route
//! - First match wins (declaration order)

pub mod matcher;
pub mod route;
pub mod router;

pub use route::{RouteSpec, SecretSource, UpstreamAuth};
pub use router::RouteTable;
