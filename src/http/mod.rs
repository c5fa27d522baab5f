//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, probes, metrics, admission)
//!     → request.rs (request ID, tenant key)
//!     → [relay engine streams the upstream response]
//!     → response.rs (relay status and headers, attach request ID)
//!     → Send to client
//! ```

pub mod probes;
pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestId, TenantId, X_REQUEST_ID, X_TENANT_ID};
pub use server::{AppState, GatewayServer};
