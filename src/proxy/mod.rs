//! Relay subsystem.
//!
//! # Data Flow
//! ```text
//! Admitted request
//!     → engine.rs (route, body limit, upstream call)
//!     → upstream.rs (pooled client, header filtering, credential injection)
//!     → forwarder.rs (line events | raw bytes)
//!     → sink.rs (bounded channel into the response body)
//!     → context.rs → AuditRecord → audit pipeline
//! ```
//!
//! # Design Decisions
//! - The request context is owned by one task and never shared
//! - Bytes reach the client in upstream order, flushed per unit

pub mod context;
pub mod engine;
pub mod forwarder;
pub mod sink;
pub mod upstream;

pub use context::RequestContext;
pub use engine::{EngineError, RelayEngine};
pub use forwarder::ForwardError;
pub use sink::{ChannelSink, SinkError, StreamSink};
pub use upstream::UpstreamClient;
