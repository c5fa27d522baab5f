//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     Trigger → server stops accepting → readiness reports draining
//!
//! Drain (drain.rs):
//!     In-flight streams → wait until zero or grace expires → abort the rest
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, drain, abort, close
//! - Shutdown has a deadline: forwarders still running after the grace period are cut

pub mod drain;
pub mod shutdown;
pub mod signals;

pub use drain::{StreamGuard, StreamTracker};
pub use shutdown::{Shutdown, ShutdownSignal};
