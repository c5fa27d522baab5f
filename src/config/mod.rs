//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (expand $VAR references, parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RelayConfig (validated, immutable)
//!     → handed to the server, engine and limiter at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Upstream secrets are NOT read here; routes keep the variable name and the
//!   value is resolved per request

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AuthConfig, LogFormat, LoggingConfig, ObservabilityConfig, RateLimitConfig, RelayConfig,
    RouteConfig, ServerConfig, StorageConfig, StreamConfig, StreamKind, UpstreamConfig,
};
