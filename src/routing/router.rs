//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes in declaration order
//! - Return the first route whose prefix matches, or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - First match wins; there is no longest-prefix tie-break, so operators list
//!   specific prefixes before general ones
//! - O(n) prefix scan (acceptable for typical route counts)

use std::sync::Arc;

use crate::config::RouteConfig;
use crate::routing::matcher::Matcher;
use crate::routing::route::{RouteError, RouteSpec};

/// Ordered, immutable set of routes.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Arc<RouteSpec>>,
}

impl RouteTable {
    /// Compile routes from configuration, keeping their order.
    pub fn from_config(configs: &[RouteConfig]) -> Result<Self, RouteError> {
        let routes = configs
            .iter()
            .map(|c| RouteSpec::from_config(c).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { routes })
    }

    /// First route whose prefix matches `path`.
    pub fn resolve(&self, path: &str) -> Option<Arc<RouteSpec>> {
        self.routes
            .iter()
            .find(|route| route.matcher.matches(path))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
