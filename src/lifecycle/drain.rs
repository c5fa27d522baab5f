//! In-flight request tracking for graceful shutdown.
//!
//! # Responsibilities
//! - Count relayed requests from admission until their audit record is written
//! - Let shutdown wait until that count reaches zero
//!
//! # Design Decisions
//! - The count lives in a watch channel so waiters wake on change instead of polling
//! - A guard decrements on drop, so a panicking task still releases its slot

use std::sync::Arc;

use tokio::sync::watch;

use crate::observability::metrics;

/// Tracks requests the relay engine has not finished.
#[derive(Debug, Clone)]
pub struct StreamTracker {
    active: Arc<watch::Sender<u64>>,
}

impl StreamTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            active: Arc::new(tx),
        }
    }

    /// Record a new forwarding task. The returned guard releases it on drop.
    pub fn track(&self) -> StreamGuard {
        self.active.send_modify(|n| *n += 1);
        metrics::record_active_streams(self.active_count());
        StreamGuard {
            active: Arc::clone(&self.active),
        }
    }

    pub fn active_count(&self) -> u64 {
        *self.active.borrow()
    }

    /// Resolve once no forwarding task is active.
    pub async fn wait_idle(&self) {
        let mut rx = self.active.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl Default for StreamTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Held by a forwarding task for its lifetime.
#[derive(Debug)]
pub struct StreamGuard {
    active: Arc<watch::Sender<u64>>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.active.send_modify(|n| *n = n.saturating_sub(1));
        metrics::record_active_streams(*self.active.borrow());
    }
}
