//! Per-tenant rate limiting.
//!
//! Each tenant key owns one token bucket, created lazily on first sight and
//! reclaimed by a periodic sweep once it has been idle for `idle_ttl`. The
//! registry is an owned [`TenantLimiter`], never a process-wide global.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::config::RateLimitConfig;

/// Tokens left and the limiter-clock time they were last topped up.
#[derive(Debug)]
struct Tokens {
    available: f64,
    refilled_at_ms: u64,
}

/// One tenant's bucket plus the time it was last consulted.
#[derive(Debug)]
pub struct TenantBucket {
    tokens: Mutex<Tokens>,
    /// Milliseconds since the limiter's epoch.
    last_access: AtomicU64,
}

impl TenantBucket {
    fn new(capacity: f64, now_ms: u64) -> Self {
        Self {
            tokens: Mutex::new(Tokens {
                available: capacity,
                refilled_at_ms: now_ms,
            }),
            last_access: AtomicU64::new(now_ms),
        }
    }

    /// Top up for the time since the last call, then spend one token if there is one.
    fn take(&self, capacity: f64, refill_per_sec: f64, now_ms: u64) -> bool {
        let mut tokens = self
            .tokens
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let elapsed_secs = now_ms.saturating_sub(tokens.refilled_at_ms) as f64 / 1000.0;
        tokens.available = capacity.min(tokens.available + elapsed_secs * refill_per_sec);
        tokens.refilled_at_ms = tokens.refilled_at_ms.max(now_ms);

        let granted = tokens.available >= 1.0;
        if granted {
            tokens.available -= 1.0;
        }
        granted
    }

    fn touch(&self, now_ms: u64) {
        self.last_access.fetch_max(now_ms, Ordering::Relaxed);
    }

    fn idle_for(&self, now_ms: u64) -> Duration {
        let last = self.last_access.load(Ordering::Relaxed);
        Duration::from_millis(now_ms.saturating_sub(last))
    }
}

/// Keyed registry of tenant buckets.
#[derive(Debug)]
pub struct TenantLimiter {
    enabled: bool,
    buckets: DashMap<String, Arc<TenantBucket>>,
    capacity: f64,
    refill_per_sec: f64,
    idle_ttl: Duration,
    sweep_interval: Duration,
    epoch: Instant,
}

impl TenantLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            buckets: DashMap::new(),
            capacity: config.burst as f64,
            refill_per_sec: config.requests_per_minute as f64 / 60.0,
            idle_ttl: Duration::from_secs(config.idle_ttl_secs),
            sweep_interval: Duration::from_secs(config.sweep_interval_secs.max(1)),
            epoch: Instant::now(),
        }
    }

    /// Try to take one token for `tenant`. Never blocks.
    pub fn allow(&self, tenant: &str) -> bool {
        if !self.enabled {
            return true;
        }

        let now = self.now_ms();
        let bucket = self.bucket(tenant, now);
        bucket.touch(now);
        bucket.take(self.capacity, self.refill_per_sec, now)
    }

    /// Existing bucket via a shard read lock; otherwise create it through the
    /// shard's exclusive entry, which re-checks so racing creators share one bucket.
    fn bucket(&self, tenant: &str, now_ms: u64) -> Arc<TenantBucket> {
        if let Some(existing) = self.buckets.get(tenant) {
            return Arc::clone(existing.value());
        }

        let entry = self
            .buckets
            .entry(tenant.to_owned())
            .or_insert_with(|| {
                tracing::debug!(tenant = %tenant, "Creating rate limit bucket");
                Arc::new(TenantBucket::new(self.capacity, now_ms))
            });
        Arc::clone(entry.value())
    }

    /// Remove buckets not consulted for at least `idle_ttl`. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.now_ms();
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| bucket.idle_for(now) < self.idle_ttl);
        let removed = before.saturating_sub(self.buckets.len());
        if removed > 0 {
            tracing::debug!(
                removed,
                remaining = self.buckets.len(),
                "Reclaimed idle rate limit buckets"
            );
        }
        removed
    }

    /// Number of tenants currently tracked.
    pub fn tracked_tenants(&self) -> usize {
        self.buckets.len()
    }

    /// Run [`sweep`](Self::sweep) every `sweep_interval` until `stop` is cancelled.
    pub fn spawn_sweeper(self: &Arc<Self>, stop: CancellationToken) {
        if !self.enabled {
            return;
        }
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(limiter.sweep_interval);
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        limiter.sweep();
                    }
                    _ = stop.cancelled() => {
                        tracing::debug!("Rate limit sweeper stopped");
                        break;
                    }
                }
            }
        });
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}
