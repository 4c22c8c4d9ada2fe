//! Per-source circuit breaker (§4.2).
//!
//! Grounded on `runtime/src/error_handler/mod.rs`'s `CircuitBreaker`/
//! `CircuitBreakerState`, generalized with a half-open success counter
//! (the teacher's version closes immediately on one success; spec §4.2
//! requires `success_threshold` successes in half-open before closing).
//! The breaker exposes only `check`/`record_success`/`record_failure` and
//! never wraps the call itself, so the retry engine can interpret
//! outcomes freely.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;

use super::Source;

#[derive(Debug, Error, Clone, Copy)]
#[error("circuit open")]
pub struct CircuitOpenError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            cooldown: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CircuitBreakerStats {
    pub total_failures: u64,
    pub total_successes: u64,
    pub times_opened: u64,
}

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    half_open_successes: u32,
    last_failure: Option<Instant>,
    stats: CircuitBreakerStats,
}

/// A single source's circuit breaker.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                last_failure: None,
                stats: CircuitBreakerStats::default(),
            }),
        }
    }

    /// Fail fast with `circuit_open` unless closed or cooldown has
    /// elapsed (in which case the breaker transitions to half-open and
    /// the call is allowed through as a probe).
    pub fn check(&self) -> Result<(), CircuitOpenError> {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::HalfOpen => Ok(()),
            BreakerState::Open => {
                let elapsed_ok = inner
                    .last_failure
                    .map(|t| t.elapsed() >= self.config.cooldown)
                    .unwrap_or(true);
                if elapsed_ok {
                    inner.state = BreakerState::HalfOpen;
                    inner.half_open_successes = 0;
                    tracing::info!("circuit breaker transitioning to half-open");
                    Ok(())
                } else {
                    Err(CircuitOpenError)
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.stats.total_successes += 1;
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures = 0;
            }
            BreakerState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.success_threshold {
                    inner.state = BreakerState::Closed;
                    inner.consecutive_failures = 0;
                    inner.half_open_successes = 0;
                    tracing::info!("circuit breaker closed after recovery");
                }
            }
            BreakerState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.stats.total_failures += 1;
        inner.last_failure = Some(Instant::now());
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.stats.times_opened += 1;
                    tracing::warn!(
                        "circuit breaker opened after {} consecutive failures",
                        inner.consecutive_failures
                    );
                }
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.half_open_successes = 0;
                inner.stats.times_opened += 1;
                tracing::warn!("circuit breaker reopened after failure in half-open");
            }
            BreakerState::Open => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        self.inner.lock().stats
    }
}

/// Registry of breakers keyed by source, get-or-create like the rate
/// limiter registry.
#[derive(Default)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<Source, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, source: Source, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(source)
            .or_insert_with(|| Arc::new(CircuitBreaker::new(config)))
            .clone()
    }
}
