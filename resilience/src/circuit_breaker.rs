//! Circuit breaker for failure-prone dependencies.
//!
//! States:
//! - CLOSED: normal operation
//! - OPEN: failing, reject all requests
//! - HALF_OPEN: testing if the dependency has recovered
//!
//! Failures and successes are reported by the caller; the breaker only
//! tracks state. This keeps it usable both for wrapped calls and for
//! condition-driven guards that observe failures out of band.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Failing, reject requests.
    Open,
    /// Testing if recovered.
    HalfOpen,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub name: String,
    /// Failures before opening.
    pub failure_threshold: u64,
    /// Successes before closing from half-open.
    pub success_threshold: u64,
    /// Only failures within this window count as consecutive.
    pub failure_window: Duration,
    /// Time to wait before half-open.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        CircuitBreakerConfig {
            name: "unnamed".into(),
            failure_threshold: 5,
            success_threshold: 3,
            failure_window: Duration::from_secs(60),
            reset_timeout: Duration::from_secs(60),
        }
    }
}

/// Point-in-time breaker statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub failure_count: u64,
    pub success_count: u64,
    pub total_observations: u64,
}

/// Tracks consecutive failures and trips open past the threshold.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: AtomicU8, // 0=Closed, 1=Open, 2=HalfOpen
    failure_count: AtomicU64,
    success_count: AtomicU64,
    total_observations: AtomicU64,
    next_attempt: RwLock<Instant>,
    last_failure: RwLock<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        CircuitBreaker {
            state: AtomicU8::new(0),
            failure_count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            total_observations: AtomicU64::new(0),
            next_attempt: RwLock::new(Instant::now()),
            last_failure: RwLock::new(None),
            config,
        }
    }

    /// Whether a request should be admitted. An open breaker transitions
    /// to half-open once the reset timeout has elapsed.
    pub fn allows_request(&self) -> bool {
        match self.state() {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                if Instant::now() >= *self.next_attempt.read() {
                    self.state.store(2, Ordering::Relaxed);
                    self.success_count.store(0, Ordering::Relaxed);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Reports a successful observation.
    pub fn record_success(&self) {
        self.total_observations.fetch_add(1, Ordering::Relaxed);
        self.failure_count.store(0, Ordering::Relaxed);

        if self.state() == CircuitState::HalfOpen {
            let successes = self.success_count.fetch_add(1, Ordering::Relaxed) + 1;
            if successes >= self.config.success_threshold {
                self.state.store(0, Ordering::Relaxed);
                self.success_count.store(0, Ordering::Relaxed);
                info!(
                    breaker = %self.config.name,
                    successes, "circuit breaker closed"
                );
            }
        }
    }

    /// Reports a failed observation. Failures separated by more than the
    /// failure window reset the consecutive count.
    pub fn record_failure(&self) {
        self.total_observations.fetch_add(1, Ordering::Relaxed);

        let now = Instant::now();
        {
            let mut last = self.last_failure.write();
            if let Some(prev) = *last {
                if now.duration_since(prev) > self.config.failure_window {
                    self.failure_count.store(0, Ordering::Relaxed);
                }
            }
            *last = Some(now);
        }

        let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        if self.state() == CircuitState::HalfOpen || failures >= self.config.failure_threshold {
            self.trip(now);
            warn!(
                breaker = %self.config.name,
                failures, "circuit breaker opened"
            );
        }
    }

    /// Forces the breaker open, for manual intervention.
    pub fn force_open(&self) {
        self.trip(Instant::now());
        warn!(breaker = %self.config.name, "circuit breaker forced open");
    }

    /// Resets the breaker to closed.
    pub fn reset(&self) {
        self.state.store(0, Ordering::Relaxed);
        self.failure_count.store(0, Ordering::Relaxed);
        self.success_count.store(0, Ordering::Relaxed);
        *self.last_failure.write() = None;
        info!(breaker = %self.config.name, "circuit breaker reset");
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn state(&self) -> CircuitState {
        match self.state.load(Ordering::Relaxed) {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        CircuitBreakerStats {
            state: self.state(),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            success_count: self.success_count.load(Ordering::Relaxed),
            total_observations: self.total_observations.load(Ordering::Relaxed),
        }
    }

    fn trip(&self, now: Instant) {
        self.state.store(1, Ordering::Relaxed);
        *self.next_attempt.write() = now + self.config.reset_timeout;
        self.success_count.store(0, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.config.name)
            .field("state", &self.state())
            .field("failure_count", &self.failure_count.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failures: u64) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            name: "test".into(),
            failure_threshold: failures,
            success_threshold: 1,
            ..Default::default()
        })
    }

    #[test]
    fn starts_closed() {
        let cb = breaker(3);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allows_request());
    }

    #[test]
    fn opens_after_threshold_failures() {
        let cb = breaker(2);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allows_request());
    }

    #[test]
    fn success_resets_consecutive_failures() {
        let cb = breaker(2);
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn force_open_and_reset() {
        let cb = breaker(5);
        cb.force_open();
        assert!(cb.is_open());
        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
