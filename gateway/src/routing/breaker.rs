//! Per-endpoint circuit breaker.
//!
//! Implements the standard three-state pattern:
//! - **Closed**: normal operation, calls pass through
//! - **Open**: the endpoint is failing, calls rejected without backend I/O
//! - **HalfOpen**: probe period, a bounded number of trial calls allowed
//!
//! Transitions:
//! - Closed -> Open: when the window holds at least `min_requests` calls and
//!   the failure ratio reaches `failure_ratio`
//! - Open -> HalfOpen: after `open_for` elapses
//! - HalfOpen -> Closed: on a successful probe
//! - HalfOpen -> Open: on a failed probe
//!
//! Only transport errors and 5xx outcomes count as failures here; callers
//! record client-attributable (4xx) outcomes as successes.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

/// Configuration for a circuit breaker.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Minimum calls in the window before the trip predicate applies.
    pub min_requests: u32,
    /// Failure ratio at or above which the breaker opens.
    pub failure_ratio: f64,
    /// Length of the rolling counting window.
    pub window: Duration,
    /// How long an open breaker rejects before probing.
    pub open_for: Duration,
    /// Concurrent trial calls admitted while half-open.
    pub trial_budget: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            min_requests: 3,
            failure_ratio: 0.6,
            window: Duration::from_secs(10),
            open_for: Duration::from_secs(30),
            trial_budget: 3,
        }
    }
}

/// Error returned when the breaker rejects a call without attempting it.
#[derive(Debug, thiserror::Error)]
#[error("circuit breaker is open")]
pub struct BreakerRejected;

struct Inner {
    state: BreakerState,
    window_started: Instant,
    requests: u32,
    failures: u32,
    open_until: Option<Instant>,
    trials_in_flight: u32,
}

/// Thread-safe circuit breaker guarding a single endpoint.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                window_started: Instant::now(),
                requests: 0,
                failures: 0,
                open_until: None,
                trials_in_flight: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Admit a call, or fail fast.
    ///
    /// Every admitted call must be answered with exactly one
    /// `record_success` or `record_failure`.
    pub fn try_acquire(&self) -> Result<(), BreakerRejected> {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                let expired = inner
                    .open_until
                    .map(|until| Instant::now() >= until)
                    .unwrap_or(true);
                if expired {
                    inner.state = BreakerState::HalfOpen;
                    inner.trials_in_flight = 1;
                    Ok(())
                } else {
                    Err(BreakerRejected)
                }
            }
            BreakerState::HalfOpen => {
                if inner.trials_in_flight < self.config.trial_budget {
                    inner.trials_in_flight += 1;
                    Ok(())
                } else {
                    Err(BreakerRejected)
                }
            }
        }
    }

    /// Record a successful call (or a client-attributable failure).
    pub fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => {
                self.roll_window(&mut inner);
                inner.requests += 1;
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Closed;
                inner.trials_in_flight = 0;
                inner.requests = 0;
                inner.failures = 0;
                inner.window_started = Instant::now();
                inner.open_until = None;
            }
            // A stale result arriving after the breaker re-opened.
            BreakerState::Open => {}
        }
    }

    /// Record a transport error or 5xx outcome.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => {
                self.roll_window(&mut inner);
                inner.requests += 1;
                inner.failures += 1;
                if inner.requests >= self.config.min_requests {
                    let ratio = inner.failures as f64 / inner.requests as f64;
                    if ratio >= self.config.failure_ratio {
                        inner.state = BreakerState::Open;
                        inner.open_until = Some(Instant::now() + self.config.open_for);
                    }
                }
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.open_until = Some(Instant::now() + self.config.open_for);
                inner.trials_in_flight = 0;
            }
            BreakerState::Open => {}
        }
    }

    /// Current state snapshot, without side effects.
    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    fn roll_window(&self, inner: &mut Inner) {
        if inner.window_started.elapsed() >= self.config.window {
            inner.window_started = Instant::now();
            inner.requests = 0;
            inner.failures = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> BreakerConfig {
        BreakerConfig {
            min_requests: 3,
            failure_ratio: 0.6,
            window: Duration::from_secs(10),
            open_for: Duration::from_millis(20),
            trial_budget: 3,
        }
    }

    fn fail_once(cb: &CircuitBreaker) {
        cb.try_acquire().unwrap();
        cb.record_failure();
    }

    #[test]
    fn test_starts_closed() {
        let cb = CircuitBreaker::new(BreakerConfig::default());
        assert_eq!(cb.state(), BreakerState::Closed);
        assert!(cb.try_acquire().is_ok());
    }

    #[test]
    fn test_opens_when_trip_predicate_satisfied() {
        let cb = CircuitBreaker::new(quick_config());

        fail_once(&cb);
        fail_once(&cb);
        assert_eq!(cb.state(), BreakerState::Closed);

        fail_once(&cb);
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(cb.try_acquire().is_err());
    }

    #[test]
    fn test_below_min_requests_never_trips() {
        let cb = CircuitBreaker::new(quick_config());
        fail_once(&cb);
        fail_once(&cb);
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn test_failure_ratio_below_threshold_stays_closed() {
        let cb = CircuitBreaker::new(quick_config());

        // 2 failures out of 4 calls is a 0.5 ratio, under the 0.6 threshold.
        fail_once(&cb);
        cb.try_acquire().unwrap();
        cb.record_success();
        fail_once(&cb);
        cb.try_acquire().unwrap();
        cb.record_success();

        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn test_half_open_after_open_duration() {
        let cb = CircuitBreaker::new(quick_config());
        fail_once(&cb);
        fail_once(&cb);
        fail_once(&cb);
        assert!(cb.try_acquire().is_err());

        std::thread::sleep(Duration::from_millis(25));
        assert!(cb.try_acquire().is_ok());
        assert_eq!(cb.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn test_half_open_admits_at_most_trial_budget() {
        let cb = CircuitBreaker::new(quick_config());
        fail_once(&cb);
        fail_once(&cb);
        fail_once(&cb);
        std::thread::sleep(Duration::from_millis(25));

        // Budget is 3; the first acquire performs the half-open transition.
        assert!(cb.try_acquire().is_ok());
        assert!(cb.try_acquire().is_ok());
        assert!(cb.try_acquire().is_ok());
        assert!(cb.try_acquire().is_err());
    }

    #[test]
    fn test_half_open_success_closes_and_resets() {
        let cb = CircuitBreaker::new(quick_config());
        fail_once(&cb);
        fail_once(&cb);
        fail_once(&cb);
        std::thread::sleep(Duration::from_millis(25));

        cb.try_acquire().unwrap();
        cb.record_success();
        assert_eq!(cb.state(), BreakerState::Closed);

        // Counters were reset; two fresh failures must not re-open.
        fail_once(&cb);
        fail_once(&cb);
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let cb = CircuitBreaker::new(quick_config());
        fail_once(&cb);
        fail_once(&cb);
        fail_once(&cb);
        std::thread::sleep(Duration::from_millis(25));

        cb.try_acquire().unwrap();
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(cb.try_acquire().is_err());
    }

    #[test]
    fn test_window_roll_discards_old_counts() {
        let cb = CircuitBreaker::new(BreakerConfig {
            window: Duration::from_millis(10),
            ..quick_config()
        });

        fail_once(&cb);
        fail_once(&cb);
        std::thread::sleep(Duration::from_millis(15));

        // Old failures rolled out of the window, so this is 1 of 1.
        fail_once(&cb);
        assert_eq!(cb.state(), BreakerState::Closed);
    }
}
