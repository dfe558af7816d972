//! Per-principal request throttling.
//!
//! A fixed-window counter keyed by the authenticated principal (or the
//! fallback network identity). Each window grants `limit` requests; the
//! decision carries everything the caller needs to emit the
//! `X-RateLimit-*` headers.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Utc;

/// Outcome of a throttle check for one request.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Unix epoch seconds at which the current window resets.
    pub reset_epoch: i64,
}

struct Window {
    started: Instant,
    reset_epoch: i64,
    count: u32,
}

/// In-process token-bucket limiter.
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

// Stale windows are swept once the map grows past this many principals.
const PRUNE_THRESHOLD: usize = 1024;

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Count one request against the principal's budget and decide.
    pub fn check(&self, principal: &str) -> RateLimitDecision {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());

        if windows.len() > PRUNE_THRESHOLD {
            let window = self.window;
            windows.retain(|_, w| w.started.elapsed() < window);
        }

        let window = windows.entry(principal.to_string()).or_insert_with(|| Window {
            started: now,
            reset_epoch: Utc::now().timestamp() + self.window.as_secs() as i64,
            count: 0,
        });

        if window.started.elapsed() >= self.window {
            window.started = now;
            window.reset_epoch = Utc::now().timestamp() + self.window.as_secs() as i64;
            window.count = 0;
        }

        window.count += 1;

        RateLimitDecision {
            allowed: window.count <= self.limit,
            limit: self.limit,
            remaining: self.limit.saturating_sub(window.count),
            reset_epoch: window.reset_epoch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_up_to_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));

        for i in 0..3 {
            let decision = limiter.check("alice");
            assert!(decision.allowed, "request {} should be admitted", i + 1);
        }

        let decision = limiter.check("alice");
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert!(decision.reset_epoch > Utc::now().timestamp() - 1);
    }

    #[test]
    fn test_remaining_counts_down() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));

        assert_eq!(limiter.check("alice").remaining, 2);
        assert_eq!(limiter.check("alice").remaining, 1);
        assert_eq!(limiter.check("alice").remaining, 0);
    }

    #[test]
    fn test_principals_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));

        assert!(limiter.check("alice").allowed);
        assert!(!limiter.check("alice").allowed);
        assert!(limiter.check("bob").allowed);
    }

    #[test]
    fn test_window_expiry_resets_budget() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));

        assert!(limiter.check("alice").allowed);
        assert!(!limiter.check("alice").allowed);

        std::thread::sleep(Duration::from_millis(25));
        assert!(limiter.check("alice").allowed);
    }
}
