//! Per-connection sliding-window rate limiter
//!
//! Each connection id owns a window record {count, reset_at}. The first
//! admission in a lapsed or missing window resets it and counts as
//! message #1; rejections never mutate the record. `remaining` is a pure
//! read.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::types::ClientId;

/// Default quota: 50 messages per 60 s window per connection
pub const DEFAULT_RATE_LIMIT_MAX: u32 = 50;
pub const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_millis(60_000);

/// One connection's quota window
#[derive(Debug)]
struct RateWindow {
    count: u32,
    reset_at: Instant,
}

/// Sliding-window-by-reset message quota, keyed by connection id
#[derive(Debug)]
pub struct RateLimiter {
    windows: HashMap<ClientId, RateWindow>,
    max_messages: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_messages: u32, window: Duration) -> Self {
        Self {
            windows: HashMap::new(),
            max_messages,
            window,
        }
    }

    /// Admit or reject one message for `key`; admission consumes a slot
    pub fn try_admit(&mut self, key: ClientId) -> bool {
        self.admit_at(key, Instant::now())
    }

    /// Remaining quota for `key` in its live window (pure read)
    pub fn remaining(&self, key: ClientId) -> u32 {
        self.remaining_at(key, Instant::now())
    }

    /// Drop the window record for a departed connection
    pub fn forget(&mut self, key: ClientId) {
        self.windows.remove(&key);
    }

    /// Number of live window records (stats)
    pub fn active_windows(&self) -> usize {
        self.windows.len()
    }

    fn admit_at(&mut self, key: ClientId, now: Instant) -> bool {
        match self.windows.get_mut(&key) {
            Some(window) if now < window.reset_at => {
                if window.count >= self.max_messages {
                    return false;
                }
                window.count += 1;
                true
            }
            _ => {
                // Missing or lapsed window: reset, this call is message #1
                self.windows.insert(
                    key,
                    RateWindow {
                        count: 1,
                        reset_at: now + self.window,
                    },
                );
                true
            }
        }
    }

    fn remaining_at(&self, key: ClientId, now: Instant) -> u32 {
        match self.windows.get(&key) {
            Some(window) if now < window.reset_at => {
                self.max_messages.saturating_sub(window.count)
            }
            _ => self.max_messages,
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_LIMIT_MAX, DEFAULT_RATE_LIMIT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admits_up_to_max_then_rejects() {
        let mut limiter = RateLimiter::new(50, Duration::from_millis(60_000));
        let key = ClientId::new();
        let now = Instant::now();

        for _ in 0..50 {
            assert!(limiter.admit_at(key, now));
        }
        assert!(!limiter.admit_at(key, now));
        assert_eq!(limiter.remaining_at(key, now), 0);
    }

    #[test]
    fn test_window_lapse_resets_quota() {
        let mut limiter = RateLimiter::new(2, Duration::from_millis(1_000));
        let key = ClientId::new();
        let now = Instant::now();

        assert!(limiter.admit_at(key, now));
        assert!(limiter.admit_at(key, now));
        assert!(!limiter.admit_at(key, now));

        let later = now + Duration::from_millis(1_001);
        assert!(limiter.admit_at(key, later));
        // The reset admission counted as message #1
        assert_eq!(limiter.remaining_at(key, later), 1);
    }

    #[test]
    fn test_rejection_does_not_mutate() {
        let mut limiter = RateLimiter::new(1, Duration::from_millis(60_000));
        let key = ClientId::new();
        let now = Instant::now();

        assert!(limiter.admit_at(key, now));
        assert!(!limiter.admit_at(key, now));
        assert!(!limiter.admit_at(key, now));
        assert_eq!(limiter.remaining_at(key, now), 0);
    }

    #[test]
    fn test_remaining_without_record_is_max() {
        let limiter = RateLimiter::new(50, Duration::from_millis(60_000));
        assert_eq!(limiter.remaining(ClientId::new()), 50);
    }

    #[test]
    fn test_keys_are_independent() {
        let mut limiter = RateLimiter::new(1, Duration::from_millis(60_000));
        let a = ClientId::new();
        let b = ClientId::new();
        let now = Instant::now();

        assert!(limiter.admit_at(a, now));
        assert!(!limiter.admit_at(a, now));
        assert!(limiter.admit_at(b, now));
    }

    #[test]
    fn test_forget_drops_record() {
        let mut limiter = RateLimiter::new(1, Duration::from_millis(60_000));
        let key = ClientId::new();
        assert!(limiter.try_admit(key));
        assert_eq!(limiter.active_windows(), 1);
        limiter.forget(key);
        assert_eq!(limiter.active_windows(), 0);
        assert!(limiter.try_admit(key));
    }
}
