//! Keyed sliding-window attempt limiter used at the request boundary.
//!
//! Each key keeps the instants of its recent attempts. An attempt is allowed
//! while fewer than `max_attempts` of them fall inside the trailing window.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use log::debug;

use crate::config::RateLimitConfig;

pub struct SlidingWindowLimiter {
    window: Duration,
    max_attempts: usize,
    attempts: HashMap<String, VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_limits(config.max_attempts, config.window())
    }

    pub fn with_limits(max_attempts: u32, window: Duration) -> Self {
        Self {
            window,
            max_attempts: max_attempts.max(1) as usize,
            attempts: HashMap::new(),
        }
    }

    /// Records an attempt for `key` if the window has room. Returns whether it was allowed.
    pub fn try_consume(&mut self, key: &str, now: Instant) -> bool {
        let window = self.window;
        let entries = self.attempts.entry(key.to_string()).or_default();
        while entries
            .front()
            .is_some_and(|attempt| now.saturating_duration_since(*attempt) >= window)
        {
            entries.pop_front();
        }
        if entries.len() >= self.max_attempts {
            debug!("SlidingWindowLimiter: key '{}' over limit", key);
            return false;
        }
        entries.push_back(now);
        true
    }

    /// Whether an attempt would be allowed right now. Does not record anything.
    pub fn check(&self, key: &str, now: Instant) -> bool {
        self.live_attempts(key, now).count() < self.max_attempts
    }

    /// Oldest attempt still inside the window, i.e. the one whose expiry frees a slot next.
    pub fn oldest_attempt(&self, key: &str, now: Instant) -> Option<Instant> {
        self.live_attempts(key, now).next()
    }

    /// Drops expired attempts and forgets keys with none left.
    pub fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.attempts.retain(|_, entries| {
            entries.retain(|attempt| now.saturating_duration_since(*attempt) < window);
            !entries.is_empty()
        });
    }

    pub fn tracked_keys(&self) -> usize {
        self.attempts.len()
    }

    fn live_attempts<'a>(&'a self, key: &str, now: Instant) -> impl Iterator<Item = Instant> + 'a {
        let window = self.window;
        self.attempts
            .get(key)
            .into_iter()
            .flatten()
            .copied()
            .filter(move |attempt| now.saturating_duration_since(*attempt) < window)
    }
}

#[cfg(test)]
mod tests {
    use super::SlidingWindowLimiter;
    use std::time::{Duration, Instant};

    #[test]
    fn test_try_consume_allows_up_to_limit_inside_window() {
        let base = Instant::now();
        let mut limiter = SlidingWindowLimiter::with_limits(3, Duration::from_secs(60));

        assert!(limiter.try_consume("client-a", base));
        assert!(limiter.try_consume("client-a", base + Duration::from_secs(1)));
        assert!(limiter.try_consume("client-a", base + Duration::from_secs(2)));
        assert!(!limiter.try_consume("client-a", base + Duration::from_secs(3)));
    }

    #[test]
    fn test_keys_are_independent() {
        let base = Instant::now();
        let mut limiter = SlidingWindowLimiter::with_limits(1, Duration::from_secs(60));

        assert!(limiter.try_consume("client-a", base));
        assert!(!limiter.check("client-a", base));
        assert!(limiter.check("client-b", base));
        assert!(limiter.try_consume("client-b", base));
    }

    #[test]
    fn test_check_does_not_record_attempts() {
        let base = Instant::now();
        let limiter = SlidingWindowLimiter::with_limits(1, Duration::from_secs(60));

        assert!(limiter.check("client-a", base));
        assert!(limiter.check("client-a", base));
        assert!(limiter.oldest_attempt("client-a", base).is_none());
    }

    #[test]
    fn test_attempts_expire_after_window() {
        let base = Instant::now();
        let mut limiter = SlidingWindowLimiter::with_limits(2, Duration::from_secs(10));
        limiter.try_consume("client-a", base);
        limiter.try_consume("client-a", base + Duration::from_secs(4));
        assert!(!limiter.check("client-a", base + Duration::from_secs(5)));

        let later = base + Duration::from_secs(10);
        assert_eq!(
            limiter.oldest_attempt("client-a", later),
            Some(base + Duration::from_secs(4))
        );
        assert!(limiter.check("client-a", later));
        assert!(limiter.try_consume("client-a", later));
    }

    #[test]
    fn test_prune_forgets_idle_keys() {
        let base = Instant::now();
        let mut limiter = SlidingWindowLimiter::with_limits(2, Duration::from_secs(10));
        limiter.try_consume("client-a", base);
        limiter.try_consume("client-b", base + Duration::from_secs(8));

        limiter.prune(base + Duration::from_secs(12));

        assert_eq!(limiter.tracked_keys(), 1);
        assert_eq!(limiter.oldest_attempt("client-a", base + Duration::from_secs(12)), None);
    }
}
