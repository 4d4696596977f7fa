//! Consecutive-failure lockout for privileged identities.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use log::warn;

use crate::config::LockoutConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockoutStatus {
    /// Not locked; `failures` consecutive failures counted so far.
    Open { failures: u32 },
    Locked { until: Instant },
}

#[derive(Debug, Clone, Copy, Default)]
struct LockoutEntry {
    failures: u32,
    locked_until: Option<Instant>,
}

pub struct AdminLockout {
    failure_threshold: u32,
    lock_duration: Duration,
    entries: HashMap<String, LockoutEntry>,
}

impl AdminLockout {
    pub fn new(config: &LockoutConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            lock_duration: config.lock_duration(),
            entries: HashMap::new(),
        }
    }

    /// Counts a failure. Failures while locked do not extend the lock.
    pub fn record_failure(&mut self, identity: &str, now: Instant) -> LockoutStatus {
        let entry = self.entries.entry(identity.to_string()).or_default();
        match entry.locked_until {
            Some(until) if now < until => return LockoutStatus::Locked { until },
            Some(_) => *entry = LockoutEntry::default(),
            None => {}
        }

        entry.failures = entry.failures.saturating_add(1);
        if entry.failures < self.failure_threshold {
            return LockoutStatus::Open {
                failures: entry.failures,
            };
        }

        let until = now + self.lock_duration;
        warn!(
            "AdminLockout: '{}' locked for {}s after {} consecutive failures",
            identity,
            self.lock_duration.as_secs(),
            entry.failures
        );
        entry.failures = 0;
        entry.locked_until = Some(until);
        LockoutStatus::Locked { until }
    }

    /// Clears the failure counter.
    pub fn record_success(&mut self, identity: &str) {
        self.entries.remove(identity);
    }

    pub fn is_locked(&self, identity: &str, now: Instant) -> bool {
        self.remaining_lock(identity, now).is_some()
    }

    pub fn remaining_lock(&self, identity: &str, now: Instant) -> Option<Duration> {
        let until = self.entries.get(identity)?.locked_until?;
        (now < until).then(|| until - now)
    }

    pub fn status(&self, identity: &str, now: Instant) -> LockoutStatus {
        match self.entries.get(identity) {
            Some(LockoutEntry {
                locked_until: Some(until),
                ..
            }) if now < *until => LockoutStatus::Locked { until: *until },
            Some(LockoutEntry {
                locked_until: None,
                failures,
            }) => LockoutStatus::Open {
                failures: *failures,
            },
            _ => LockoutStatus::Open { failures: 0 },
        }
    }
}
