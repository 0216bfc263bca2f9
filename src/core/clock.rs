//! Time sources.
//!
//! Staleness, sequencer grace periods and fee decay are threshold checks
//! against this clock; nothing in the core ever sleeps.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

/// Source of the current unix time in seconds
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current unix timestamp
    fn now(&self) -> u64;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        Utc::now().timestamp().max(0) as u64
    }
}

/// Manually driven clock for simulations and tests.
///
/// Never moves backwards: `set` to an earlier time is ignored.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Start at `timestamp`
    pub fn new(timestamp: u64) -> Self {
        Self {
            now: AtomicU64::new(timestamp),
        }
    }

    /// Jump to `timestamp` if it is not in the past
    pub fn set(&self, timestamp: u64) {
        self.now.fetch_max(timestamp, Ordering::SeqCst);
    }

    /// Advance by `seconds`
    pub fn advance(&self, seconds: u64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
