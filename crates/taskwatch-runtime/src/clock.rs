//! Injectable time source.
//!
//! Engine timestamps are epoch milliseconds. [`SystemClock`] derives them
//! from a tokio [`Instant`] anchored once to wall-clock time, so tests running
//! with paused tokio time see the clock advance with `tokio::time::advance`.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::time::Instant;

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Clone)]
pub struct SystemClock {
    anchor: Instant,
    anchor_ms: u64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::starting_at(u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0))
    }

    /// A clock that reads `epoch_ms` right now and advances with tokio time.
    pub fn starting_at(epoch_ms: u64) -> Self {
        Self {
            anchor: Instant::now(),
            anchor_ms: epoch_ms,
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        let elapsed = u64::try_from(self.anchor.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.anchor_ms.saturating_add(elapsed)
    }
}

/// Hand-driven clock for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
