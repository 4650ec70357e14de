//! Cancellable, idempotent one-shot timer keyed by an absolute deadline.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

struct Armed {
    deadline_ms: u64,
    handle: JoinHandle<()>,
}

/// At most one pending callback. Dropping the timer aborts it.
#[derive(Default)]
pub struct DebounceTimer {
    armed: Option<Armed>,
}

impl DebounceTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `on_fire` to run at `deadline_ms`.
    ///
    /// Re-arming with the current deadline is a no-op and returns `false`;
    /// any other deadline aborts the previous task and replaces it.
    pub fn arm<F>(&mut self, deadline_ms: u64, now_ms: u64, on_fire: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.deadline() == Some(deadline_ms) {
            return false;
        }
        self.cancel();

        let delay = Duration::from_millis(deadline_ms.saturating_sub(now_ms));
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire.await;
        });
        self.armed = Some(Armed {
            deadline_ms,
            handle,
        });
        true
    }

    /// Abort the pending callback, if any.
    pub fn cancel(&mut self) {
        if let Some(armed) = self.armed.take() {
            armed.handle.abort();
        }
    }

    /// Forget the pending task without aborting it.
    ///
    /// Called from inside the firing callback so the callback does not abort
    /// itself when it later re-evaluates the timer.
    pub fn release(&mut self, deadline_ms: u64) -> bool {
        if self.deadline() == Some(deadline_ms) {
            self.armed = None;
            true
        } else {
            false
        }
    }

    pub fn deadline(&self) -> Option<u64> {
        self.armed.as_ref().map(|a| a.deadline_ms)
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
