//! Callback registry with per-listener panic isolation.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub struct ListenerRegistry<T> {
    name: &'static str,
    next_id: AtomicU64,
    entries: Mutex<Vec<(ListenerId, Callback<T>)>>,
}

impl<T> ListenerRegistry<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(callback)));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every listener registered at call time.
    ///
    /// A panicking listener is logged and skipped. Returns the number of
    /// listeners that panicked.
    pub fn emit(&self, event: &T) -> usize {
        let snapshot: Vec<(ListenerId, Callback<T>)> = self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let mut failures = 0;
        for (id, callback) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                failures += 1;
                tracing::warn!(
                    registry = self.name,
                    listener = id.0,
                    "listener panicked; continuing with remaining listeners"
                );
            }
        }
        failures
    }
}
