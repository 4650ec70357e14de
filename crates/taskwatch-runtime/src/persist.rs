//! Persistence actor: a single writer task that stores snapshots in commit
//! order, retrying each write a bounded number of times.
//!
//! The in-memory state is authoritative. A failed write never rolls it back;
//! the durable copy simply lags until the next successful write.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use taskwatch_core::AggregateState;
use taskwatch_core::snapshot;

use crate::error::EngineError;
use crate::store::SnapshotStore;

/// Fixed-delay retry policy for snapshot writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Write `text` to `store`, retrying per `policy`.
pub async fn write_with_retry(
    store: &Arc<dyn SnapshotStore>,
    policy: RetryPolicy,
    text: &str,
) -> Result<(), EngineError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let store = Arc::clone(store);
        let payload = text.to_owned();
        match tokio::task::spawn_blocking(move || store.write(&payload)).await? {
            Ok(()) => {
                if attempt > 1 {
                    tracing::info!(attempt, "snapshot write succeeded after retry");
                }
                return Ok(());
            }
            Err(source) if attempt >= max_attempts => {
                tracing::error!(attempts = attempt, error = %source, "snapshot write failed, giving up");
                return Err(EngineError::Persist {
                    attempts: attempt,
                    source,
                });
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "snapshot write failed, retrying");
                tokio::time::sleep(policy.delay).await;
            }
        }
    }
}

struct PersistJob {
    text: String,
    reply: oneshot::Sender<Result<(), EngineError>>,
}

/// Receipt for an enqueued write.
pub struct PersistTicket(oneshot::Receiver<Result<(), EngineError>>);

impl PersistTicket {
    /// Wait for the write (and its retries) to finish.
    pub async fn wait(self) -> Result<(), EngineError> {
        self.0.await.unwrap_or(Err(EngineError::Disposed))
    }
}

pub struct Persister {
    tx: Mutex<Option<mpsc::UnboundedSender<PersistJob>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Persister {
    pub fn spawn(store: Arc<dyn SnapshotStore>, policy: RetryPolicy) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<PersistJob>();
        let task = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let result = write_with_retry(&store, policy, &job.text).await;
                // The committer may have stopped waiting; the write still happened.
                let _ = job.reply.send(result);
            }
        });
        Self {
            tx: Mutex::new(Some(tx)),
            task: Mutex::new(Some(task)),
        }
    }

    /// Queue a snapshot of `state`. Writes happen in enqueue order.
    pub fn enqueue(&self, state: &AggregateState) -> Result<PersistTicket, EngineError> {
        let text = snapshot::encode(state)?;
        let (reply, rx) = oneshot::channel();
        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        let tx = guard.as_ref().ok_or(EngineError::Disposed)?;
        tx.send(PersistJob { text, reply })
            .map_err(|_| EngineError::Disposed)?;
        Ok(PersistTicket(rx))
    }

    /// Stop accepting writes and wait for queued ones to drain.
    pub async fn close(&self) {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "persistence task ended abnormally");
            }
        }
    }
}

impl Drop for Persister {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn quick() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(10),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let mem = Arc::new(MemoryStore::new());
        mem.fail_next_writes(2);
        let store: Arc<dyn SnapshotStore> = mem.clone();

        write_with_retry(&store, quick(), "{}").await.expect("third attempt succeeds");
        assert_eq!(mem.write_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_surface_an_error() {
        let mem = Arc::new(MemoryStore::new());
        mem.fail_next_writes(3);
        let store: Arc<dyn SnapshotStore> = mem.clone();

        let err = write_with_retry(&store, quick(), "{}").await.expect_err("all attempts fail");
        assert!(matches!(err, EngineError::Persist { attempts: 3, .. }));
        assert!(mem.contents().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn persister_writes_in_order_and_rejects_after_close() {
        let mem = Arc::new(MemoryStore::new());
        let persister = Persister::spawn(mem.clone(), quick());

        let first = AggregateState::with_debounce_ms(1_000);
        let second = AggregateState::with_debounce_ms(2_000);
        let t1 = persister.enqueue(&first).expect("enqueue");
        let t2 = persister.enqueue(&second).expect("enqueue");
        t1.wait().await.expect("first write");
        t2.wait().await.expect("second write");

        let stored = snapshot::decode(&mem.contents().expect("stored")).expect("decode");
        assert_eq!(stored, second);

        persister.close().await;
        assert!(matches!(persister.enqueue(&first), Err(EngineError::Disposed)));
    }
}
