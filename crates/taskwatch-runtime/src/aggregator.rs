//! The aggregation engine.
//!
//! [`Aggregator`] owns the one [`AggregateState`] and is the only place it is
//! mutated. Every operation runs as a transaction under a single async mutex:
//! clone the committed state, compute the next state synchronously,
//! re-derive the total, and, if anything changed, swap it in, queue the
//! durable write, and notify listeners, all before the lock is released.
//! Only the wait for the write outcome happens after the lock is dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;

use taskwatch_core::canonical::Canonicalizer;
use taskwatch_core::debounce::{self, IdlePhase};
use taskwatch_core::event::{ChangeEvent, ChangeReason, IdleSettled};
use taskwatch_core::heartbeat;
use taskwatch_core::snapshot;
use taskwatch_core::tabs;
use taskwatch_core::types::{AggregateState, TabId, TabPing, TabUpdate};

use crate::clock::Clock;
use crate::config::{EngineConfig, Settings};
use crate::error::EngineError;
use crate::listeners::{ListenerId, ListenerRegistry};
use crate::persist::{PersistTicket, Persister};
use crate::store::SnapshotStore;
use crate::timer::DebounceTimer;

struct Core {
    state: AggregateState,
    timer: DebounceTimer,
}

struct Inner {
    canon: Canonicalizer,
    settings: Settings,
    clock: Arc<dyn Clock>,
    store: Arc<dyn SnapshotStore>,
    persister: Persister,
    core: Mutex<Core>,
    change_listeners: ListenerRegistry<ChangeEvent>,
    idle_listeners: ListenerRegistry<IdleSettled>,
    disposed: AtomicBool,
}

/// Cheaply cloneable handle to the engine.
#[derive(Clone)]
pub struct Aggregator {
    inner: Arc<Inner>,
}

/// How the initial state was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Empty,
    Restored,
    Repaired,
    Recovered,
}

impl Aggregator {
    /// Build an engine around `store`. Must be called inside a tokio runtime.
    ///
    /// The engine starts empty; call [`Aggregator::init`] to load the
    /// persisted snapshot.
    pub fn new(config: EngineConfig, store: Arc<dyn SnapshotStore>, clock: Arc<dyn Clock>) -> Self {
        let persister = Persister::spawn(Arc::clone(&store), config.retry);
        Self {
            inner: Arc::new(Inner {
                canon: Canonicalizer::new(&config.routes),
                settings: config.settings,
                clock,
                store,
                persister,
                core: Mutex::new(Core {
                    state: AggregateState::with_debounce_ms(config.settings.debounce_ms),
                    timer: DebounceTimer::new(),
                }),
                change_listeners: ListenerRegistry::new("change"),
                idle_listeners: ListenerRegistry::new("idle"),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    // ─── Lifecycle ───────────────────────────────────────────────

    /// Load the persisted snapshot and publish it with reason `init`.
    ///
    /// A corrupt snapshot is replaced by the empty default, which is written
    /// back immediately. An idle window that was open when the snapshot was
    /// taken is re-armed, and settles at once if already overdue.
    pub async fn init(&self) -> Result<LoadOutcome, EngineError> {
        let (loaded, outcome) = self.load_initial().await?;
        let settings = self.inner.settings;
        self.transact(ChangeReason::Init, None, true, move |state, _now| {
            *state = loaded;
            state.debounce = debounce::reconfigure(state.debounce, settings.debounce_ms);
            Vec::new()
        })
        .await?;
        tracing::info!(outcome = ?outcome, "engine initialized");
        Ok(outcome)
    }

    async fn load_initial(&self) -> Result<(AggregateState, LoadOutcome), EngineError> {
        let store = Arc::clone(&self.inner.store);
        let read = tokio::task::spawn_blocking(move || store.read()).await?;

        let text = match read {
            Ok(Some(text)) => text,
            Ok(None) => return Ok((AggregateState::default(), LoadOutcome::Empty)),
            Err(e) => {
                tracing::warn!(error = %e, "snapshot unreadable, starting from empty state");
                return Ok((AggregateState::default(), LoadOutcome::Recovered));
            }
        };

        match snapshot::decode(&text) {
            Ok(mut state) => {
                let report = snapshot::repair(&mut state, &self.inner.canon);
                if report.is_clean() {
                    Ok((state, LoadOutcome::Restored))
                } else {
                    tracing::warn!(
                        evicted = ?report.evicted,
                        total_mismatch = ?report.total_mismatch,
                        "snapshot repaired on load"
                    );
                    Ok((state, LoadOutcome::Repaired))
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "corrupt snapshot, falling back to empty state");
                Ok((AggregateState::default(), LoadOutcome::Recovered))
            }
        }
    }

    /// Stop timers and flush queued writes. Later mutations fail with
    /// [`EngineError::Disposed`].
    pub async fn shutdown(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.core.lock().await.timer.cancel();
        self.inner.persister.close().await;
        tracing::info!("engine shut down");
    }

    fn ensure_live(&self) -> Result<(), EngineError> {
        if self.inner.disposed.load(Ordering::SeqCst) {
            Err(EngineError::Disposed)
        } else {
            Ok(())
        }
    }

    // ─── Mutations ───────────────────────────────────────────────

    /// Apply a tab content update. Returns whether anything changed.
    pub async fn handle_tab_update(&self, update: TabUpdate) -> Result<bool, EngineError> {
        let reason = if self.inner.canon.classify(&update.origin).is_trackable() {
            ChangeReason::TasksUpdate
        } else {
            ChangeReason::TabNavigated
        };
        let canon = self.inner.canon.clone();
        let tab_id = update.tab_id;
        let (event, _) = self
            .transact(reason, Some(tab_id), false, move |state, _now| {
                tabs::apply_update(state, &canon, &update);
                Vec::new()
            })
            .await?;
        Ok(event.is_some())
    }

    /// Apply a tab heartbeat. Returns whether anything changed.
    pub async fn handle_tab_heartbeat(&self, ping: TabPing) -> Result<bool, EngineError> {
        let reason = if self.inner.canon.classify(&ping.origin).is_trackable() {
            ChangeReason::Heartbeat
        } else {
            ChangeReason::TabNavigated
        };
        let canon = self.inner.canon.clone();
        let tab_id = ping.tab_id;
        let (event, _) = self
            .transact(reason, Some(tab_id), false, move |state, _now| {
                tabs::apply_ping(state, &canon, &ping);
                Vec::new()
            })
            .await?;
        Ok(event.is_some())
    }

    /// Forget a closed tab. Unknown ids are a silent no-op.
    pub async fn handle_tab_removed(&self, tab_id: TabId) -> Result<bool, EngineError> {
        self.drop_tab(ChangeReason::TabRemoved, tab_id).await
    }

    /// Forget a tab that left qualifying pages. Unknown ids are a silent no-op.
    pub async fn handle_tab_navigated_away(&self, tab_id: TabId) -> Result<bool, EngineError> {
        self.drop_tab(ChangeReason::TabNavigated, tab_id).await
    }

    async fn drop_tab(&self, reason: ChangeReason, tab_id: TabId) -> Result<bool, EngineError> {
        let (event, _) = self
            .transact(reason, Some(tab_id), false, move |state, _now| {
                tabs::remove(state, tab_id);
                Vec::new()
            })
            .await?;
        Ok(event.is_some())
    }

    /// Flag tabs whose heartbeat is overdue as of `now_ms` and return them.
    pub async fn evaluate_heartbeat_statuses(&self, now_ms: u64) -> Result<Vec<TabId>, EngineError> {
        let (_, stale) = self
            .transact(ChangeReason::HeartbeatStale, None, false, move |state, _now| {
                heartbeat::evaluate(&mut state.tabs, now_ms)
            })
            .await?;
        Ok(stale)
    }

    /// Apply new settings. An open idle window keeps its anchor; only its
    /// deadline moves.
    pub async fn update_settings(&self, settings: Settings) -> Result<bool, EngineError> {
        let (event, _) = self
            .transact(ChangeReason::SettingsUpdated, None, false, move |state, _now| {
                state.debounce = debounce::reconfigure(state.debounce, settings.debounce_ms);
                Vec::new()
            })
            .await?;
        Ok(event.is_some())
    }

    // ─── Reads ───────────────────────────────────────────────────

    /// Deep copy of the committed state.
    pub async fn snapshot(&self) -> AggregateState {
        self.inner.core.lock().await.state.clone()
    }

    pub async fn tracked_tab_ids(&self) -> Vec<TabId> {
        self.inner.core.lock().await.state.tab_ids()
    }

    pub async fn idle_phase(&self) -> IdlePhase {
        let core = self.inner.core.lock().await;
        debounce::phase(core.state.last_total, core.state.debounce)
    }

    // ─── Subscriptions ───────────────────────────────────────────

    /// Called after every committed mutation, in commit order. Listeners run
    /// while the engine is locked and must not block.
    pub fn on_change(&self, listener: impl Fn(&ChangeEvent) + Send + Sync + 'static) -> ListenerId {
        self.inner.change_listeners.subscribe(listener)
    }

    /// Called once per settled idle episode.
    pub fn on_idle_settled(
        &self,
        listener: impl Fn(&IdleSettled) + Send + Sync + 'static,
    ) -> ListenerId {
        self.inner.idle_listeners.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inner.change_listeners.unsubscribe(id) || self.inner.idle_listeners.unsubscribe(id)
    }

    // ─── Transaction core ────────────────────────────────────────

    /// Run one serialized compute-and-commit.
    ///
    /// `mutate` edits a working copy and returns the stale tab ids to attach
    /// to the event. Unless `force` is set, a transaction that leaves the
    /// state unchanged is dropped without a write or an event.
    async fn transact<F>(
        &self,
        reason: ChangeReason,
        tab_id: Option<TabId>,
        force: bool,
        mutate: F,
    ) -> Result<(Option<ChangeEvent>, Vec<TabId>), EngineError>
    where
        F: FnOnce(&mut AggregateState, u64) -> Vec<TabId>,
    {
        self.ensure_live()?;
        let mut core = self.inner.core.lock().await;
        let now = self.inner.clock.now_ms();

        let previous = core.state.clone();
        let mut next = previous.clone();
        let stale = mutate(&mut next, now);
        tabs::recompute(&mut next, &self.inner.canon, now);

        if next == previous && !force {
            tracing::debug!(%reason, tab_id, "no-op mutation suppressed");
            return Ok((None, stale));
        }

        core.state = next.clone();
        let mut tickets = vec![self.inner.persister.enqueue(&next)];

        tracing::debug!(
            %reason,
            tab_id,
            total = next.last_total,
            tabs = next.tabs.len(),
            since = next.debounce.since,
            "committed"
        );
        let event = ChangeEvent {
            reason,
            previous,
            current: next,
            tab_id,
            stale_tab_ids: stale.clone(),
        };
        self.inner.change_listeners.emit(&event);

        if let Some(ticket) = self.refresh_idle(&mut core, now) {
            tickets.push(ticket);
        }
        drop(core);

        let mut first_err = None;
        for ticket in tickets {
            let result = match ticket {
                Ok(ticket) => ticket.wait().await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok((Some(event), stale)),
        }
    }

    /// Bring the debounce timer in line with the committed state, settling
    /// the idle episode inline when it is already due.
    fn refresh_idle(
        &self,
        core: &mut Core,
        now: u64,
    ) -> Option<Result<PersistTicket, EngineError>> {
        let IdlePhase::IdlePending { deadline, .. } =
            debounce::phase(core.state.last_total, core.state.debounce)
        else {
            core.timer.cancel();
            return None;
        };

        if debounce::is_settle_due(&core.state, now) {
            return Some(self.settle_locked(core, now));
        }
        if now >= deadline {
            // Overdue but some tab still reports work; the next mutation
            // re-checks.
            core.timer.cancel();
            return None;
        }

        let weak = Arc::downgrade(&self.inner);
        let armed = core.timer.arm(deadline, now, async move {
            if let Some(inner) = weak.upgrade() {
                Aggregator { inner }.on_timer_fired(deadline).await;
            }
        });
        if armed {
            tracing::debug!(deadline, "idle timer armed");
        }
        None
    }

    fn settle_locked(&self, core: &mut Core, now: u64) -> Result<PersistTicket, EngineError> {
        core.timer.cancel();
        let previous = core.state.clone();
        let mut next = previous.clone();
        next.debounce = debounce::settle(next.debounce);
        core.state = next.clone();
        let ticket = self.inner.persister.enqueue(&next);

        tracing::info!(
            anchored_at = previous.debounce.since,
            window_ms = previous.debounce.ms,
            tabs = next.tabs.len(),
            "idle settled"
        );
        self.inner.change_listeners.emit(&ChangeEvent {
            reason: ChangeReason::DebounceCleared,
            previous,
            current: next.clone(),
            tab_id: None,
            stale_tab_ids: Vec::new(),
        });
        self.inner.idle_listeners.emit(&IdleSettled {
            settled_at: now,
            state: next,
        });
        ticket
    }

    async fn on_timer_fired(&self, deadline: u64) {
        if self.ensure_live().is_err() {
            return;
        }
        let ticket = {
            let mut core = self.inner.core.lock().await;
            if !core.timer.release(deadline) {
                return;
            }
            let now = self.inner.clock.now_ms();
            self.refresh_idle(&mut core, now)
        };
        let result = match ticket {
            Some(Ok(ticket)) => ticket.wait().await,
            Some(Err(e)) => Err(e),
            None => Ok(()),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "idle settlement not persisted");
        }
    }
}
