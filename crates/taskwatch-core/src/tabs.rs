//! Next-state computation for per-tab inputs.
//!
//! Every function here mutates a working copy of [`AggregateState`]; the
//! runtime decides whether the result differs from the committed state and
//! only then publishes it.

use crate::canonical::Canonicalizer;
use crate::debounce;
use crate::total::derive_total;
use crate::types::{
    AggregateState, HeartbeatStatus, TabId, TabPing, TabRecord, TabUpdate, clamp_interval_ms,
    dedup_signals, non_negative,
};

/// What an input did to the tab map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabEffect {
    /// The tab is on a qualifying page and its record was created or refreshed.
    Upserted,
    /// The tab left qualifying pages and its record was dropped.
    Evicted,
    /// The tab is on a non-qualifying page and was not tracked anyway.
    Ignored,
}

fn clamp_count(count: i64) -> u32 {
    u32::try_from(non_negative(count)).unwrap_or(u32::MAX)
}

fn evict(state: &mut AggregateState, tab_id: TabId) -> TabEffect {
    if state.tabs.remove(&tab_id).is_some() {
        TabEffect::Evicted
    } else {
        TabEffect::Ignored
    }
}

/// Apply a content update.
pub fn apply_update(
    state: &mut AggregateState,
    canon: &Canonicalizer,
    update: &TabUpdate,
) -> TabEffect {
    if !canon.classify(&update.origin).is_trackable() {
        return evict(state, update.tab_id);
    }

    let ts = non_negative(update.ts);
    let record = state
        .tabs
        .entry(update.tab_id)
        .or_insert_with(|| TabRecord::empty(&update.origin, &update.title, ts));

    record.origin.clone_from(&update.origin);
    record.title.clone_from(&update.title);
    record.count = clamp_count(update.count);
    record.active = update.active;
    record.updated_at = record.updated_at.max(ts);
    record.last_seen_at = record.last_seen_at.max(ts);
    record.signals = dedup_signals(update.signals.clone());
    record.heartbeat.last_received_at = record.heartbeat.last_received_at.max(ts);
    record.heartbeat.status = HeartbeatStatus::Ok;
    record.heartbeat.missed_count = 0;

    TabEffect::Upserted
}

/// Apply a heartbeat. Creates a zero-count record for a new qualifying tab.
pub fn apply_ping(state: &mut AggregateState, canon: &Canonicalizer, ping: &TabPing) -> TabEffect {
    if !canon.classify(&ping.origin).is_trackable() {
        return evict(state, ping.tab_id);
    }

    let ts = non_negative(ping.ts);
    let last_update_ts = non_negative(ping.last_update_ts);
    let record = state
        .tabs
        .entry(ping.tab_id)
        .or_insert_with(|| TabRecord::empty(&ping.origin, &ping.title, ts));

    record.origin.clone_from(&ping.origin);
    if !ping.title.is_empty() {
        record.title.clone_from(&ping.title);
    }
    record.updated_at = record.updated_at.max(ts).max(last_update_ts);
    record.last_seen_at = record.last_seen_at.max(ts);
    record.heartbeat.expected_interval_ms = clamp_interval_ms(non_negative(ping.interval_ms));
    record.heartbeat.last_received_at = record.heartbeat.last_received_at.max(ts);
    record.heartbeat.status = HeartbeatStatus::Ok;
    record.heartbeat.missed_count = 0;

    TabEffect::Upserted
}

/// Drop a tab unconditionally. Returns whether a record existed.
pub fn remove(state: &mut AggregateState, tab_id: TabId) -> bool {
    state.tabs.remove(&tab_id).is_some()
}

/// Re-derive `last_total` and move the debounce state machine accordingly.
pub fn recompute(state: &mut AggregateState, canon: &Canonicalizer, now_ms: u64) {
    let previous = state.last_total;
    let next = derive_total(&state.tabs, canon);
    state.debounce = debounce::on_total_change(state.debounce, previous, next, now_ms);
    state.last_total = next;
}
