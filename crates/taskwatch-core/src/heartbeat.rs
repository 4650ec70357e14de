//! Heartbeat freshness evaluation.
//!
//! A tab is stale once `now - last_received_at` reaches
//! `max(STALE_FLOOR_MS, expected_interval_ms * STALE_MULTIPLIER)`. Every
//! evaluation cycle a tab remains stale bumps its `missed_count` by one.

use std::collections::BTreeMap;

use crate::types::{HeartbeatStatus, TabHeartbeat, TabId, TabRecord};

/// Minimum staleness threshold regardless of the advertised interval.
pub const STALE_FLOOR_MS: u64 = 60_000;

/// Number of missed intervals tolerated before a tab is stale.
pub const STALE_MULTIPLIER: u64 = 3;

pub fn stale_threshold_ms(expected_interval_ms: u64) -> u64 {
    STALE_FLOOR_MS.max(expected_interval_ms.saturating_mul(STALE_MULTIPLIER))
}

pub fn is_stale(heartbeat: &TabHeartbeat, now_ms: u64) -> bool {
    now_ms.saturating_sub(heartbeat.last_received_at)
        >= stale_threshold_ms(heartbeat.expected_interval_ms)
}

/// Mark stale tabs in place and return their ids in ascending order.
pub fn evaluate(tabs: &mut BTreeMap<TabId, TabRecord>, now_ms: u64) -> Vec<TabId> {
    let mut stale = Vec::new();
    for (id, record) in tabs.iter_mut() {
        if is_stale(&record.heartbeat, now_ms) {
            record.heartbeat.status = HeartbeatStatus::Stale;
            record.heartbeat.missed_count = record.heartbeat.missed_count.saturating_add(1);
            stale.push(*id);
        }
    }
    stale
}
