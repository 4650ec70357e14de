//! Persisted snapshot codec, schema validation and repair.
//!
//! The serde model already rejects negative numbers and missing required
//! fields; [`validate`] adds the range checks the type system cannot
//! express. [`repair`] restores I1/I3 on a structurally valid snapshot.

use crate::canonical::Canonicalizer;
use crate::error::SnapshotError;
use crate::total::derive_total;
use crate::types::{
    AggregateState, MAX_DEBOUNCE_MS, MAX_HEARTBEAT_INTERVAL_MS, MIN_HEARTBEAT_INTERVAL_MS, TabId,
};

pub fn encode(state: &AggregateState) -> Result<String, SnapshotError> {
    serde_json::to_string_pretty(state).map_err(|e| SnapshotError::Parse(e.to_string()))
}

/// Parse and validate a persisted snapshot.
pub fn decode(text: &str) -> Result<AggregateState, SnapshotError> {
    let state: AggregateState =
        serde_json::from_str(text).map_err(|e| SnapshotError::Parse(e.to_string()))?;
    validate(&state)?;
    Ok(state)
}

pub fn validate(state: &AggregateState) -> Result<(), SnapshotError> {
    if state.debounce.ms > MAX_DEBOUNCE_MS {
        return Err(SnapshotError::schema(
            "debounce.ms",
            format!("{} exceeds {MAX_DEBOUNCE_MS}", state.debounce.ms),
        ));
    }
    for (id, record) in &state.tabs {
        let interval = record.heartbeat.expected_interval_ms;
        if !(MIN_HEARTBEAT_INTERVAL_MS..=MAX_HEARTBEAT_INTERVAL_MS).contains(&interval) {
            return Err(SnapshotError::schema(
                format!("tabs.{id}.heartbeat.expectedIntervalMs"),
                format!(
                    "{interval} outside [{MIN_HEARTBEAT_INTERVAL_MS}, {MAX_HEARTBEAT_INTERVAL_MS}]"
                ),
            ));
        }
        if record.origin.is_empty() {
            return Err(SnapshotError::schema(
                format!("tabs.{id}.origin"),
                "must not be empty",
            ));
        }
    }
    Ok(())
}

/// What [`repair`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Records dropped because their origin no longer qualifies.
    pub evicted: Vec<TabId>,
    /// `(persisted, derived)` when the stored total disagreed with the tabs.
    pub total_mismatch: Option<(u32, u32)>,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        self.evicted.is_empty() && self.total_mismatch.is_none()
    }
}

/// Drop non-qualifying records and re-derive the total.
pub fn repair(state: &mut AggregateState, canon: &Canonicalizer) -> RepairReport {
    let mut report = RepairReport::default();
    state.tabs.retain(|id, record| {
        let keep = canon.classify(&record.origin).is_trackable();
        if !keep {
            report.evicted.push(*id);
        }
        keep
    });

    let derived = derive_total(&state.tabs, canon);
    if derived != state.last_total {
        report.total_mismatch = Some((state.last_total, derived));
        state.last_total = derived;
    }
    if derived > 0 {
        state.debounce.since = 0;
    }
    report
}
