use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Opaque browser tab identifier.
pub type TabId = i64;

// ─── Constants ────────────────────────────────────────────────────

/// Default debounce window between "total reached zero" and "idle settled".
pub const DEFAULT_DEBOUNCE_MS: u64 = 12_000;

/// Upper bound of the configurable debounce window.
pub const MAX_DEBOUNCE_MS: u64 = 60_000;

/// Bounds for a tab's advertised heartbeat interval.
pub const MIN_HEARTBEAT_INTERVAL_MS: u64 = 1_000;
pub const MAX_HEARTBEAT_INTERVAL_MS: u64 = 60_000;

/// Interval assumed for a tab that has never advertised one.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 15_000;

/// Clamp a debounce window into `[0, MAX_DEBOUNCE_MS]`.
pub fn clamp_debounce_ms(ms: u64) -> u64 {
    ms.min(MAX_DEBOUNCE_MS)
}

/// Clamp a heartbeat interval into `[MIN_HEARTBEAT_INTERVAL_MS, MAX_HEARTBEAT_INTERVAL_MS]`.
pub fn clamp_interval_ms(ms: u64) -> u64 {
    ms.clamp(MIN_HEARTBEAT_INTERVAL_MS, MAX_HEARTBEAT_INTERVAL_MS)
}

// ─── Signals ──────────────────────────────────────────────────────

/// DOM heuristic that produced a piece of activity evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Detector {
    TaskListItem,
    RunningIndicator,
    StopButton,
    StatusText,
    ProgressBar,
}

impl Detector {
    pub const ALL: [Self; 5] = [
        Self::TaskListItem,
        Self::RunningIndicator,
        Self::StopButton,
        Self::StatusText,
        Self::ProgressBar,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TaskListItem => "task_list_item",
            Self::RunningIndicator => "running_indicator",
            Self::StopButton => "stop_button",
            Self::StatusText => "status_text",
            Self::ProgressBar => "progress_bar",
        }
    }
}

impl fmt::Display for Detector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Detector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| format!("unknown detector: {s}"))
    }
}

/// Evidence of why a tab is counted active.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub detector: Detector,
    pub evidence: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_key: Option<String>,
}

/// Deduplicate signals by `(detector, evidence, task_key)`, keeping the first
/// occurrence and the original order.
pub fn dedup_signals(signals: Vec<Signal>) -> Vec<Signal> {
    let mut out: Vec<Signal> = Vec::with_capacity(signals.len());
    for signal in signals {
        if !out.contains(&signal) {
            out.push(signal);
        }
    }
    out
}

// ─── Heartbeat ────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HeartbeatStatus {
    #[default]
    Ok,
    Stale,
}

/// Per-tab liveness bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabHeartbeat {
    /// Most recent contact (update or heartbeat), epoch ms.
    pub last_received_at: u64,
    pub expected_interval_ms: u64,
    pub status: HeartbeatStatus,
    pub missed_count: u32,
}

impl TabHeartbeat {
    pub fn fresh(now_ms: u64) -> Self {
        Self {
            last_received_at: now_ms,
            expected_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            status: HeartbeatStatus::Ok,
            missed_count: 0,
        }
    }
}

// ─── Tab record ───────────────────────────────────────────────────

/// Observed state of a single tracked tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabRecord {
    pub origin: String,
    pub title: String,
    pub count: u32,
    pub active: bool,
    pub updated_at: u64,
    pub last_seen_at: u64,
    pub heartbeat: TabHeartbeat,
    pub signals: Vec<Signal>,
}

impl TabRecord {
    /// A record with no observed activity, first seen at `now_ms`.
    pub fn empty(origin: &str, title: &str, now_ms: u64) -> Self {
        Self {
            origin: origin.to_owned(),
            title: title.to_owned(),
            count: 0,
            active: false,
            updated_at: now_ms,
            last_seen_at: now_ms,
            heartbeat: TabHeartbeat::fresh(now_ms),
            signals: Vec::new(),
        }
    }
}

// ─── Aggregate ────────────────────────────────────────────────────

/// Idle debounce bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebounceState {
    /// Configured window length, `[0, MAX_DEBOUNCE_MS]`.
    pub ms: u64,
    /// When the total most recently became zero; `0` = no open idle window.
    pub since: u64,
}

impl Default for DebounceState {
    fn default() -> Self {
        Self {
            ms: DEFAULT_DEBOUNCE_MS,
            since: 0,
        }
    }
}

/// The singleton engine state, persisted as one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateState {
    pub tabs: BTreeMap<TabId, TabRecord>,
    pub last_total: u32,
    pub debounce: DebounceState,
}

impl AggregateState {
    /// Empty state with the given debounce window.
    pub fn with_debounce_ms(ms: u64) -> Self {
        Self {
            debounce: DebounceState {
                ms: clamp_debounce_ms(ms),
                since: 0,
            },
            ..Self::default()
        }
    }

    pub fn tab_ids(&self) -> Vec<TabId> {
        self.tabs.keys().copied().collect()
    }

    /// True when no tracked tab reports any active task.
    pub fn all_tabs_zero(&self) -> bool {
        self.tabs.values().all(|t| t.count == 0)
    }

    pub fn stale_tab_ids(&self) -> Vec<TabId> {
        self.tabs
            .iter()
            .filter(|(_, t)| t.heartbeat.status == HeartbeatStatus::Stale)
            .map(|(id, _)| *id)
            .collect()
    }
}

// ─── Inputs ───────────────────────────────────────────────────────

/// A content update reported by one tab.
///
/// Numeric fields are signed so the engine can clamp values that slipped past
/// boundary validation instead of trusting them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabUpdate {
    pub tab_id: TabId,
    pub origin: String,
    pub title: String,
    pub count: i64,
    pub active: bool,
    pub signals: Vec<Signal>,
    pub ts: i64,
}

/// A liveness heartbeat from one tab. Never changes the tab's count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabPing {
    pub tab_id: TabId,
    pub origin: String,
    pub title: String,
    pub ts: i64,
    pub last_update_ts: i64,
    pub interval_ms: i64,
}

/// Clamp a signed timestamp or counter to the non-negative range.
pub fn non_negative(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
