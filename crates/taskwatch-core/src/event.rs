//! Events published after committed mutations.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{AggregateState, TabId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeReason {
    Init,
    TasksUpdate,
    Heartbeat,
    TabRemoved,
    TabNavigated,
    HeartbeatStale,
    DebounceCleared,
    SettingsUpdated,
}

impl ChangeReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::TasksUpdate => "tasks-update",
            Self::Heartbeat => "heartbeat",
            Self::TabRemoved => "tab-removed",
            Self::TabNavigated => "tab-navigated",
            Self::HeartbeatStale => "heartbeat-stale",
            Self::DebounceCleared => "debounce-cleared",
            Self::SettingsUpdated => "settings-updated",
        }
    }
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Published after every committed mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub reason: ChangeReason,
    pub previous: AggregateState,
    pub current: AggregateState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<TabId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stale_tab_ids: Vec<TabId>,
}

impl ChangeEvent {
    pub fn total_changed(&self) -> bool {
        self.previous.last_total != self.current.last_total
    }
}

/// Published once per idle episode, carrying the settled state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdleSettled {
    pub settled_at: u64,
    pub state: AggregateState,
}
