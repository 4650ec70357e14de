//! Inbound message validation.
//!
//! Requests arrive as JSON-RPC `method` + `params`. Params use camelCase keys
//! and are checked here, before anything reaches the aggregator: origins must
//! be absolute URLs, counts and timestamps non-negative, heartbeat intervals
//! within `[1000, 60000]`, detectors from the known set.

use serde::Deserialize;
use serde_json::Value;

use taskwatch_core::types::{
    MAX_HEARTBEAT_INTERVAL_MS, MIN_HEARTBEAT_INTERVAL_MS, Signal, TabId, TabPing, TabUpdate,
};

use crate::config::Settings;
use crate::error::InboundError;

pub const TASKS_UPDATE: &str = "tasks_update";
pub const HEARTBEAT: &str = "heartbeat";
pub const TAB_REMOVED: &str = "tab_removed";
pub const TAB_NAVIGATED: &str = "tab_navigated";
pub const EVALUATE_HEARTBEATS: &str = "evaluate_heartbeats";
pub const GET_SNAPSHOT: &str = "get_snapshot";
pub const TRACKED_TABS: &str = "tracked_tabs";
pub const UPDATE_SETTINGS: &str = "update_settings";

/// A validated request.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    TasksUpdate(TabUpdate),
    Heartbeat(TabPing),
    TabRemoved(TabId),
    TabNavigated(TabId),
    /// `now` defaults to the daemon clock when absent.
    EvaluateHeartbeats { now: Option<u64> },
    GetSnapshot,
    TrackedTabs,
    UpdateSettings(Settings),
}

impl Request {
    pub fn parse(method: &str, params: &Value) -> Result<Self, InboundError> {
        match method {
            TASKS_UPDATE => parse_update(params).map(Self::TasksUpdate),
            HEARTBEAT => parse_ping(params).map(Self::Heartbeat),
            TAB_REMOVED => parse_tab_ref(params).map(Self::TabRemoved),
            TAB_NAVIGATED => parse_tab_ref(params).map(Self::TabNavigated),
            EVALUATE_HEARTBEATS => {
                let raw: RawEvaluate = from_params(params)?;
                let now = raw.now.map(|v| timestamp("now", v)).transpose()?;
                Ok(Self::EvaluateHeartbeats {
                    now: now.map(|n| n as u64),
                })
            }
            GET_SNAPSHOT => Ok(Self::GetSnapshot),
            TRACKED_TABS => Ok(Self::TrackedTabs),
            UPDATE_SETTINGS => {
                let raw: RawSettings = from_params(params)?;
                Ok(Self::UpdateSettings(Settings::new(raw.debounce_ms)))
            }
            other => Err(InboundError::UnknownMethod(other.to_owned())),
        }
    }

    /// Whether the request mutates engine state.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::GetSnapshot | Self::TrackedTabs)
    }
}

// ─── Raw wire shapes ─────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUpdate {
    tab_id: TabId,
    origin: String,
    #[serde(default)]
    title: String,
    count: u32,
    active: bool,
    #[serde(default)]
    signals: Vec<Signal>,
    ts: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPing {
    tab_id: TabId,
    origin: String,
    #[serde(default)]
    title: String,
    ts: f64,
    last_update_ts: f64,
    interval_ms: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTabRef {
    tab_id: TabId,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawEvaluate {
    now: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSettings {
    debounce_ms: u64,
}

fn from_params<T: for<'de> Deserialize<'de>>(params: &Value) -> Result<T, InboundError> {
    let params = if params.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        params.clone()
    };
    serde_json::from_value(params).map_err(InboundError::Params)
}

fn parse_update(params: &Value) -> Result<TabUpdate, InboundError> {
    let raw: RawUpdate = from_params(params)?;
    check_origin(&raw.origin)?;
    Ok(TabUpdate {
        tab_id: raw.tab_id,
        origin: raw.origin,
        title: raw.title,
        count: i64::from(raw.count),
        active: raw.active,
        signals: raw.signals,
        ts: timestamp("ts", raw.ts)?,
    })
}

fn parse_ping(params: &Value) -> Result<TabPing, InboundError> {
    let raw: RawPing = from_params(params)?;
    check_origin(&raw.origin)?;
    if !(MIN_HEARTBEAT_INTERVAL_MS..=MAX_HEARTBEAT_INTERVAL_MS).contains(&raw.interval_ms) {
        return Err(InboundError::OutOfRange {
            field: "intervalMs",
            value: raw.interval_ms.to_string(),
        });
    }
    Ok(TabPing {
        tab_id: raw.tab_id,
        origin: raw.origin,
        title: raw.title,
        ts: timestamp("ts", raw.ts)?,
        last_update_ts: timestamp("lastUpdateTs", raw.last_update_ts)?,
        interval_ms: raw.interval_ms as i64,
    })
}

fn parse_tab_ref(params: &Value) -> Result<TabId, InboundError> {
    from_params::<RawTabRef>(params).map(|raw| raw.tab_id)
}

fn check_origin(origin: &str) -> Result<(), InboundError> {
    url::Url::parse(origin)
        .map(|_| ())
        .map_err(|e| InboundError::Origin {
            origin: origin.to_owned(),
            reason: e.to_string(),
        })
}

/// Epoch-millisecond timestamp: finite, non-negative, fractional part dropped.
fn timestamp(field: &'static str, value: f64) -> Result<i64, InboundError> {
    if !value.is_finite() || value < 0.0 || value > i64::MAX as f64 {
        return Err(InboundError::OutOfRange {
            field,
            value: value.to_string(),
        });
    }
    Ok(value.trunc() as i64)
}
