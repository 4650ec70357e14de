//! Engine and daemon configuration.
//!
//! Precedence: CLI flags / environment, then the optional TOML file, then
//! built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use taskwatch_core::canonical::RouteConfig;
use taskwatch_core::types::{DEFAULT_DEBOUNCE_MS, clamp_debounce_ms};

use crate::cli::{DaemonOpts, default_socket_path, default_state_path};
use crate::persist::RetryPolicy;

/// Default period of the heartbeat staleness check.
pub const DEFAULT_HEARTBEAT_CHECK_SECS: u64 = 60;

/// User-tunable engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub debounce_ms: u64,
}

impl Settings {
    pub fn new(debounce_ms: u64) -> Self {
        Self {
            debounce_ms: clamp_debounce_ms(debounce_ms),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_MS)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    pub settings: Settings,
    pub routes: RouteConfig,
    pub retry: RetryPolicy,
}

// ─── TOML file ───────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub engine: EngineSection,
    pub routes: Option<RouteConfig>,
    pub heartbeat: HeartbeatSection,
    pub hooks: HooksSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSection {
    pub debounce_ms: Option<u64>,
    pub state_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeartbeatSection {
    pub check_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HooksSection {
    pub on_idle: Option<String>,
}

impl FileConfig {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("invalid taskwatch config")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&text)
    }
}

// ─── Resolved daemon config ──────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub socket_path: String,
    pub state_path: PathBuf,
    pub engine: EngineConfig,
    pub heartbeat_check: Duration,
    pub on_idle: Option<String>,
}

impl DaemonConfig {
    pub fn resolve(opts: &DaemonOpts, socket_path: Option<String>) -> anyhow::Result<Self> {
        let file = match &opts.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Ok(Self::merge(opts, socket_path, file))
    }

    fn merge(opts: &DaemonOpts, socket_path: Option<String>, file: FileConfig) -> Self {
        let debounce_ms = opts
            .debounce_ms
            .or(file.engine.debounce_ms)
            .unwrap_or(DEFAULT_DEBOUNCE_MS);
        let check_secs = opts
            .heartbeat_check_secs
            .or(file.heartbeat.check_interval_secs)
            .unwrap_or(DEFAULT_HEARTBEAT_CHECK_SECS)
            .max(1);

        Self {
            socket_path: socket_path.unwrap_or_else(default_socket_path),
            state_path: opts
                .state_path
                .clone()
                .or(file.engine.state_path)
                .unwrap_or_else(default_state_path),
            engine: EngineConfig {
                settings: Settings::new(debounce_ms),
                routes: file.routes.unwrap_or_default(),
                retry: RetryPolicy::default(),
            },
            heartbeat_check: Duration::from_secs(check_secs),
            on_idle: opts.on_idle.clone().or(file.hooks.on_idle),
        }
    }
}
