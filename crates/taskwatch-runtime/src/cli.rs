//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "taskwatch", about = "cross-tab task activity aggregator")]
pub struct Cli {
    /// UDS socket path (default: $XDG_RUNTIME_DIR/taskwatch/taskwatch.sock)
    #[arg(long, short = 's', global = true, env = "TASKWATCH_SOCKET")]
    pub socket_path: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the aggregation engine (UDS server + heartbeat monitor)
    Daemon(DaemonOpts),
    /// Print the current aggregate snapshot (JSON)
    Snapshot,
    /// One-line summary: total, tracked tabs, idle phase
    Status,
    /// Change the idle debounce window on a running daemon
    SetDebounce {
        /// Window length in milliseconds, clamped to [0, 60000]
        ms: u64,
    },
}

#[derive(clap::Args, Default)]
pub struct DaemonOpts {
    /// Snapshot file (default: $XDG_STATE_HOME/taskwatch/state.json)
    #[arg(long, env = "TASKWATCH_STATE_PATH")]
    pub state_path: Option<PathBuf>,

    /// Optional TOML config file
    #[arg(long, short = 'c', env = "TASKWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Idle debounce window in milliseconds
    #[arg(long, env = "TASKWATCH_DEBOUNCE_MS")]
    pub debounce_ms: Option<u64>,

    /// Seconds between heartbeat staleness checks
    #[arg(long)]
    pub heartbeat_check_secs: Option<u64>,

    /// Shell command run once per settled idle episode
    #[arg(long)]
    pub on_idle: Option<String>,
}

/// Default socket path using $USER for per-user isolation.
pub fn default_socket_path() -> String {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        return format!("{dir}/taskwatch/taskwatch.sock");
    }
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    format!("/tmp/taskwatch-{user}/taskwatch.sock")
}

/// Default snapshot path under the XDG state directory.
pub fn default_state_path() -> PathBuf {
    if let Ok(dir) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(dir).join("taskwatch/state.json");
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".local/state/taskwatch/state.json")
}
