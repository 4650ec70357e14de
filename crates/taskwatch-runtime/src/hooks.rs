//! `on_idle` hook: run a shell command once per settled idle episode.
//!
//! The command runs through `sh -c` with the settled state described in
//! environment variables:
//!
//! - `TASKWATCH_TOTAL`: the settled total (always `0`)
//! - `TASKWATCH_TABS`: number of tracked tabs
//! - `TASKWATCH_SETTLED_AT`: settlement time, epoch milliseconds

use tokio::process::Command;

use taskwatch_core::event::IdleSettled;

use crate::aggregator::Aggregator;
use crate::listeners::ListenerId;

#[derive(Debug, Clone)]
pub struct IdleHook {
    command: String,
}

impl IdleHook {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Subscribe the hook to `engine`. Each settlement spawns a detached task.
    pub fn install(self, engine: &Aggregator) -> ListenerId {
        engine.on_idle_settled(move |event| {
            let mut command = self.build(event);
            let line = self.command.clone();
            tokio::spawn(async move {
                match command.output().await {
                    Ok(output) if output.status.success() => {
                        tracing::debug!(command = %line, "on_idle hook finished");
                    }
                    Ok(output) => {
                        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                        tracing::warn!(command = %line, status = %output.status, stderr = %stderr, "on_idle hook failed");
                    }
                    Err(e) => tracing::warn!(command = %line, "on_idle hook could not start: {e}"),
                }
            });
        })
    }

    fn build(&self, event: &IdleSettled) -> Command {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&self.command)
            .env("TASKWATCH_TOTAL", event.state.last_total.to_string())
            .env("TASKWATCH_TABS", event.state.tabs.len().to_string())
            .env("TASKWATCH_SETTLED_AT", event.settled_at.to_string());
        command
    }
}
