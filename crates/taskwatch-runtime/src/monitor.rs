//! Periodic heartbeat staleness check.
//!
//! Runs as a tokio task next to the UDS server and asks the aggregator to
//! flag tabs whose heartbeat is overdue. Stale tabs keep contributing to the
//! total; the flag is informational only.

use std::sync::Arc;

use tokio::time::{Duration, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use crate::aggregator::Aggregator;
use crate::clock::Clock;

pub struct HeartbeatMonitor {
    engine: Aggregator,
    clock: Arc<dyn Clock>,
    period: Duration,
    cancel: CancellationToken,
}

impl HeartbeatMonitor {
    pub fn new(
        engine: Aggregator,
        clock: Arc<dyn Clock>,
        period: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            engine,
            clock,
            period,
            cancel,
        }
    }

    /// Tick until cancelled. The first check happens one period after start.
    pub async fn run(self) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => self.check().await,
                _ = self.cancel.cancelled() => {
                    tracing::info!("heartbeat monitor: cancellation requested, stopping");
                    break;
                }
            }
        }
    }

    async fn check(&self) {
        let now = self.clock.now_ms();
        match self.engine.evaluate_heartbeat_statuses(now).await {
            Ok(stale) if stale.is_empty() => tracing::trace!("heartbeat check: all tabs fresh"),
            Ok(stale) => tracing::info!(tabs = ?stale, "heartbeat check: tabs went stale"),
            Err(e) => tracing::warn!("heartbeat check failed: {e}"),
        }
    }
}
