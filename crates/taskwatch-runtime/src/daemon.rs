//! Daemon wiring: engine + UDS server + heartbeat monitor + idle hook.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::aggregator::Aggregator;
use crate::clock::{Clock, SystemClock};
use crate::config::DaemonConfig;
use crate::hooks::IdleHook;
use crate::monitor::HeartbeatMonitor;
use crate::server;
use crate::store::{JsonFileStore, SnapshotStore};

/// Run the daemon: starts engine, server and monitor, waits for shutdown signal.
pub async fn run_daemon(config: DaemonConfig) -> anyhow::Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let store: Arc<dyn SnapshotStore> = Arc::new(JsonFileStore::new(&config.state_path));
    let engine = Aggregator::new(config.engine.clone(), store, Arc::clone(&clock));

    engine.on_change(|event| {
        tracing::info!(
            reason = %event.reason,
            tab_id = event.tab_id,
            total = event.current.last_total,
            previous_total = event.previous.last_total,
            tabs = event.current.tabs.len(),
            "state changed"
        );
    });
    if let Some(command) = &config.on_idle {
        IdleHook::new(command.clone()).install(&engine);
        tracing::info!(command = %command, "on_idle hook installed");
    }

    let outcome = engine.init().await?;
    tracing::info!(
        state_path = %config.state_path.display(),
        outcome = ?outcome,
        debounce_ms = config.engine.settings.debounce_ms,
        "snapshot loaded"
    );

    let cancel = CancellationToken::new();

    let listener = server::bind(&config.socket_path).await?;
    tracing::info!(socket = %config.socket_path, "UDS server listening");

    let server_engine = engine.clone();
    let server_clock = Arc::clone(&clock);
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server::serve(listener, server_engine, server_clock, server_cancel).await {
            tracing::error!("UDS server error: {e}");
        }
    });

    let monitor = HeartbeatMonitor::new(
        engine.clone(),
        Arc::clone(&clock),
        config.heartbeat_check,
        cancel.clone(),
    );
    let monitor_handle = tokio::spawn(monitor.run());

    // Wait for shutdown signal (ctrl-c or SIGTERM)
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
                        _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                    }
                }
                Err(e) => {
                    tracing::warn!("failed to register SIGTERM handler: {e}");
                    ctrl_c.await.ok();
                    tracing::info!("received ctrl-c, shutting down");
                }
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            tracing::info!("received ctrl-c, shutting down");
        }
    };

    tokio::select! {
        () = shutdown => {}
        _ = monitor_handle => {
            tracing::warn!("heartbeat monitor exited unexpectedly");
        }
        _ = server_handle => {
            tracing::warn!("server exited unexpectedly");
        }
    }

    cancel.cancel();
    engine.shutdown().await;

    // Cleanup socket
    let _ = std::fs::remove_file(&config.socket_path);
    tracing::info!("daemon stopped");
    Ok(())
}
