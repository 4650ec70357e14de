//! UDS JSON-RPC server.
//! Newline-delimited JSON; a connection may carry several requests.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

use crate::aggregator::Aggregator;
use crate::clock::Clock;
use crate::error::InboundError;
use crate::protocol::Request;

/// JSON-RPC error code for requests that validated but failed in the engine
/// (e.g. the snapshot could not be persisted).
pub const ENGINE_ERROR: i64 = -32000;

/// Accept connections on an already bound listener until `cancel` fires.
pub async fn serve(
    listener: UnixListener,
    engine: Aggregator,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _) = accepted?;
                let engine = engine.clone();
                let clock = Arc::clone(&clock);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, engine, clock).await {
                        tracing::debug!("connection error: {e}");
                    }
                });
            }
            _ = cancel.cancelled() => {
                tracing::info!("UDS server: cancellation requested, stopping");
                return Ok(());
            }
        }
    }
}

/// Prepare the socket directory (0700), clear a stale socket and bind (0600).
pub async fn bind(socket_path: &str) -> anyhow::Result<UnixListener> {
    let socket_dir = std::path::Path::new(socket_path)
        .parent()
        .ok_or_else(|| anyhow::anyhow!("invalid socket path"))?;

    std::fs::create_dir_all(socket_dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_dir, std::fs::Permissions::from_mode(0o700))?;
    }

    if std::path::Path::new(socket_path).exists() {
        if UnixStream::connect(socket_path).await.is_err() {
            std::fs::remove_file(socket_path)?;
            tracing::info!("removed stale socket at {socket_path}");
        } else {
            anyhow::bail!("another daemon is already running at {socket_path}");
        }
    }

    let listener = UnixListener::bind(socket_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(listener)
}

async fn handle_connection(
    stream: UnixStream,
    engine: Aggregator,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        if !line.trim().is_empty() {
            let response = handle_line(&engine, clock.as_ref(), line.trim()).await;
            let mut resp = serde_json::to_string(&response)?;
            resp.push('\n');
            writer.write_all(resp.as_bytes()).await?;
        }
        line.clear();
    }

    Ok(())
}

/// Process one request line into a complete JSON-RPC response.
pub(crate) async fn handle_line(engine: &Aggregator, clock: &dyn Clock, line: &str) -> Value {
    let request: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            let err = InboundError::Parse(e);
            tracing::warn!("rejected request: {err}");
            return error_response(Value::Null, err.code(), &err.to_string());
        }
    };
    let method = request["method"].as_str().unwrap_or("");
    let id = request["id"].clone();

    let parsed = match Request::parse(method, &request["params"]) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::warn!(method, "rejected request: {err}");
            return error_response(id, err.code(), &err.to_string());
        }
    };

    match dispatch(engine, clock, parsed).await {
        Ok(result) => json!({
            "jsonrpc": "2.0",
            "result": result,
            "id": id,
        }),
        Err(e) => {
            tracing::error!(method, "request failed: {e}");
            error_response(id, ENGINE_ERROR, &e.to_string())
        }
    }
}

async fn dispatch(engine: &Aggregator, clock: &dyn Clock, request: Request) -> anyhow::Result<Value> {
    let result = match request {
        Request::TasksUpdate(update) => changed(engine.handle_tab_update(update).await?),
        Request::Heartbeat(ping) => changed(engine.handle_tab_heartbeat(ping).await?),
        Request::TabRemoved(tab_id) => changed(engine.handle_tab_removed(tab_id).await?),
        Request::TabNavigated(tab_id) => changed(engine.handle_tab_navigated_away(tab_id).await?),
        Request::EvaluateHeartbeats { now } => {
            let now = now.unwrap_or_else(|| clock.now_ms());
            let stale = engine.evaluate_heartbeat_statuses(now).await?;
            json!({ "staleTabIds": stale })
        }
        Request::GetSnapshot => serde_json::to_value(engine.snapshot().await)?,
        Request::TrackedTabs => json!(engine.tracked_tab_ids().await),
        Request::UpdateSettings(settings) => changed(engine.update_settings(settings).await?),
    };
    Ok(result)
}

fn changed(changed: bool) -> Value {
    json!({ "changed": changed })
}

fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": {"code": code, "message": message},
        "id": id,
    })
}
