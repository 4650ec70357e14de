//! UDS JSON-RPC client for CLI subcommands.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use taskwatch_core::AggregateState;
use taskwatch_core::debounce::{self, IdlePhase};

use crate::protocol;

pub async fn rpc_call(
    socket_path: &str,
    method: &str,
    params: serde_json::Value,
) -> anyhow::Result<serde_json::Value> {
    let stream = UnixStream::connect(socket_path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot connect to daemon at {socket_path}: {e}"))?;

    let (reader, mut writer) = stream.into_split();

    let request = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1,
    });
    let mut req = serde_json::to_string(&request)?;
    req.push('\n');
    writer.write_all(req.as_bytes()).await?;
    writer.shutdown().await?;

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let response: serde_json::Value = serde_json::from_str(line.trim())?;

    if let Some(error) = response.get("error") {
        anyhow::bail!("RPC error: {error}");
    }

    Ok(response["result"].clone())
}

async fn fetch_snapshot(socket_path: &str) -> anyhow::Result<AggregateState> {
    let value = rpc_call(socket_path, protocol::GET_SNAPSHOT, serde_json::json!({})).await?;
    Ok(serde_json::from_value(value)?)
}

/// `taskwatch snapshot`: pretty-printed aggregate state.
pub async fn cmd_snapshot(socket_path: &str) -> anyhow::Result<()> {
    let state = fetch_snapshot(socket_path).await?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

/// `taskwatch status`: one line, e.g. `total=2 tabs=3 phase=active stale=0`.
pub async fn cmd_status(socket_path: &str) -> anyhow::Result<()> {
    let state = fetch_snapshot(socket_path).await?;
    println!("{}", format_status(&state));
    Ok(())
}

/// `taskwatch set-debounce <ms>`.
pub async fn cmd_set_debounce(socket_path: &str, ms: u64) -> anyhow::Result<()> {
    let result = rpc_call(
        socket_path,
        protocol::UPDATE_SETTINGS,
        serde_json::json!({ "debounceMs": ms }),
    )
    .await?;
    if result["changed"].as_bool() == Some(true) {
        println!("debounce window set to {}ms", ms.min(taskwatch_core::types::MAX_DEBOUNCE_MS));
    } else {
        println!("debounce window unchanged");
    }
    Ok(())
}

/// Pure formatting logic for status output, separated for testability.
pub(crate) fn format_status(state: &AggregateState) -> String {
    let phase = debounce::phase(state.last_total, state.debounce);
    let mut out = format!(
        "total={} tabs={} phase={}",
        state.last_total,
        state.tabs.len(),
        phase.as_str()
    );
    if let IdlePhase::IdlePending { deadline, .. } = phase {
        out.push_str(&format!(" deadline={deadline}"));
    }
    out.push_str(&format!(" stale={}", state.stale_tab_ids().len()));
    out
}
