//! UDS JSON-RPC client for the `call` subcommand.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

pub(crate) async fn rpc_call(
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

/// Parse the `params` argument of `ggwatch call`. Empty means `{}`.
pub(crate) fn parse_params(raw: Option<&str>) -> anyhow::Result<serde_json::Value> {
    match raw.map(str::trim) {
        None | Some("") => Ok(serde_json::json!({})),
        Some(text) => serde_json::from_str(text)
            .map_err(|e| anyhow::anyhow!("params must be a JSON object: {e}")),
    }
}

/// `ggwatch call <method> [params]`: print the result as pretty JSON.
pub async fn cmd_call(socket_path: &str, method: &str, params: Option<&str>) -> anyhow::Result<()> {
    let params = parse_params(params)?;
    let result = rpc_call(socket_path, method, params).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
