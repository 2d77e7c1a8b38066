//! UDS JSON-RPC server: connection-per-request, newline-delimited JSON.
//!
//! The chat gateway forwards button taps and typed text as `action`
//! requests; the CLI uses the read-only methods. Messages are posted by
//! the daemon's own in-process `MessageTransport`. The `action` result
//! echoes the rendered content next to its message id so a gateway can
//! mirror what was shown.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;

use ggwatch_core::threshold::AlertPolicy;
use ggwatch_core::types::ChatId;

use crate::actions::{Action, ActionHandler};
use crate::menu::MenuCatalog;
use crate::poll_loop::PollingLoop;
use crate::provider::DataProvider;
use crate::store::SubscriptionStore;
use crate::transport::MessageTransport;
use crate::ui_session::UiSessionController;

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const ACTION_FAILED: i64 = -32000;
const INTERNAL_ERROR: i64 = -32603;

/// Everything the RPC methods need.
pub struct DaemonState<P, T, M> {
    pub handler: ActionHandler<P, T, M>,
    pub store: Arc<SubscriptionStore>,
    pub ui: Arc<UiSessionController<T>>,
    pub poller: Arc<PollingLoop<P, T, M>>,
    pub policy: AlertPolicy,
    pub started_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct ActionParams {
    chat_id: ChatId,
    action: Action,
}

#[derive(Deserialize)]
struct ChatParams {
    chat_id: ChatId,
}

/// Run the UDS JSON-RPC server until the task is dropped.
pub async fn run_server<P, T, M>(
    socket_path: &str,
    state: Arc<DaemonState<P, T, M>>,
) -> anyhow::Result<()>
where
    P: DataProvider + 'static,
    T: MessageTransport + 'static,
    M: MenuCatalog + 'static,
{
    let socket_dir = std::path::Path::new(socket_path)
        .parent()
        .ok_or_else(|| anyhow::anyhow!("invalid socket path"))?;

    std::fs::create_dir_all(socket_dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_dir, std::fs::Permissions::from_mode(0o700))?;
    }

    // Stale socket from a crashed daemon, or a live one we must not steal.
    if std::path::Path::new(socket_path).exists() {
        if tokio::net::UnixStream::connect(socket_path).await.is_err() {
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

    tracing::info!("UDS server listening on {socket_path}");

    loop {
        let (stream, _) = listener.accept().await?;
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, state).await {
                tracing::debug!("connection error: {e}");
            }
        });
    }
}

async fn handle_connection<P, T, M>(
    stream: tokio::net::UnixStream,
    state: Arc<DaemonState<P, T, M>>,
) -> anyhow::Result<()>
where
    P: DataProvider,
    T: MessageTransport + 'static,
    M: MenuCatalog + 'static,
{
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let response = match serde_json::from_str::<Value>(line.trim()) {
        Ok(request) => dispatch(&state, &request).await,
        Err(e) => error_response(Value::Null, PARSE_ERROR, &format!("parse error: {e}")),
    };

    let mut resp = serde_json::to_string(&response)?;
    resp.push('\n');
    writer.write_all(resp.as_bytes()).await?;
    Ok(())
}

fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": {"code": code, "message": message},
        "id": id,
    })
}

fn params<'a, D: Deserialize<'a>>(request: &'a Value) -> Result<D, String> {
    D::deserialize(&request["params"]).map_err(|e| format!("invalid params: {e}"))
}

/// Answer one request. Always returns a complete JSON-RPC response.
pub(crate) async fn dispatch<P, T, M>(state: &DaemonState<P, T, M>, request: &Value) -> Value
where
    P: DataProvider,
    T: MessageTransport + 'static,
    M: MenuCatalog + 'static,
{
    let method = request["method"].as_str().unwrap_or("");
    let id = request["id"].clone();

    let result: Result<Value, (i64, String)> = match method {
        "action" => match params::<ActionParams>(request) {
            Ok(p) => match state.handler.handle(p.chat_id, p.action).await {
                Ok(outcome) => to_value(&outcome),
                Err(e) => Err((ACTION_FAILED, e.to_string())),
            },
            Err(msg) => Err((INVALID_PARAMS, msg)),
        },
        "list_subscriptions" => match params::<ChatParams>(request) {
            Ok(p) => match state.store.list_by_user(p.chat_id) {
                Ok(subs) => to_value(&subs),
                Err(e) => Err((INTERNAL_ERROR, e.to_string())),
            },
            Err(msg) => Err((INVALID_PARAMS, msg)),
        },
        "list_targets" => to_value(&state.poller.snapshots()),
        "status" => Ok(build_status(state)),
        _ => Err((METHOD_NOT_FOUND, "method not found".to_string())),
    };

    match result {
        Ok(result) => json!({
            "jsonrpc": "2.0",
            "result": result,
            "id": id,
        }),
        Err((code, message)) => error_response(id, code, &message),
    }
}

fn to_value<S: serde::Serialize>(v: &S) -> Result<Value, (i64, String)> {
    serde_json::to_value(v).map_err(|e| (INTERNAL_ERROR, e.to_string()))
}

pub(crate) fn build_status<P, T, M>(state: &DaemonState<P, T, M>) -> Value
where
    P: DataProvider,
    T: MessageTransport + 'static,
    M: MenuCatalog + 'static,
{
    let targets = state
        .store
        .distinct_targets()
        .map(|t| t.len())
        .unwrap_or_default();
    json!({
        "started_at": state.started_at.to_rfc3339(),
        "policy": state.policy,
        "targets": targets,
        "sessions": state.ui.session_count(),
        "last_cycle": state.poller.last_report(),
    })
}
