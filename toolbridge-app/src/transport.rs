//! Line-delimited JSON over a byte stream.
//!
//! Each input line is one request:
//! `{"id": .., "method": "tools/list" | "tools/call" | "cancel", "params": {..}}`.
//! Each output line is one response carrying the same `id`. Calls run
//! concurrently, so responses may arrive in a different order than the
//! requests; a single writer task keeps lines whole.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use toolbridge_core::{CallRequest, DispatchEngine};

#[derive(Debug, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Response {
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    fn ok(id: Value, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

type InFlight = Arc<Mutex<HashMap<String, CancellationToken>>>;

fn flight_key(id: &Value) -> String {
    id.to_string()
}

/// Serve requests from `reader` until it reaches end of input, then wait
/// for calls still running and flush their responses.
pub async fn serve<R, W>(engine: DispatchEngine, reader: R, writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel::<Response>();
    let writer_task = tokio::spawn(write_responses(writer, rx));
    let in_flight: InFlight = Arc::new(Mutex::new(HashMap::new()));
    let mut calls = JoinSet::new();

    let mut lines = reader.lines();
    loop {
        // Finished calls are reaped while waiting for input.
        let line = tokio::select! {
            Some(joined) = calls.join_next(), if !calls.is_empty() => {
                reap(joined);
                continue;
            }
            line = lines.next_line() => line.context("Failed to read request")?,
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Malformed request line");
                let _ = tx.send(Response::error(Value::Null, format!("Invalid request: {}", e)));
                continue;
            }
        };
        debug!(method = %request.method, "Request received");

        match request.method.as_str() {
            "tools/list" => {
                let tools = engine.registry().schemas();
                let _ = tx.send(Response::ok(request.id, json!({ "tools": tools })));
            }
            "tools/call" => {
                let params: CallParams = match serde_json::from_value(request.params) {
                    Ok(params) => params,
                    Err(e) => {
                        let _ = tx.send(Response::error(
                            request.id,
                            format!("Invalid call params: {}", e),
                        ));
                        continue;
                    }
                };

                let key = flight_key(&request.id);
                let cancel = CancellationToken::new();
                match in_flight.lock().entry(key.clone()) {
                    Entry::Occupied(_) => {
                        warn!(call = %key, "Duplicate call id");
                        let _ = tx.send(Response::error(
                            request.id,
                            format!("Call id already in flight: {}", key),
                        ));
                        continue;
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(cancel.clone());
                    }
                }

                let engine = engine.clone();
                let in_flight = in_flight.clone();
                let tx = tx.clone();
                let id = request.id;
                calls.spawn(async move {
                    let arguments = match params.arguments {
                        Value::Null => Value::Object(Map::new()),
                        other => other,
                    };
                    let envelope = engine
                        .dispatch_with_cancel(CallRequest::new(params.name, arguments), cancel)
                        .await;
                    in_flight.lock().remove(&key);
                    let result = serde_json::to_value(&envelope)
                        .unwrap_or_else(|e| json!({"status": "failure", "message": e.to_string()}));
                    let _ = tx.send(Response::ok(id, result));
                });
            }
            "cancel" => {
                let target = request.params.get("id").cloned().unwrap_or(Value::Null);
                let token = in_flight.lock().get(&flight_key(&target)).cloned();
                let cancelled = match token {
                    Some(token) => {
                        token.cancel();
                        true
                    }
                    None => false,
                };
                debug!(call = %target, cancelled, "Cancel requested");
                let _ = tx.send(Response::ok(request.id, json!({ "cancelled": cancelled })));
            }
            other => {
                let _ = tx.send(Response::error(
                    request.id,
                    format!("Unknown method: {}", other),
                ));
            }
        }
    }

    while let Some(joined) = calls.join_next().await {
        reap(joined);
    }
    drop(tx);

    writer_task.await.context("Response writer stopped")?
}

fn reap(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        warn!(error = %e, "Call task failed");
    }
}

async fn write_responses<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Response>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = serde_json::to_string(&response).context("Failed to encode response")?;
        line.push('\n');
        writer
            .write_all(line.as_bytes())
            .await
            .context("Failed to write response")?;
        writer.flush().await.context("Failed to flush response")?;
    }
    Ok(())
}
