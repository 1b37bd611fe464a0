// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal JSON-RPC 2.0 peer over the child's stdio.
//!
//! Frames are newline-delimited JSON objects. Outgoing requests are
//! correlated by a numeric id; incoming traffic is classified by the caller
//! (response vs agent-initiated request vs notification).

use super::AcpError;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::oneshot;
use tracing::debug;

/// One incoming frame, before classification.
#[derive(Debug, Deserialize)]
pub struct Incoming {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl Incoming {
    pub fn is_notification(&self) -> bool {
        self.method.is_some() && self.id.is_none()
    }

    pub fn is_request(&self) -> bool {
        self.method.is_some() && self.id.is_some()
    }

    pub fn is_response(&self) -> bool {
        self.method.is_none() && self.id.is_some()
    }
}

/// Writer half + outgoing request correlation.
pub struct RpcPeer {
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    pending: parking_lot::Mutex<HashMap<u64, oneshot::Sender<Result<Value, AcpError>>>>,
    next_id: AtomicU64,
}

impl RpcPeer {
    pub fn new(stdin: ChildStdin) -> Self {
        Self {
            stdin: tokio::sync::Mutex::new(Some(stdin)),
            pending: parking_lot::Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    async fn send_value(&self, value: Value) -> Result<(), AcpError> {
        let mut line = value.to_string();
        line.push('\n');
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(AcpError::Closed)?;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| AcpError::Protocol(format!("stdin write: {}", e)))?;
        stdin.flush().await.map_err(|e| AcpError::Protocol(format!("stdin flush: {}", e)))?;
        Ok(())
    }

    /// Send a request and await the correlated response.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, AcpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let frame = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        if let Err(e) = self.send_value(frame).await {
            self.pending.lock().remove(&id);
            return Err(e);
        }

        rx.await.map_err(|_| AcpError::Closed)?
    }

    /// Fire-and-forget notification.
    pub async fn notify(&self, method: &str, params: Value) -> Result<(), AcpError> {
        self.send_value(json!({ "jsonrpc": "2.0", "method": method, "params": params })).await
    }

    /// Answer an agent-initiated request.
    pub async fn respond_ok(&self, id: Value, result: Value) {
        let frame = json!({ "jsonrpc": "2.0", "id": id, "result": result });
        if let Err(e) = self.send_value(frame).await {
            debug!(err = %e, "failed to write rpc response");
        }
    }

    /// Answer an agent-initiated request with an error.
    pub async fn respond_err(&self, id: Value, code: i64, message: &str) {
        let frame = json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": code, "message": message },
        });
        if let Err(e) = self.send_value(frame).await {
            debug!(err = %e, "failed to write rpc error response");
        }
    }

    /// Route an incoming response frame to its waiter.
    pub fn resolve(&self, incoming: Incoming) {
        let Some(id) = incoming.id.as_ref().and_then(Value::as_u64) else {
            debug!("response frame without numeric id");
            return;
        };
        let Some(waiter) = self.pending.lock().remove(&id) else {
            debug!(id, "response for unknown request id");
            return;
        };
        let outcome = match incoming.error {
            Some(err) => Err(AcpError::Agent(
                err.get("message").and_then(Value::as_str).unwrap_or("unknown error").to_string(),
            )),
            None => Ok(incoming.result.unwrap_or(Value::Null)),
        };
        let _ = waiter.send(outcome);
    }

    /// Fail every in-flight request (process exited, pipe closed).
    pub fn close(&self) {
        let waiters: Vec<_> = self.pending.lock().drain().collect();
        for (_, waiter) in waiters {
            let _ = waiter.send(Err(AcpError::Closed));
        }
    }
}

#[cfg(test)]
#[path = "rpc_tests.rs"]
mod tests;
