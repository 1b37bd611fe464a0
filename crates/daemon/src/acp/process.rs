// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stdio ACP adapter: spawns the provider's child process and speaks
//! newline-delimited JSON-RPC 2.0 over its pipes.
//!
//! Incoming traffic is parsed with tolerant `Value` navigation rather than
//! strict structs so shape drift in an assistant release degrades to a
//! skipped update instead of a dead connection.

use super::rpc::{Incoming, RpcPeer};
use super::{
    AcpAdapter, AcpConnection, AcpError, AcpEvent, ClientCapabilities, PermissionAsk,
    PromptResult, SessionOpened, SessionUpdate,
};
use async_trait::async_trait;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use paseo_core::{
    ContentBlock, PermissionOption, PermissionOptionKind, PermissionOutcome, ProviderOptions,
    SessionMode, SessionModeState, StopReason, ToolCall, ToolCallStatus,
};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

/// Production adapter: one child process per connection.
#[derive(Debug, Default)]
pub struct ProcessAcpAdapter;

impl ProcessAcpAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AcpAdapter for ProcessAcpAdapter {
    async fn spawn(
        &self,
        provider: &ProviderOptions,
        cwd: &Path,
        events: mpsc::Sender<AcpEvent>,
    ) -> Result<Arc<dyn AcpConnection>, AcpError> {
        let argv = provider.command();
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| AcpError::SpawnFailed("empty provider command".to_string()))?;

        let mut child = tokio::process::Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AcpError::SpawnFailed(format!("{}: {}", program, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AcpError::SpawnFailed("child stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AcpError::SpawnFailed("child stdout unavailable".to_string()))?;
        let stderr = child.stderr.take();

        let pid = child.id().map(|p| p as i32);
        let peer = Arc::new(RpcPeer::new(stdin));
        let (exit_tx, exit_rx) = watch::channel(false);

        let conn = Arc::new(ProcessAcpConnection {
            peer: Arc::clone(&peer),
            pid,
            exited: exit_rx,
        });

        // Reader: classify frames and route them.
        {
            let peer = Arc::clone(&peer);
            let events = events.clone();
            let cwd = cwd.to_path_buf();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let incoming: Incoming = match serde_json::from_str(&line) {
                        Ok(m) => m,
                        Err(e) => {
                            debug!(err = %e, "skipping non-jsonrpc line from agent");
                            continue;
                        }
                    };
                    route_incoming(incoming, &peer, &events, &cwd).await;
                }
                peer.close();
            });
        }

        // Stderr: surface agent diagnostics at debug level.
        if let Some(stderr) = stderr {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "paseo::acp::stderr", "{}", line);
                }
            });
        }

        // Reaper: report exit exactly once.
        {
            let peer = Arc::clone(&peer);
            tokio::spawn(async move {
                let code = match child.wait().await {
                    Ok(status) => status.code(),
                    Err(e) => {
                        warn!(err = %e, "wait on agent child failed");
                        None
                    }
                };
                peer.close();
                let _ = exit_tx.send(true);
                let _ = events.send(AcpEvent::ProcessExited { code }).await;
            });
        }

        Ok(conn)
    }
}

/// Deadline for session-management requests. Prompt turns are bounded by
/// the manager's turn timeout instead, since they legitimately run long.
const ACP_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

struct ProcessAcpConnection {
    peer: Arc<RpcPeer>,
    pid: Option<i32>,
    exited: watch::Receiver<bool>,
}

impl ProcessAcpConnection {
    async fn request_bounded(&self, method: &str, params: Value) -> Result<Value, AcpError> {
        tokio::time::timeout(ACP_REQUEST_TIMEOUT, self.peer.request(method, params))
            .await
            .map_err(|_| AcpError::Timeout)?
    }
}

#[async_trait]
impl AcpConnection for ProcessAcpConnection {
    async fn initialize(&self, caps: ClientCapabilities) -> Result<(), AcpError> {
        self.request_bounded(
            "initialize",
            json!({
                "protocolVersion": 1,
                "clientCapabilities": {
                    "fs": {
                        "readTextFile": caps.read_text_file,
                        "writeTextFile": caps.write_text_file,
                    },
                },
            }),
        )
        .await?;
        Ok(())
    }

    async fn new_session(&self, cwd: &Path) -> Result<SessionOpened, AcpError> {
        let result = self
            .request_bounded("session/new", json!({ "cwd": cwd, "mcpServers": [] }))
            .await?;
        parse_session_opened(&result)
    }

    async fn load_session(
        &self,
        session_id: &str,
        cwd: &Path,
    ) -> Result<SessionOpened, AcpError> {
        let result = self
            .request_bounded(
                "session/load",
                json!({ "sessionId": session_id, "cwd": cwd, "mcpServers": [] }),
            )
            .await?;
        // load responses may omit the session id; the caller keeps its own.
        let mut opened = parse_session_opened(&result).unwrap_or(SessionOpened {
            session_id: session_id.to_string(),
            modes: None,
        });
        if opened.session_id.is_empty() {
            opened.session_id = session_id.to_string();
        }
        Ok(opened)
    }

    async fn prompt(
        &self,
        session_id: &str,
        content: Vec<ContentBlock>,
    ) -> Result<PromptResult, AcpError> {
        let blocks: Vec<Value> = content.iter().map(content_block_json).collect();
        let result = self
            .peer
            .request("session/prompt", json!({ "sessionId": session_id, "prompt": blocks }))
            .await?;
        let stop_reason = result
            .get("stopReason")
            .and_then(Value::as_str)
            .map(parse_stop_reason)
            .unwrap_or(StopReason::Other);
        Ok(PromptResult { stop_reason })
    }

    async fn cancel(&self, session_id: &str) -> Result<(), AcpError> {
        self.peer.notify("session/cancel", json!({ "sessionId": session_id })).await
    }

    async fn set_session_mode(&self, session_id: &str, mode_id: &str) -> Result<(), AcpError> {
        self.request_bounded(
            "session/setMode",
            json!({ "sessionId": session_id, "modeId": mode_id }),
        )
        .await?;
        Ok(())
    }

    async fn terminate(&self, grace: Duration) {
        let Some(pid) = self.pid else { return };
        let pid = Pid::from_raw(pid);
        if *self.exited.borrow() {
            return;
        }
        let _ = kill(pid, Signal::SIGTERM);

        let mut exited = self.exited.clone();
        let done = tokio::time::timeout(grace, async {
            while !*exited.borrow() {
                if exited.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;

        if done.is_err() && !*self.exited.borrow() {
            warn!(pid = pid.as_raw(), "agent ignored SIGTERM, escalating to SIGKILL");
            let _ = kill(pid, Signal::SIGKILL);
        }
    }
}

/// Dispatch one incoming frame from the agent.
async fn route_incoming(
    incoming: Incoming,
    peer: &Arc<RpcPeer>,
    events: &mpsc::Sender<AcpEvent>,
    cwd: &Path,
) {
    if incoming.is_response() {
        peer.resolve(incoming);
        return;
    }

    if incoming.is_notification() {
        let method = incoming.method.as_deref().unwrap_or_default();
        if method == "session/update" {
            if let Some(update) = incoming.params.as_ref().and_then(parse_session_update) {
                let _ = events.send(AcpEvent::Update(update)).await;
            }
        } else {
            debug!(method, "ignoring unknown agent notification");
        }
        return;
    }

    if incoming.is_request() {
        let method = incoming.method.clone().unwrap_or_default();
        let Some(id) = incoming.id.clone() else { return };
        match method.as_str() {
            "session/request_permission" => {
                handle_permission_request(incoming, id, peer, events).await;
            }
            "fs/read_text_file" => {
                handle_fs_read(incoming, id, peer, cwd).await;
            }
            "fs/write_text_file" => {
                handle_fs_write(incoming, id, peer, cwd).await;
            }
            _ => {
                peer.respond_err(id, -32601, "method not found").await;
            }
        }
    }
}

/// Bridge one permission request to a manager-side decision.
async fn handle_permission_request(
    incoming: Incoming,
    id: Value,
    peer: &Arc<RpcPeer>,
    events: &mpsc::Sender<AcpEvent>,
) {
    let params = incoming.params.unwrap_or(Value::Null);
    let acp_session_id = params
        .get("sessionId")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let tool_call = params
        .get("toolCall")
        .map(parse_tool_call)
        .unwrap_or_else(|| ToolCall {
            tool_call_id: String::new(),
            title: "unnamed tool call".to_string(),
            kind: None,
            status: ToolCallStatus::Pending,
            raw_input: None,
        });
    let options = params
        .get("options")
        .and_then(Value::as_array)
        .map(|opts| opts.iter().filter_map(parse_permission_option).collect())
        .unwrap_or_default();

    let (responder, decided) = oneshot::channel();
    let ask = PermissionAsk {
        request_id: format!("perm-{}", nanoid::nanoid!(12)),
        acp_session_id,
        tool_call,
        options,
        responder,
    };
    if events.send(AcpEvent::Permission(ask)).await.is_err() {
        peer.respond_ok(id, json!({ "outcome": { "outcome": "cancelled" } })).await;
        return;
    }

    // Answer the agent when (and only when) the manager resolves.
    let peer = Arc::clone(peer);
    tokio::spawn(async move {
        let outcome = match decided.await {
            Ok(PermissionOutcome::Selected { option_id }) => {
                json!({ "outcome": { "outcome": "selected", "optionId": option_id } })
            }
            Ok(PermissionOutcome::Cancelled) | Err(_) => {
                json!({ "outcome": { "outcome": "cancelled" } })
            }
        };
        peer.respond_ok(id, outcome).await;
    });
}

async fn handle_fs_read(incoming: Incoming, id: Value, peer: &Arc<RpcPeer>, cwd: &Path) {
    let params = incoming.params.unwrap_or(Value::Null);
    let Some(path) = params.get("path").and_then(Value::as_str) else {
        peer.respond_err(id, -32602, "missing path").await;
        return;
    };
    let resolved = resolve_path(cwd, path);
    match tokio::fs::read_to_string(&resolved).await {
        Ok(mut content) => {
            if let Some(limit) = params.get("limit").and_then(Value::as_u64) {
                content = content.lines().take(limit as usize).collect::<Vec<_>>().join("\n");
            }
            peer.respond_ok(id, json!({ "content": content })).await;
        }
        Err(e) => {
            peer.respond_err(id, -32000, &format!("read {}: {}", resolved.display(), e)).await;
        }
    }
}

async fn handle_fs_write(incoming: Incoming, id: Value, peer: &Arc<RpcPeer>, cwd: &Path) {
    let params = incoming.params.unwrap_or(Value::Null);
    let (Some(path), Some(content)) = (
        params.get("path").and_then(Value::as_str),
        params.get("content").and_then(Value::as_str),
    ) else {
        peer.respond_err(id, -32602, "missing path or content").await;
        return;
    };
    let resolved = resolve_path(cwd, path);
    match tokio::fs::write(&resolved, content).await {
        Ok(()) => peer.respond_ok(id, Value::Null).await,
        Err(e) => {
            peer.respond_err(id, -32000, &format!("write {}: {}", resolved.display(), e)).await;
        }
    }
}

fn resolve_path(cwd: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        cwd.join(p)
    }
}

fn content_block_json(block: &ContentBlock) -> Value {
    match block {
        ContentBlock::Text { text } => json!({ "type": "text", "text": text }),
        ContentBlock::ResourceLink { uri, name } => {
            json!({ "type": "resource_link", "uri": uri, "name": name })
        }
    }
}

fn parse_session_opened(result: &Value) -> Result<SessionOpened, AcpError> {
    let session_id = result
        .get("sessionId")
        .and_then(Value::as_str)
        .ok_or_else(|| AcpError::Protocol("session response missing sessionId".to_string()))?
        .to_string();
    Ok(SessionOpened { session_id, modes: parse_modes(result.get("modes")) })
}

fn parse_modes(modes: Option<&Value>) -> Option<SessionModeState> {
    let modes = modes?;
    let available = modes
        .get("availableModes")
        .and_then(Value::as_array)?
        .iter()
        .filter_map(|m| {
            Some(SessionMode::new(
                m.get("id").and_then(Value::as_str)?,
                m.get("name").and_then(Value::as_str).unwrap_or_default(),
            ))
        })
        .collect::<Vec<_>>();
    Some(SessionModeState {
        current_mode_id: modes
            .get("currentModeId")
            .and_then(Value::as_str)
            .map(str::to_string),
        available_modes: available,
    })
}

pub(crate) fn parse_stop_reason(raw: &str) -> StopReason {
    match raw {
        "end_turn" => StopReason::EndTurn,
        "refusal" => StopReason::Refusal,
        "cancelled" => StopReason::Cancelled,
        _ => StopReason::Other,
    }
}

/// Parse one `session/update` notification payload.
pub(crate) fn parse_session_update(params: &Value) -> Option<SessionUpdate> {
    let update = params.get("update")?;
    let kind = update.get("sessionUpdate").and_then(Value::as_str)?;
    match kind {
        "agent_message_chunk" => Some(SessionUpdate::AgentMessageChunk {
            content: parse_content(update.get("content")),
        }),
        "agent_thought_chunk" => Some(SessionUpdate::AgentThoughtChunk {
            content: parse_content(update.get("content")),
        }),
        "tool_call" => Some(SessionUpdate::ToolCall(parse_tool_call(update))),
        "tool_call_update" => Some(SessionUpdate::ToolCallUpdate {
            tool_call_id: update
                .get("toolCallId")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            status: update.get("status").and_then(Value::as_str).map(parse_tool_status),
            raw_output: update.get("rawOutput").cloned(),
        }),
        "current_mode_update" => Some(SessionUpdate::ModeChanged {
            mode_id: update
                .get("currentModeId")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }),
        other => {
            debug!(kind = other, "ignoring unhandled session update kind");
            None
        }
    }
}

/// Normalize a single block or an array of blocks.
fn parse_content(content: Option<&Value>) -> Vec<ContentBlock> {
    let Some(content) = content else { return Vec::new() };
    let blocks: Vec<&Value> = match content {
        Value::Array(items) => items.iter().collect(),
        single => vec![single],
    };
    blocks
        .into_iter()
        .filter_map(|b| match b.get("type").and_then(Value::as_str) {
            Some("text") => Some(ContentBlock::Text {
                text: b.get("text").and_then(Value::as_str).unwrap_or_default().to_string(),
            }),
            Some("resource_link") => Some(ContentBlock::ResourceLink {
                uri: b.get("uri").and_then(Value::as_str).unwrap_or_default().to_string(),
                name: b.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
            }),
            _ => None,
        })
        .collect()
}

fn parse_tool_call(value: &Value) -> ToolCall {
    ToolCall {
        tool_call_id: value
            .get("toolCallId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        title: value.get("title").and_then(Value::as_str).unwrap_or_default().to_string(),
        kind: value.get("kind").and_then(Value::as_str).map(str::to_string),
        status: value
            .get("status")
            .and_then(Value::as_str)
            .map(parse_tool_status)
            .unwrap_or(ToolCallStatus::Pending),
        raw_input: value.get("rawInput").cloned(),
    }
}

fn parse_tool_status(raw: &str) -> ToolCallStatus {
    match raw {
        "in_progress" => ToolCallStatus::InProgress,
        "completed" => ToolCallStatus::Completed,
        "failed" => ToolCallStatus::Failed,
        _ => ToolCallStatus::Pending,
    }
}

fn parse_permission_option(value: &Value) -> Option<PermissionOption> {
    Some(PermissionOption {
        kind: match value.get("kind").and_then(Value::as_str).unwrap_or("allow_once") {
            "allow_always" => PermissionOptionKind::AllowAlways,
            "reject_once" => PermissionOptionKind::RejectOnce,
            "reject_always" => PermissionOptionKind::RejectAlways,
            _ => PermissionOptionKind::AllowOnce,
        },
        option_id: value.get("optionId").and_then(Value::as_str)?.to_string(),
        name: value.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
    })
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
