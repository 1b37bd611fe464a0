// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prompt turns and the adapter notification pump.

use super::{AgentManager, AgentState, ManagedAgent, ManagerError, CANCEL_SETTLE};
use crate::acp::{AcpEvent, SessionUpdate};
use crate::env;
use paseo_core::{AgentId, AgentStatus, PromptContent, StopReason, TimelineEntry};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

impl AgentManager {
    /// Start a prompt turn. Streaming results arrive on the agent's update
    /// stream; this returns once the turn is scheduled.
    pub async fn send_prompt(
        &self,
        id: &AgentId,
        prompt: PromptContent,
        session_mode: Option<String>,
        message_id: Option<String>,
    ) -> Result<(), ManagerError> {
        if prompt.is_empty() {
            return Err(ManagerError::Validation("prompt must not be empty".to_string()));
        }
        let agent = self.get(id)?;
        let _guard = agent.op_lock.lock().await;

        {
            let state = agent.state.lock();
            if state.status().is_terminal() {
                return Err(ManagerError::Precondition(state.status()));
            }
        }

        // A new prompt preempts the in-flight turn: best-effort cancel with
        // a short settle window, then cancel every outstanding permission.
        let processing = {
            let state = agent.state.lock();
            match &*state {
                AgentState::Processing { runtime, .. } => Some(runtime.clone()),
                _ => None,
            }
        };
        if let Some(runtime) = processing {
            if let Err(e) = runtime.conn.cancel(&runtime.acp_session_id).await {
                debug!(agent_id = %agent.id, err = %e, "auto-cancel before prompt failed");
            }
            tokio::time::sleep(CANCEL_SETTLE).await;
        }
        self.cancel_pending_permissions(&agent);

        let runtime = self.ensure_initialized_locked(&agent).await?;

        if let Some(requested) = session_mode {
            self.apply_prompt_mode(&agent, &runtime, requested).await;
        }

        // Synthetic user chunk: a turn boundary, carrying the caller's id
        // when provided so clients can dedupe on reconnect.
        self.turn_boundary(&agent);
        let user_message_id =
            message_id.unwrap_or_else(|| format!("msg-{}", nanoid::nanoid!(19)));
        self.emit_entry(
            &agent,
            TimelineEntry::UserMessageChunk {
                message_id: user_message_id,
                content: prompt.clone().into_blocks(),
            },
        );
        self.touch_and_persist(&agent);

        let turn_gen = agent.turn_gen.fetch_add(1, Ordering::SeqCst) + 1;
        *agent.state.lock() =
            AgentState::Processing { runtime: runtime.clone(), turn_gen };
        self.emit_status(&agent, AgentStatus::Processing, None, None);

        let manager = self.clone();
        let agent_task = Arc::clone(&agent);
        let blocks = prompt.into_blocks();
        tokio::spawn(async move {
            let outcome = tokio::time::timeout(
                env::turn_timeout(),
                runtime.conn.prompt(&runtime.acp_session_id, blocks),
            )
            .await;
            let result = match outcome {
                Ok(Ok(result)) => Ok(result.stop_reason),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err("prompt turn timed out".to_string()),
            };
            manager.apply_turn_end(&agent_task, turn_gen, result).await;
        });

        Ok(())
    }

    /// Best-effort cancel of the in-flight turn. No-op outside `processing`.
    pub async fn cancel_agent(&self, id: &AgentId) -> Result<(), ManagerError> {
        let agent = self.get(id)?;
        let _guard = agent.op_lock.lock().await;

        let runtime = {
            let state = agent.state.lock();
            match &*state {
                AgentState::Processing { runtime, .. } => runtime.clone(),
                _ => return Ok(()),
            }
        };
        runtime.conn.cancel(&runtime.acp_session_id).await?;

        // Acknowledged: settle into ready now. The turn task's own
        // completion is ignored because the state left `processing`.
        {
            let mut state = agent.state.lock();
            if matches!(&*state, AgentState::Processing { .. }) {
                *state = AgentState::Ready { runtime };
            }
        }
        self.cancel_pending_permissions(&agent);
        self.emit_status(&agent, AgentStatus::Ready, Some(StopReason::Cancelled), None);
        Ok(())
    }

    /// Settle a finished turn. Ignores stale completions (the agent was
    /// cancelled, killed, or re-prompted since).
    pub(crate) async fn apply_turn_end(
        &self,
        agent: &Arc<ManagedAgent>,
        turn_gen: u64,
        result: Result<StopReason, String>,
    ) {
        let _guard = agent.op_lock.lock().await;

        let runtime = {
            let state = agent.state.lock();
            match &*state {
                AgentState::Processing { runtime, turn_gen: current }
                    if *current == turn_gen =>
                {
                    runtime.clone()
                }
                _ => {
                    debug!(agent_id = %agent.id, turn_gen, "ignoring stale turn completion");
                    return;
                }
            }
        };

        self.cancel_pending_permissions(agent);

        match result {
            Ok(stop_reason) => {
                let status = stop_reason.settled_status();
                *agent.state.lock() = match status {
                    AgentStatus::Ready => AgentState::Ready { runtime },
                    _ => AgentState::Completed { runtime, stop_reason },
                };
                self.emit_status(agent, status, Some(stop_reason), None);
            }
            Err(message) => {
                warn!(agent_id = %agent.id, err = %message, "prompt turn failed");
                *agent.state.lock() = AgentState::Failed {
                    last_error: message.clone(),
                    runtime: Some(runtime),
                };
                self.emit_status(agent, AgentStatus::Failed, None, Some(message));
            }
        }
        self.touch_and_persist(agent);
    }

    /// Apply a per-prompt session mode, remapping unknown modes to the
    /// provider default rather than failing the prompt.
    async fn apply_prompt_mode(
        &self,
        agent: &Arc<ManagedAgent>,
        runtime: &super::AgentRuntime,
        requested: String,
    ) {
        let target = if runtime.mode.contains(&requested) {
            requested
        } else {
            let provider = agent.record.lock().provider.clone();
            match provider.default_mode_id() {
                Some(default) if runtime.mode.contains(default) => {
                    warn!(agent_id = %agent.id, mode = %requested,
                        "unknown session mode on prompt, using provider default");
                    default.to_string()
                }
                _ => return,
            }
        };
        if runtime.mode.current_mode_id.as_deref() == Some(target.as_str()) {
            return;
        }
        match runtime.conn.set_session_mode(&runtime.acp_session_id, &target).await {
            Ok(()) => self.set_current_mode(agent, &target),
            Err(e) => {
                warn!(agent_id = %agent.id, mode = %target, err = %e, "mode switch failed")
            }
        }
    }
}

/// Translate adapter events into enriched timeline entries.
///
/// Chunked agent/thought messages share a minted `message_id` until a turn
/// boundary (`tool_call` here, `user_message_chunk` in `send_prompt`).
pub(crate) async fn pump_events(
    manager: AgentManager,
    agent: Arc<ManagedAgent>,
    mut rx: mpsc::Receiver<AcpEvent>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            AcpEvent::Update(update) => apply_update(&manager, &agent, update),
            AcpEvent::Permission(ask) => manager.register_permission(&agent, ask),
            AcpEvent::ProcessExited { code } => {
                handle_process_exit(&manager, &agent, code).await;
            }
        }
    }
}

fn apply_update(manager: &AgentManager, agent: &Arc<ManagedAgent>, update: SessionUpdate) {
    match update {
        SessionUpdate::AgentMessageChunk { content } => {
            let message_id = manager.chunk_message_id(agent);
            manager.emit_entry(agent, TimelineEntry::AgentMessageChunk { message_id, content });
        }
        SessionUpdate::AgentThoughtChunk { content } => {
            let message_id = manager.chunk_message_id(agent);
            manager.emit_entry(agent, TimelineEntry::AgentThoughtChunk { message_id, content });
        }
        SessionUpdate::ToolCall(tool_call) => {
            manager.turn_boundary(agent);
            manager.emit_entry(agent, TimelineEntry::ToolCall { tool_call });
        }
        SessionUpdate::ToolCallUpdate { tool_call_id, status, raw_output } => {
            manager.emit_entry(
                agent,
                TimelineEntry::ToolCallUpdate { tool_call_id, status, raw_output },
            );
        }
        SessionUpdate::ModeChanged { mode_id } => {
            manager.set_current_mode(agent, &mode_id);
        }
    }
}

/// Unexpected child exit fails the agent unless it already settled.
async fn handle_process_exit(
    manager: &AgentManager,
    agent: &Arc<ManagedAgent>,
    code: Option<i32>,
) {
    let _guard = agent.op_lock.lock().await;
    let should_fail = {
        let state = agent.state.lock();
        matches!(
            &*state,
            AgentState::Ready { .. }
                | AgentState::Processing { .. }
                | AgentState::Initializing
        )
    };
    if !should_fail {
        return;
    }
    let message = match code {
        Some(code) => format!("agent process exited with code {}", code),
        None => "agent process exited".to_string(),
    };
    warn!(agent_id = %agent.id, %message, "unexpected agent exit");
    *agent.state.lock() = AgentState::Failed { last_error: message.clone(), runtime: None };
    manager.cancel_pending_permissions(agent);
    manager.emit_status(agent, AgentStatus::Failed, None, Some(message));
}
