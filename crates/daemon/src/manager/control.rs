// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kill, delete, mode switching, and daemon shutdown.

use super::{AgentManager, AgentState, DirectoryChange, ManagerError, KILL_LINGER};
use crate::env;
use paseo_core::{AgentId, AgentStatus};
use std::sync::Arc;
use tracing::{info, warn};

impl AgentManager {
    /// Switch the live session's mode; errors from the adapter propagate.
    ///
    /// Before initialization the mode is validated against the provider's
    /// static modes and held as the pending session mode.
    pub async fn set_session_mode(&self, id: &AgentId, mode_id: &str) -> Result<(), ManagerError> {
        let agent = self.get(id)?;
        let _guard = agent.op_lock.lock().await;

        let runtime = {
            let state = agent.state.lock();
            if state.status().is_terminal() {
                return Err(ManagerError::Precondition(state.status()));
            }
            state.runtime().cloned()
        };

        match runtime {
            Some(runtime) => {
                let known = if runtime.mode.available_modes.is_empty() {
                    let provider = agent.record.lock().provider.clone();
                    provider.static_modes().iter().any(|m| m.id == mode_id)
                } else {
                    runtime.mode.contains(mode_id)
                };
                if !known {
                    return Err(ManagerError::Validation(format!(
                        "unknown session mode: {}",
                        mode_id
                    )));
                }
                runtime.conn.set_session_mode(&runtime.acp_session_id, mode_id).await?;
                self.set_current_mode(&agent, mode_id);
                self.touch_and_persist(&agent);
                Ok(())
            }
            None => {
                let provider = agent.record.lock().provider.clone();
                if !provider.static_modes().iter().any(|m| m.id == mode_id) {
                    return Err(ManagerError::Validation(format!(
                        "unknown session mode: {}",
                        mode_id
                    )));
                }
                *agent.pending_mode.lock() = Some(mode_id.to_string());
                Ok(())
            }
        }
    }

    /// Kill the agent process. Always succeeds from the caller's view: the
    /// final status is emitted, pending permissions cancel, the child is
    /// terminated with bounded escalation, and the record leaves the
    /// in-memory set shortly after.
    pub async fn kill_agent(&self, id: &AgentId) -> Result<(), ManagerError> {
        let agent = self.get(id)?;
        let _guard = agent.op_lock.lock().await;

        self.touch_and_persist(&agent);

        let previous = std::mem::replace(&mut *agent.state.lock(), AgentState::Killed);
        self.cancel_pending_permissions(&agent);
        self.emit_status(&agent, AgentStatus::Killed, None, None);

        if let Some(runtime) = previous.runtime() {
            let conn = Arc::clone(&runtime.conn);
            tokio::spawn(async move {
                conn.terminate(env::kill_grace()).await;
            });
        }
        info!(agent_id = %agent.id, "agent killed");

        // Linger briefly so late subscribers can read the final status.
        let manager = self.clone();
        let agent_id = agent.id;
        tokio::spawn(async move {
            tokio::time::sleep(KILL_LINGER).await;
            manager.inner.agents.lock().remove(agent_id.as_str());
            manager.notify_directory(DirectoryChange::Removed(agent_id));
        });
        Ok(())
    }

    /// Kill the agent and remove its persisted record.
    pub async fn delete_agent(&self, id: &AgentId) -> Result<(), ManagerError> {
        self.kill_agent(id).await?;
        self.inner.store.remove(*id);
        Ok(())
    }

    /// Drain processing agents (bounded), persist, and terminate children.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();

        let agents: Vec<_> = self.inner.agents.lock().values().cloned().collect();

        // Wait for in-flight turns up to the drain deadline, all at once.
        let drain = env::drain_timeout();
        let waits = agents.iter().filter_map(|agent| {
            let status = agent.state.lock().status();
            (status == AgentStatus::Processing).then(|| {
                let manager = self.clone();
                let id = agent.id;
                async move {
                    if manager.wait_for_finish(&id, drain).await.is_err() {
                        warn!(agent_id = %id, "drain deadline hit with turn in flight");
                    }
                }
            })
        });
        futures_util::future::join_all(waits).await;

        for agent in &agents {
            let _guard = agent.op_lock.lock().await;
            self.cancel_pending_permissions(agent);
            {
                let record = agent.record.lock();
                self.inner.store.upsert(record.clone());
            }
            let previous = std::mem::replace(&mut *agent.state.lock(), AgentState::Killed);
            if let Some(runtime) = previous.runtime() {
                runtime.conn.terminate(env::kill_grace()).await;
            }
        }
        self.inner.store.flush().await;
        info!(agents = agents.len(), "manager shut down");
    }
}
