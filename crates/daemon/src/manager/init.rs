// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lazy initialization: spawn, handshake, open/load session, mode policy.

use super::{AgentManager, AgentRuntime, AgentState, ManagedAgent, ManagerError};
use crate::acp::{AcpEvent, ClientCapabilities, SessionOpened};
use crate::env;
use paseo_core::{AgentStatus, SessionModeState, TimelineEntry};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Event channel depth between an adapter and its notification pump.
const EVENT_CHANNEL_CAP: usize = 256;

impl AgentManager {
    /// Bring the agent to a state with a live runtime. Callers hold the op
    /// lock, so at most one initialization is ever in flight per agent and
    /// concurrent requests observe its outcome.
    pub(crate) async fn ensure_initialized_locked(
        &self,
        agent: &Arc<ManagedAgent>,
    ) -> Result<AgentRuntime, ManagerError> {
        let persisted_session_id = {
            let state = agent.state.lock();
            if let Some(runtime) = state.runtime() {
                if !matches!(&*state, AgentState::Failed { .. }) {
                    return Ok(runtime.clone());
                }
            }
            match &*state {
                AgentState::Uninitialized { persisted_session_id } => {
                    persisted_session_id.clone()
                }
                AgentState::Killed | AgentState::Failed { .. } => {
                    return Err(ManagerError::Precondition(state.status()));
                }
                // Unreachable under the op lock; recover by re-initializing.
                AgentState::Initializing => None,
                _ => return Err(ManagerError::Precondition(state.status())),
            }
        };

        *agent.state.lock() = AgentState::Initializing;
        self.emit_status(agent, AgentStatus::Initializing, None, None);

        match self.initialize_runtime(agent, persisted_session_id).await {
            Ok(runtime) => {
                *agent.state.lock() = AgentState::Ready { runtime: runtime.clone() };
                self.emit_status(agent, AgentStatus::Ready, None, None);
                self.apply_pending_mode(agent, &runtime).await;
                // pending mode application may have updated the mode state
                let runtime = agent
                    .state
                    .lock()
                    .runtime()
                    .cloned()
                    .unwrap_or(runtime);
                Ok(runtime)
            }
            Err(e) => {
                let message = e.to_string();
                *agent.state.lock() =
                    AgentState::Failed { last_error: message.clone(), runtime: None };
                self.emit_status(agent, AgentStatus::Failed, None, Some(message));
                Err(e)
            }
        }
    }

    /// Spawn the child, handshake, and open or load the session.
    async fn initialize_runtime(
        &self,
        agent: &Arc<ManagedAgent>,
        persisted_session_id: Option<String>,
    ) -> Result<AgentRuntime, ManagerError> {
        let (provider, cwd) = {
            let record = agent.record.lock();
            (record.provider.clone(), record.cwd.clone())
        };

        let (events_tx, events_rx) = mpsc::channel::<AcpEvent>(EVENT_CHANNEL_CAP);
        let conn = self.inner.adapter.spawn(&provider, &cwd, events_tx).await?;

        if let Err(e) = conn.initialize(ClientCapabilities::default()).await {
            conn.terminate(env::kill_grace()).await;
            return Err(e.into());
        }

        let opened = match persisted_session_id
            .filter(|_| provider.supports_session_persistence())
        {
            Some(session_id) => match conn.load_session(&session_id, &cwd).await {
                Ok(opened) => opened,
                Err(e) => {
                    warn!(agent_id = %agent.id, err = %e, "session load failed, opening fresh");
                    match conn.new_session(&cwd).await {
                        Ok(opened) => opened,
                        Err(e) => {
                            conn.terminate(env::kill_grace()).await;
                            return Err(e.into());
                        }
                    }
                }
            },
            None => match conn.new_session(&cwd).await {
                Ok(opened) => opened,
                Err(e) => {
                    conn.terminate(env::kill_grace()).await;
                    return Err(e.into());
                }
            },
        };

        let SessionOpened { session_id, modes } = opened;
        let mode = resolve_modes(&provider, modes);

        // Persist the session id for providers that can reload it.
        if provider.supports_session_persistence() {
            let mut record = agent.record.lock();
            record.persisted_session_id = Some(session_id.clone());
            record.provider = record.provider.clone().with_session_id(Some(session_id.clone()));
            self.inner.store.upsert(record.clone());
        }

        info!(agent_id = %agent.id, session_id = %session_id, "agent session opened");

        // One pump per runtime: it dies when the adapter drops its sender.
        tokio::spawn(super::prompt::pump_events(self.clone(), Arc::clone(agent), events_rx));

        Ok(AgentRuntime { conn, acp_session_id: session_id, mode })
    }

    /// Apply a mode held from before initialization, remapping unknown
    /// modes to the provider default.
    async fn apply_pending_mode(&self, agent: &Arc<ManagedAgent>, runtime: &AgentRuntime) {
        let Some(requested) = agent.pending_mode.lock().take() else { return };
        let provider = agent.record.lock().provider.clone();

        let target = if runtime.mode.contains(&requested) {
            requested
        } else {
            match provider.default_mode_id() {
                Some(default) => {
                    warn!(agent_id = %agent.id, mode = %requested, default,
                        "unknown initial mode, remapping to provider default");
                    default.to_string()
                }
                None => return,
            }
        };

        if runtime.mode.current_mode_id.as_deref() == Some(target.as_str()) {
            return;
        }
        match runtime.conn.set_session_mode(&runtime.acp_session_id, &target).await {
            Ok(()) => self.set_current_mode(agent, &target),
            Err(e) => warn!(agent_id = %agent.id, mode = %target, err = %e,
                "failed to apply pending session mode"),
        }
    }

    /// Update the runtime's current mode in place and record the change.
    pub(crate) fn set_current_mode(&self, agent: &ManagedAgent, mode_id: &str) {
        {
            let mut state = agent.state.lock();
            let runtime = match &mut *state {
                AgentState::Ready { runtime }
                | AgentState::Processing { runtime, .. }
                | AgentState::Completed { runtime, .. } => runtime,
                AgentState::Failed { runtime: Some(runtime), .. } => runtime,
                _ => return,
            };
            runtime.mode.current_mode_id = Some(mode_id.to_string());
        }
        self.emit_entry(agent, TimelineEntry::ModeChanged { mode_id: mode_id.to_string() });
        self.notify_directory(super::DirectoryChange::Upserted(self.info_of(agent)));
    }
}

/// Mode policy: adapter-advertised modes win; static provider modes fill the
/// gap; an unknown current mode falls back to the provider default.
fn resolve_modes(
    provider: &paseo_core::ProviderOptions,
    advertised: Option<SessionModeState>,
) -> SessionModeState {
    let mut mode = match advertised {
        Some(m) if !m.available_modes.is_empty() => m,
        _ => SessionModeState {
            current_mode_id: provider.default_mode_id().map(str::to_string),
            available_modes: provider.static_modes(),
        },
    };
    if mode.available_modes.is_empty() {
        return mode;
    }
    let known = mode.current_mode_id.as_deref().map(|id| mode.contains(id)).unwrap_or(false);
    if !known {
        mode.current_mode_id = provider
            .default_mode_id()
            .map(str::to_string)
            .filter(|id| mode.contains(id))
            .or_else(|| mode.available_modes.first().map(|m| m.id.clone()));
    }
    mode
}

#[cfg(test)]
#[path = "init_policy_tests.rs"]
mod policy_tests;
