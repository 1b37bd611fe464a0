// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent lifecycle manager.
//!
//! Owns the agent set, each agent's state machine, timeline, pending
//! permissions, and subscribers. Per-agent operations serialize on the
//! agent's op lock; cross-agent operations are independent. Subscribers are
//! invoked synchronously in timeline order; slow consumers must offload
//! (the gateway does, per-subscription).

mod control;
mod init;
mod permissions;
mod prompt;

use crate::acp::{AcpAdapter, AcpConnection, AcpError};
use crate::storage::AgentStore;
use paseo_core::clock::epoch_ms_now;
use paseo_core::{
    AgentId, AgentRecord, AgentStatus, AgentUpdate, PermissionOption, PermissionOutcome,
    PromptContent, ProviderOptions, SessionModeState, StopReason, TimelineEntry, ToolCall,
    TurnTracker,
};
use paseo_wire::AgentInfo;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Timeline retention per agent: bounded length, drop-oldest.
pub const TIMELINE_RETENTION: usize = 4096;

/// Settle delay after a best-effort cancel before the next turn starts.
pub(crate) const CANCEL_SETTLE: std::time::Duration = std::time::Duration::from_millis(100);

/// Delay between a kill's final status emission and removal from the set,
/// so late subscribers can still read the final status.
pub(crate) const KILL_LINGER: std::time::Duration = std::time::Duration::from_millis(100);

/// Errors from manager operations.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("unknown agent: {0}")]
    UnknownAgent(AgentId),

    #[error("working directory inaccessible: {}", .0.display())]
    CwdInaccessible(PathBuf),

    #[error("invalid argument: {0}")]
    Validation(String),

    #[error("operation not allowed while agent is {0}")]
    Precondition(AgentStatus),

    #[error("unknown permission request: {0}")]
    UnknownPermission(String),

    #[error("timed out")]
    Timeout,

    #[error(transparent)]
    Adapter(#[from] AcpError),
}

/// Live adapter attachment. Present only in states that own a process.
#[derive(Clone)]
pub(crate) struct AgentRuntime {
    pub conn: Arc<dyn AcpConnection>,
    pub acp_session_id: String,
    pub mode: SessionModeState,
}

/// Per-agent state machine.
pub(crate) enum AgentState {
    Uninitialized { persisted_session_id: Option<String> },
    Initializing,
    Ready { runtime: AgentRuntime },
    Processing { runtime: AgentRuntime, turn_gen: u64 },
    Completed { runtime: AgentRuntime, stop_reason: StopReason },
    Failed { last_error: String, runtime: Option<AgentRuntime> },
    Killed,
}

impl AgentState {
    pub fn status(&self) -> AgentStatus {
        match self {
            Self::Uninitialized { .. } => AgentStatus::Uninitialized,
            Self::Initializing => AgentStatus::Initializing,
            Self::Ready { .. } => AgentStatus::Ready,
            Self::Processing { .. } => AgentStatus::Processing,
            Self::Completed { .. } => AgentStatus::Completed,
            Self::Failed { .. } => AgentStatus::Failed,
            Self::Killed => AgentStatus::Killed,
        }
    }

    pub fn runtime(&self) -> Option<&AgentRuntime> {
        match self {
            Self::Ready { runtime }
            | Self::Processing { runtime, .. }
            | Self::Completed { runtime, .. } => Some(runtime),
            Self::Failed { runtime, .. } => runtime.as_ref(),
            _ => None,
        }
    }
}

/// A permission waiting on a human decision. Resolved exactly once.
pub(crate) struct PendingPermission {
    pub request_id: String,
    pub acp_session_id: String,
    pub tool_call: ToolCall,
    pub options: Vec<PermissionOption>,
    pub responder: oneshot::Sender<PermissionOutcome>,
}

/// Read-only view of a pending permission.
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionInfo {
    pub request_id: String,
    pub tool_call: ToolCall,
    pub options: Vec<PermissionOption>,
}

struct Timeline {
    entries: VecDeque<AgentUpdate>,
    next_seq: u64,
    turns: TurnTracker,
}

pub(crate) struct ManagedAgent {
    pub id: AgentId,
    /// Serializes state transitions for this agent.
    pub(crate) op_lock: tokio::sync::Mutex<()>,
    pub(crate) state: Mutex<AgentState>,
    pub(crate) record: Mutex<AgentRecord>,
    timeline: Mutex<Timeline>,
    pub(crate) pending: Mutex<Vec<PendingPermission>>,
    /// Mode requested before initialization; applied once ready.
    pub(crate) pending_mode: Mutex<Option<String>>,
    subscribers: Mutex<HashMap<u64, Arc<dyn Fn(AgentUpdate) + Send + Sync>>>,
    /// (status, last stop reason) for wait_for_finish.
    pub(crate) status_tx: watch::Sender<(AgentStatus, Option<StopReason>)>,
    pub(crate) permission_arrived: tokio::sync::Notify,
    pub(crate) turn_gen: AtomicU64,
}

impl ManagedAgent {
    fn new(record: AgentRecord) -> Arc<Self> {
        let persisted = record.persisted_session_id.clone();
        let (status_tx, _) = watch::channel((AgentStatus::Uninitialized, None));
        Arc::new(Self {
            id: record.id,
            op_lock: tokio::sync::Mutex::new(()),
            state: Mutex::new(AgentState::Uninitialized { persisted_session_id: persisted }),
            record: Mutex::new(record),
            timeline: Mutex::new(Timeline {
                entries: VecDeque::new(),
                next_seq: 0,
                turns: TurnTracker::new(),
            }),
            pending: Mutex::new(Vec::new()),
            pending_mode: Mutex::new(None),
            subscribers: Mutex::new(HashMap::new()),
            status_tx,
            permission_arrived: tokio::sync::Notify::new(),
            turn_gen: AtomicU64::new(0),
        })
    }
}

/// Directory change fanned out to directory subscribers.
#[derive(Debug, Clone)]
pub enum DirectoryChange {
    Upserted(AgentInfo),
    Removed(AgentId),
}

pub(crate) struct ManagerInner {
    pub(crate) adapter: Arc<dyn AcpAdapter>,
    pub(crate) store: AgentStore,
    pub(crate) agents: Mutex<HashMap<AgentId, Arc<ManagedAgent>>>,
    directory_subs: Mutex<HashMap<u64, Arc<dyn Fn(DirectoryChange) + Send + Sync>>>,
    next_sub: AtomicU64,
    pub(crate) shutdown: CancellationToken,
}

/// Handle to the agent set. Cheap to clone.
#[derive(Clone)]
pub struct AgentManager {
    pub(crate) inner: Arc<ManagerInner>,
}

/// Parameters for [`AgentManager::create_agent`].
#[derive(Debug, Clone)]
pub struct CreateAgentParams {
    pub provider: ProviderOptions,
    pub cwd: PathBuf,
    pub initial_prompt: Option<PromptContent>,
    pub initial_mode: Option<String>,
}

impl AgentManager {
    /// Build the manager over persisted records; every agent starts
    /// `uninitialized` with no adapter side effects.
    pub fn new(adapter: Arc<dyn AcpAdapter>, store: AgentStore, records: Vec<AgentRecord>) -> Self {
        let agents = records
            .into_iter()
            .map(|r| (r.id, ManagedAgent::new(r)))
            .collect::<HashMap<_, _>>();
        Self {
            inner: Arc::new(ManagerInner {
                adapter,
                store,
                agents: Mutex::new(agents),
                directory_subs: Mutex::new(HashMap::new()),
                next_sub: AtomicU64::new(1),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub(crate) fn get(&self, id: &AgentId) -> Result<Arc<ManagedAgent>, ManagerError> {
        self.inner
            .agents
            .lock()
            .get(id.as_str())
            .cloned()
            .ok_or(ManagerError::UnknownAgent(*id))
    }

    /// Create and persist a new agent record. The child starts lazily.
    pub async fn create_agent(&self, params: CreateAgentParams) -> Result<AgentId, ManagerError> {
        validate_cwd(&params.cwd)?;

        let record = AgentRecord::new(params.provider, params.cwd);
        let id = record.id;
        self.inner.store.upsert(record.clone());

        let agent = ManagedAgent::new(record);
        self.inner.agents.lock().insert(id, Arc::clone(&agent));
        self.notify_directory(DirectoryChange::Upserted(self.info_of(&agent)));

        match params.initial_prompt {
            Some(prompt) => {
                self.send_prompt(&id, prompt, params.initial_mode, None).await?;
            }
            None => {
                *agent.pending_mode.lock() = params.initial_mode;
            }
        }
        Ok(id)
    }

    /// Summaries of every live agent.
    pub fn list_agents(&self) -> Vec<AgentInfo> {
        let agents: Vec<_> = self.inner.agents.lock().values().cloned().collect();
        let mut infos: Vec<_> = agents.iter().map(|a| self.info_of(a)).collect();
        infos.sort_by_key(|i| i.created_at_ms);
        infos
    }

    /// Summary of one agent.
    pub fn get_agent(&self, id: &AgentId) -> Result<AgentInfo, ManagerError> {
        let agent = self.get(id)?;
        Ok(self.info_of(&agent))
    }

    /// Rename an agent; persisted eagerly.
    pub fn set_agent_title(&self, id: &AgentId, title: String) -> Result<(), ManagerError> {
        if title.trim().is_empty() {
            return Err(ManagerError::Validation("title must not be empty".to_string()));
        }
        let agent = self.get(id)?;
        {
            let mut record = agent.record.lock();
            record.title = title;
            record.touch();
            self.inner.store.upsert(record.clone());
        }
        self.notify_directory(DirectoryChange::Upserted(self.info_of(&agent)));
        Ok(())
    }

    /// Set or clear one label; persisted eagerly.
    pub fn label_agent(
        &self,
        id: &AgentId,
        key: &str,
        value: Option<String>,
    ) -> Result<(), ManagerError> {
        if key.trim().is_empty() {
            return Err(ManagerError::Validation("label key must not be empty".to_string()));
        }
        let agent = self.get(id)?;
        {
            let mut record = agent.record.lock();
            match value {
                Some(value) => {
                    record.labels.insert(key.to_string(), value);
                }
                None => {
                    record.labels.remove(key);
                }
            }
            record.touch();
            self.inner.store.upsert(record.clone());
        }
        self.notify_directory(DirectoryChange::Upserted(self.info_of(&agent)));
        Ok(())
    }

    /// Subscribe to an agent's update stream. The callback fires on every
    /// recorded update, synchronously, in order.
    pub fn subscribe_updates(
        &self,
        id: &AgentId,
        callback: Arc<dyn Fn(AgentUpdate) + Send + Sync>,
    ) -> Result<u64, ManagerError> {
        let agent = self.get(id)?;
        let sub = self.inner.next_sub.fetch_add(1, Ordering::Relaxed);
        agent.subscribers.lock().insert(sub, callback);
        Ok(sub)
    }

    /// Drop a subscription. Idempotent; unknown agents are a no-op too.
    pub fn unsubscribe_updates(&self, id: &AgentId, sub: u64) {
        if let Ok(agent) = self.get(id) {
            agent.subscribers.lock().remove(&sub);
        }
    }

    /// Subscribe to directory changes (create/update/remove).
    pub fn subscribe_directory(
        &self,
        callback: Arc<dyn Fn(DirectoryChange) + Send + Sync>,
    ) -> u64 {
        let sub = self.inner.next_sub.fetch_add(1, Ordering::Relaxed);
        self.inner.directory_subs.lock().insert(sub, callback);
        sub
    }

    pub fn unsubscribe_directory(&self, sub: u64) {
        self.inner.directory_subs.lock().remove(&sub);
    }

    /// Eager-init the agent and return (info, full history) atomically.
    pub async fn fetch_agent_timeline(
        &self,
        id: &AgentId,
    ) -> Result<(AgentInfo, Vec<AgentUpdate>), ManagerError> {
        let agent = self.get(id)?;
        let _guard = agent.op_lock.lock().await;
        self.ensure_initialized_locked(&agent).await?;
        let updates = {
            let timeline = agent.timeline.lock();
            timeline.entries.iter().cloned().collect()
        };
        Ok((self.info_of(&agent), updates))
    }

    /// Block until the agent's current turn finishes, bounded by `timeout`.
    ///
    /// Returns immediately when no turn is in flight.
    pub async fn wait_for_finish(
        &self,
        id: &AgentId,
        timeout: std::time::Duration,
    ) -> Result<(AgentStatus, Option<StopReason>), ManagerError> {
        let agent = self.get(id)?;
        let mut rx = agent.status_tx.subscribe();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let (status, stop) = *rx.borrow();
            if status != AgentStatus::Processing && status != AgentStatus::Initializing {
                return Ok((status, stop));
            }
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        let (status, stop) = *rx.borrow();
                        return Ok((status, stop));
                    }
                }
                _ = tokio::time::sleep_until(deadline) => return Err(ManagerError::Timeout),
            }
        }
    }

    // ---- internal emission helpers ----

    pub(crate) fn info_of(&self, agent: &ManagedAgent) -> AgentInfo {
        let record = agent.record.lock();
        let state = agent.state.lock();
        let mode = state.runtime().map(|r| r.mode.clone()).unwrap_or_default();
        AgentInfo {
            id: record.id,
            title: record.title.clone(),
            provider: record.provider.kind(),
            cwd: record.cwd.clone(),
            status: state.status(),
            created_at_ms: record.created_at_ms,
            last_activity_at_ms: record.last_activity_at_ms,
            labels: record.labels.clone(),
            mode,
        }
    }

    /// Append one entry and fan it out, preserving order.
    pub(crate) fn emit_entry(&self, agent: &ManagedAgent, entry: TimelineEntry) -> AgentUpdate {
        let update = {
            let mut timeline = agent.timeline.lock();
            let update = AgentUpdate { seq: timeline.next_seq, at_ms: epoch_ms_now(), entry };
            timeline.next_seq += 1;
            timeline.entries.push_back(update.clone());
            while timeline.entries.len() > TIMELINE_RETENTION {
                timeline.entries.pop_front();
            }
            update
        };
        let subscribers: Vec<_> = agent.subscribers.lock().values().cloned().collect();
        for callback in subscribers {
            callback(update.clone());
        }
        update
    }

    /// Record a status transition: timeline entry, finish signal, directory.
    pub(crate) fn emit_status(
        &self,
        agent: &ManagedAgent,
        status: AgentStatus,
        stop_reason: Option<StopReason>,
        error: Option<String>,
    ) {
        self.emit_entry(agent, TimelineEntry::StatusChanged { status, stop_reason, error });
        let _ = agent.status_tx.send((status, stop_reason));
        self.notify_directory(DirectoryChange::Upserted(self.info_of(agent)));
    }

    pub(crate) fn notify_directory(&self, change: DirectoryChange) {
        let subs: Vec<_> = self.inner.directory_subs.lock().values().cloned().collect();
        for callback in subs {
            callback(change.clone());
        }
    }

    /// Mint the message id for the next streamed chunk.
    pub(crate) fn chunk_message_id(&self, agent: &ManagedAgent) -> String {
        agent.timeline.lock().turns.chunk_id()
    }

    /// Mark a turn boundary: the next chunk gets a fresh message id.
    pub(crate) fn turn_boundary(&self, agent: &ManagedAgent) {
        agent.timeline.lock().turns.boundary();
    }

    pub(crate) fn touch_and_persist(&self, agent: &ManagedAgent) {
        let mut record = agent.record.lock();
        record.touch();
        self.inner.store.upsert(record.clone());
    }
}

fn validate_cwd(cwd: &std::path::Path) -> Result<(), ManagerError> {
    if !cwd.is_absolute() {
        return Err(ManagerError::Validation(format!(
            "cwd must be absolute: {}",
            cwd.display()
        )));
    }
    // Readable + executable: listing the directory exercises both.
    match std::fs::read_dir(cwd) {
        Ok(_) => Ok(()),
        Err(e) => {
            warn!(cwd = %cwd.display(), err = %e, "cwd validation failed");
            Err(ManagerError::CwdInaccessible(cwd.to_path_buf()))
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "manager_tests/mod.rs"]
mod tests;
