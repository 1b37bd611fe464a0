// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted ACP adapter for tests.
//!
//! Turns are queued up front with [`FakeAcpAdapter::push_turn`]; each
//! `prompt` call pops one, replays its updates on the event channel, asks
//! for permission when scripted, and returns its stop reason. A held turn
//! blocks until `cancel` is called, which is how the cancel-on-new-prompt
//! paths are exercised.

use super::{
    AcpAdapter, AcpConnection, AcpError, AcpEvent, ClientCapabilities, PermissionAsk,
    PromptResult, SessionOpened, SessionUpdate,
};
use async_trait::async_trait;
use paseo_core::{
    ContentBlock, PermissionOption, PermissionOutcome, ProviderOptions, SessionModeState,
    StopReason, ToolCall,
};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Notify};

/// One recorded adapter call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCall {
    Spawn,
    Initialize,
    NewSession,
    LoadSession(String),
    Prompt,
    Cancel,
    SetMode(String),
    Terminate,
}

/// Script for one prompt turn.
#[derive(Debug, Default)]
pub struct FakeTurn {
    /// Updates replayed before the turn settles.
    pub updates: Vec<SessionUpdate>,
    /// Ask for permission mid-turn and wait for the decision.
    pub ask_permission: Option<(ToolCall, Vec<PermissionOption>)>,
    /// Stop reason reported when the turn ends normally.
    pub stop_reason: Option<StopReason>,
    /// Fail the turn with this message instead of finishing.
    pub error: Option<String>,
    /// Keep the turn in flight until `cancel` is called.
    pub hold: bool,
}

impl FakeTurn {
    pub fn text(text: &str) -> Self {
        Self {
            updates: vec![SessionUpdate::AgentMessageChunk {
                content: vec![ContentBlock::Text { text: text.to_string() }],
            }],
            ..Self::default()
        }
    }

    pub fn held() -> Self {
        Self { hold: true, ..Self::default() }
    }
}

struct FakeState {
    calls: parking_lot::Mutex<Vec<FakeCall>>,
    turns: parking_lot::Mutex<VecDeque<FakeTurn>>,
    spawn_count: AtomicUsize,
    session_count: AtomicUsize,
    fail_spawn: AtomicBool,
    advertised_modes: parking_lot::Mutex<Option<SessionModeState>>,
    cancelled: Notify,
    exit_on_terminate: AtomicBool,
    last_events: parking_lot::Mutex<Option<mpsc::Sender<AcpEvent>>>,
}

/// Test double for [`AcpAdapter`]. Clone-cheap via `Arc`.
#[derive(Clone)]
pub struct FakeAcpAdapter {
    state: Arc<FakeState>,
}

impl Default for FakeAcpAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeAcpAdapter {
    pub fn new() -> Self {
        Self {
            state: Arc::new(FakeState {
                calls: parking_lot::Mutex::new(Vec::new()),
                turns: parking_lot::Mutex::new(VecDeque::new()),
                spawn_count: AtomicUsize::new(0),
                session_count: AtomicUsize::new(0),
                fail_spawn: AtomicBool::new(false),
                advertised_modes: parking_lot::Mutex::new(None),
                cancelled: Notify::new(),
                exit_on_terminate: AtomicBool::new(true),
                last_events: parking_lot::Mutex::new(None),
            }),
        }
    }

    pub fn push_turn(&self, turn: FakeTurn) {
        self.state.turns.lock().push_back(turn);
    }

    pub fn fail_next_spawn(&self) {
        self.state.fail_spawn.store(true, Ordering::SeqCst);
    }

    /// Advertise modes from `session/new` instead of staying silent.
    pub fn advertise_modes(&self, modes: SessionModeState) {
        *self.state.advertised_modes.lock() = Some(modes);
    }

    pub fn calls(&self) -> Vec<FakeCall> {
        self.state.calls.lock().clone()
    }

    pub fn spawn_count(&self) -> usize {
        self.state.spawn_count.load(Ordering::SeqCst)
    }

    /// Report an unexpected child exit on the most recent connection.
    pub async fn simulate_exit(&self, code: Option<i32>) {
        let events = self.state.last_events.lock().clone();
        if let Some(events) = events {
            let _ = events.send(AcpEvent::ProcessExited { code }).await;
        }
    }
}

#[async_trait]
impl AcpAdapter for FakeAcpAdapter {
    async fn spawn(
        &self,
        _provider: &ProviderOptions,
        _cwd: &Path,
        events: mpsc::Sender<AcpEvent>,
    ) -> Result<Arc<dyn AcpConnection>, AcpError> {
        self.state.calls.lock().push(FakeCall::Spawn);
        if self.state.fail_spawn.swap(false, Ordering::SeqCst) {
            return Err(AcpError::SpawnFailed("scripted spawn failure".to_string()));
        }
        self.state.spawn_count.fetch_add(1, Ordering::SeqCst);
        *self.state.last_events.lock() = Some(events.clone());
        Ok(Arc::new(FakeConnection { state: Arc::clone(&self.state), events }))
    }
}

struct FakeConnection {
    state: Arc<FakeState>,
    events: mpsc::Sender<AcpEvent>,
}

#[async_trait]
impl AcpConnection for FakeConnection {
    async fn initialize(&self, _caps: ClientCapabilities) -> Result<(), AcpError> {
        self.state.calls.lock().push(FakeCall::Initialize);
        Ok(())
    }

    async fn new_session(&self, _cwd: &Path) -> Result<SessionOpened, AcpError> {
        self.state.calls.lock().push(FakeCall::NewSession);
        let n = self.state.session_count.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SessionOpened {
            session_id: format!("fake-sess-{}", n),
            modes: self.state.advertised_modes.lock().clone(),
        })
    }

    async fn load_session(
        &self,
        session_id: &str,
        _cwd: &Path,
    ) -> Result<SessionOpened, AcpError> {
        self.state.calls.lock().push(FakeCall::LoadSession(session_id.to_string()));
        Ok(SessionOpened {
            session_id: session_id.to_string(),
            modes: self.state.advertised_modes.lock().clone(),
        })
    }

    async fn prompt(
        &self,
        session_id: &str,
        _content: Vec<ContentBlock>,
    ) -> Result<PromptResult, AcpError> {
        self.state.calls.lock().push(FakeCall::Prompt);
        let turn = self.state.turns.lock().pop_front().unwrap_or_default();

        for update in turn.updates {
            let _ = self.events.send(AcpEvent::Update(update)).await;
        }

        if let Some((tool_call, options)) = turn.ask_permission {
            let (responder, decided) = oneshot::channel();
            let ask = PermissionAsk {
                request_id: format!("perm-{}", nanoid::nanoid!(8)),
                acp_session_id: session_id.to_string(),
                tool_call,
                options,
                responder,
            };
            let _ = self.events.send(AcpEvent::Permission(ask)).await;
            match decided.await {
                Ok(PermissionOutcome::Selected { .. }) => {}
                Ok(PermissionOutcome::Cancelled) | Err(_) => {
                    return Ok(PromptResult { stop_reason: StopReason::Cancelled });
                }
            }
        }

        if turn.hold {
            self.state.cancelled.notified().await;
            return Ok(PromptResult { stop_reason: StopReason::Cancelled });
        }

        if let Some(message) = turn.error {
            return Err(AcpError::Agent(message));
        }

        Ok(PromptResult { stop_reason: turn.stop_reason.unwrap_or(StopReason::EndTurn) })
    }

    async fn cancel(&self, _session_id: &str) -> Result<(), AcpError> {
        self.state.calls.lock().push(FakeCall::Cancel);
        self.state.cancelled.notify_waiters();
        Ok(())
    }

    async fn set_session_mode(&self, _session_id: &str, mode_id: &str) -> Result<(), AcpError> {
        self.state.calls.lock().push(FakeCall::SetMode(mode_id.to_string()));
        Ok(())
    }

    async fn terminate(&self, _grace: Duration) {
        self.state.calls.lock().push(FakeCall::Terminate);
        self.state.cancelled.notify_waiters();
        if self.state.exit_on_terminate.load(Ordering::SeqCst) {
            let _ = self.events.send(AcpEvent::ProcessExited { code: Some(0) }).await;
        }
    }
}
