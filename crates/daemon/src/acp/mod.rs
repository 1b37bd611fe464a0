// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent Client Protocol adapter seam.
//!
//! The manager never talks JSON-RPC directly: it spawns a connection through
//! [`AcpAdapter`], drives it through [`AcpConnection`], and receives
//! asynchronous traffic (session updates, permission requests, process exit)
//! on the event channel handed to `spawn`.
//!
//! # ID hierarchy
//!
//! ```text
//! agent_id   - persisted daemon-side identity (agt-...)
//!      │
//!      └── acp_session_id - adapter-internal session, may be reloaded
//! ```

mod process;
mod rpc;

pub use process::ProcessAcpAdapter;
pub use rpc::RpcPeer;

#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeAcpAdapter, FakeCall, FakeTurn};

use async_trait::async_trait;
use paseo_core::{
    ContentBlock, PermissionOption, PermissionOutcome, SessionModeState, StopReason, ToolCall,
};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Errors from adapter operations.
#[derive(Debug, Error)]
pub enum AcpError {
    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("agent returned error: {0}")]
    Agent(String),

    #[error("connection closed")]
    Closed,

    #[error("operation timed out")]
    Timeout,
}

/// Client capabilities announced in the `initialize` handshake.
#[derive(Debug, Clone, Copy)]
pub struct ClientCapabilities {
    pub read_text_file: bool,
    pub write_text_file: bool,
}

impl Default for ClientCapabilities {
    fn default() -> Self {
        Self { read_text_file: true, write_text_file: true }
    }
}

/// Result of opening or loading a session.
#[derive(Debug, Clone)]
pub struct SessionOpened {
    pub session_id: String,
    /// Modes advertised by the adapter; `None` when it was silent.
    pub modes: Option<SessionModeState>,
}

/// Result of one prompt turn.
#[derive(Debug, Clone, Copy)]
pub struct PromptResult {
    pub stop_reason: StopReason,
}

/// A permission question from the adapter, answered through `responder`.
///
/// Exactly one send on `responder`; dropping it counts as cancellation on
/// the adapter side.
#[derive(Debug)]
pub struct PermissionAsk {
    pub request_id: String,
    pub acp_session_id: String,
    pub tool_call: ToolCall,
    pub options: Vec<PermissionOption>,
    pub responder: oneshot::Sender<PermissionOutcome>,
}

/// Session traffic pushed by the adapter.
#[derive(Debug)]
pub enum AcpEvent {
    Update(SessionUpdate),
    Permission(PermissionAsk),
    ProcessExited { code: Option<i32> },
}

/// One `session/update` notification, already shaped for the timeline.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    AgentMessageChunk { content: Vec<ContentBlock> },
    AgentThoughtChunk { content: Vec<ContentBlock> },
    ToolCall(ToolCall),
    ToolCallUpdate {
        tool_call_id: String,
        status: Option<paseo_core::ToolCallStatus>,
        raw_output: Option<serde_json::Value>,
    },
    ModeChanged { mode_id: String },
}

/// A live connection to one agent child process.
#[async_trait]
pub trait AcpConnection: Send + Sync + 'static {
    /// Protocol handshake. Must be the first call after spawn.
    async fn initialize(&self, caps: ClientCapabilities) -> Result<(), AcpError>;

    /// Open a fresh session rooted at `cwd`.
    async fn new_session(&self, cwd: &Path) -> Result<SessionOpened, AcpError>;

    /// Reload a persisted session. Only meaningful for providers that
    /// declare session persistence.
    async fn load_session(&self, session_id: &str, cwd: &Path)
        -> Result<SessionOpened, AcpError>;

    /// Run one prompt turn to its stop reason. Streaming output arrives on
    /// the event channel while this is in flight.
    async fn prompt(
        &self,
        session_id: &str,
        content: Vec<ContentBlock>,
    ) -> Result<PromptResult, AcpError>;

    /// Best-effort cancellation of the in-flight turn.
    async fn cancel(&self, session_id: &str) -> Result<(), AcpError>;

    /// Switch the session mode.
    async fn set_session_mode(&self, session_id: &str, mode_id: &str) -> Result<(), AcpError>;

    /// Graceful termination, escalating to a hard kill after `grace`.
    async fn terminate(&self, grace: Duration);
}

/// Spawns agent child processes.
#[async_trait]
pub trait AcpAdapter: Send + Sync + 'static {
    /// Start the child for `provider` in `cwd`. Asynchronous traffic is
    /// delivered on `events` until the connection dies.
    async fn spawn(
        &self,
        provider: &paseo_core::ProviderOptions,
        cwd: &Path,
        events: mpsc::Sender<AcpEvent>,
    ) -> Result<std::sync::Arc<dyn AcpConnection>, AcpError>;
}
