// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::types::KeyEvent;
use paseo_core::{AgentId, PromptContent, ProviderOptions, StreamId, TerminalId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Request from a client to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Version/key exchange; must be the first request on a connection.
    Hello {
        /// Stable client identity, preserved across reconnects.
        client_id: String,
        /// Monotonic generation of the client's host runtime controller.
        runtime_generation: u64,
        protocol_version: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },

    /// Health check ping
    Ping,

    /// Daemon identity and version info
    GetClientInfo,

    /// Create a persisted agent; the child process starts lazily.
    CreateAgent {
        provider: ProviderOptions,
        cwd: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        initial_prompt: Option<PromptContent>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        initial_mode: Option<String>,
    },

    /// Start a prompt turn; results stream via the agent's subscription.
    SendPrompt {
        agent_id: AgentId,
        prompt: PromptContent,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_mode: Option<String>,
        /// Client-supplied id for the synthetic user chunk (idempotency).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },

    /// Cancel an in-flight turn; no-op unless processing.
    CancelAgent { agent_id: AgentId },

    /// Terminate the agent process; the record survives.
    KillAgent { agent_id: AgentId },

    /// Kill the agent and remove its persisted record.
    DeleteAgent { agent_id: AgentId },

    /// Switch the live session's mode.
    SetSessionMode { agent_id: AgentId, mode_id: String },

    /// Resolve one pending permission by option id.
    RespondToPermission {
        agent_id: AgentId,
        request_id: String,
        option_id: String,
    },

    /// Rename an agent.
    SetAgentTitle { agent_id: AgentId, title: String },

    /// Set (or clear, with a null value) one label on an agent.
    LabelAgent {
        agent_id: AgentId,
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },

    /// Agent summaries (no subscription).
    ListAgents,

    /// Agent directory snapshot, optionally binding a delta subscription.
    FetchAgents {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subscription_id: Option<String>,
    },

    /// Eager-init an agent and fetch its full history atomically,
    /// optionally binding an update subscription.
    FetchAgentTimeline {
        agent_id: AgentId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subscription_id: Option<String>,
    },

    /// Block until the agent's current turn finishes (bounded).
    WaitForFinish {
        agent_id: AgentId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },

    /// Unbind a previously bound subscription. Idempotent.
    Unsubscribe { subscription_id: String },

    /// Terminals bound to a working directory.
    ListTerminals { cwd: PathBuf },

    /// Spawn a PTY running the user's shell in `cwd`.
    CreateTerminal { cwd: PathBuf },

    /// Graceful kill, then force after a bounded delay.
    KillTerminal { terminal_id: TerminalId },

    /// Attach a byte stream; response carries the scrollback snapshot.
    AttachTerminalStream {
        terminal_id: TerminalId,
        subscription_id: String,
    },

    /// Detach a previously attached stream. Idempotent.
    DetachTerminalStream { stream_id: StreamId },

    /// Raw input bytes (base64) for the PTY.
    SendTerminalStreamInput { stream_id: StreamId, data: String },

    /// Structured key press, encoded server-side.
    SendTerminalStreamKey { stream_id: StreamId, key: KeyEvent },

    /// Terminal-level input (resize today).
    SendTerminalInput {
        terminal_id: TerminalId,
        input: TerminalInput,
    },

    /// List-change notifications for a cwd.
    SubscribeTerminals {
        cwd: PathBuf,
        subscription_id: String,
    },

    /// Stop list-change notifications for a cwd.
    UnsubscribeTerminals { cwd: PathBuf },
}

/// Terminal-level input operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TerminalInput {
    /// Applied atomically to the PTY; idempotent for equal sizes.
    Resize { rows: u16, cols: u16 },
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
