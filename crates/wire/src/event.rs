// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::types::{AgentInfo, TerminalInfo};
use paseo_core::{
    AgentId, AgentUpdate, PermissionOption, PermissionOutcome, StreamId, TerminalId, ToolCall,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outbound event pushed on a bound subscription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Current agent summary, sent when a subscription binds.
    AgentSnapshot { agent_id: AgentId, info: AgentInfo },

    /// One timeline entry (chunks, tool calls, status changes).
    AgentUpdate { agent_id: AgentId, update: AgentUpdate },

    /// A tool call is waiting on a human decision.
    PermissionRequest {
        agent_id: AgentId,
        request_id: String,
        tool_call: ToolCall,
        options: Vec<PermissionOption>,
    },

    /// A pending permission was resolved (selection or cancellation).
    PermissionResolved {
        agent_id: AgentId,
        request_id: String,
        #[serde(flatten)]
        outcome: PermissionOutcome,
    },

    /// The terminal set for a cwd changed.
    TerminalListChanged {
        cwd: PathBuf,
        terminals: Vec<TerminalInfo>,
    },

    /// PTY output bytes (base64) for an attached stream.
    TerminalStreamData { stream_id: StreamId, data: String },

    /// The PTY behind a stream exited.
    TerminalStreamExit {
        terminal_id: TerminalId,
        stream_id: StreamId,
    },

    /// Full agent directory (on bind and on demand).
    AgentDirectorySnapshot { agents: Vec<AgentInfo> },

    /// Incremental directory change.
    AgentDirectoryDelta {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        upserted: Vec<AgentInfo>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        removed: Vec<AgentId>,
    },

    /// The subscription's queue overflowed and it was dropped;
    /// the client must re-subscribe.
    ResourceExhausted { subscription_id: String },
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
