// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::types::{AgentInfo, ErrorCode, TerminalInfo};
use paseo_core::{AgentId, AgentStatus, AgentUpdate, StopReason, StreamId, TerminalId};
use serde::{Deserialize, Serialize};

/// Response from the daemon to one client request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Ok,

    Error {
        code: ErrorCode,
        message: String,
    },

    Hello {
        protocol_version: u32,
        server_id: String,
    },

    Pong,

    ClientInfo {
        server_id: String,
        protocol_version: u32,
        daemon_version: String,
    },

    AgentCreated {
        agent_id: AgentId,
    },

    Agents {
        agents: Vec<AgentInfo>,
    },

    /// Full history snapshot: info + every recorded update, atomically.
    AgentTimeline {
        info: AgentInfo,
        updates: Vec<AgentUpdate>,
    },

    /// Terminal status when a waited-for turn ends (or the wait times out).
    Finished {
        status: AgentStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stop_reason: Option<StopReason>,
    },

    Terminals {
        terminals: Vec<TerminalInfo>,
    },

    TerminalCreated {
        terminal: TerminalInfo,
    },

    /// Stream bound; `snapshot` is the scrollback ring at attach time
    /// (base64). Subsequent bytes arrive as `terminal_stream_data` events.
    StreamAttached {
        stream_id: StreamId,
        terminal_id: TerminalId,
        snapshot: String,
    },
}

impl Response {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error { code, message: message.into() }
    }
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
