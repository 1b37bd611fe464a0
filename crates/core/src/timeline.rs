// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timeline update shapes and chunk coalescing.
//!
//! The manager appends one [`TimelineEntry`] per enriched notification and
//! fans the same entries out to subscribers. Chunked message entries carry a
//! stable `message_id` so any downstream consumer can coalesce streamed
//! chunks idempotently: all chunks between two turn boundaries share one id,
//! and the first chunk after a boundary gets a fresh one.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse agent status surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Uninitialized,
    Initializing,
    Ready,
    Processing,
    Completed,
    Failed,
    Killed,
}

impl AgentStatus {
    /// Terminal statuses reject further prompts.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Killed)
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Killed => "killed",
        };
        write!(f, "{}", s)
    }
}

/// Why a prompt turn stopped, as reported by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    Refusal,
    Cancelled,
    Other,
}

impl StopReason {
    /// Status the agent settles into after this stop reason.
    ///
    /// A cancelled turn returns the agent to `ready` so the next prompt can
    /// start immediately; every other reason parks it in `completed`.
    pub fn settled_status(&self) -> AgentStatus {
        match self {
            Self::Cancelled => AgentStatus::Ready,
            Self::EndTurn | Self::Refusal | Self::Other => AgentStatus::Completed,
        }
    }
}

/// One content block of a prompt or streamed message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    /// Reference to a resource by URI (file, image), passed through opaquely.
    ResourceLink { uri: String, name: String },
}

/// Prompt payload: plain text or pre-built blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PromptContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl PromptContent {
    pub fn into_blocks(self) -> Vec<ContentBlock> {
        match self {
            Self::Text(text) => vec![ContentBlock::Text { text }],
            Self::Blocks(blocks) => blocks,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Blocks(blocks) => blocks.is_empty(),
        }
    }
}

/// Tool call lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// A tool invocation reported by the adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_call_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub status: ToolCallStatus,
    /// Raw adapter-provided input, passed through for display.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_input: Option<serde_json::Value>,
}

/// Kind of a permission option as declared by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionOptionKind {
    AllowOnce,
    AllowAlways,
    RejectOnce,
    RejectAlways,
}

/// One selectable option on a permission request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionOption {
    pub kind: PermissionOptionKind,
    pub option_id: String,
    pub name: String,
}

/// How a pending permission was resolved. Exactly one outcome per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PermissionOutcome {
    Selected { option_id: String },
    Cancelled,
}

/// One enriched update on an agent's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimelineEntry {
    UserMessageChunk {
        message_id: String,
        content: Vec<ContentBlock>,
    },
    AgentMessageChunk {
        message_id: String,
        content: Vec<ContentBlock>,
    },
    AgentThoughtChunk {
        message_id: String,
        content: Vec<ContentBlock>,
    },
    ToolCall {
        tool_call: ToolCall,
    },
    ToolCallUpdate {
        tool_call_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<ToolCallStatus>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raw_output: Option<serde_json::Value>,
    },
    PermissionRequest {
        request_id: String,
        tool_call: ToolCall,
        options: Vec<PermissionOption>,
    },
    PermissionResolved {
        request_id: String,
        #[serde(flatten)]
        outcome: PermissionOutcome,
    },
    StatusChanged {
        status: AgentStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stop_reason: Option<StopReason>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    ModeChanged {
        mode_id: String,
    },
}

/// A timeline entry with its position and wall-clock stamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentUpdate {
    /// Position in the agent's timeline, strictly increasing per agent.
    pub seq: u64,
    pub at_ms: u64,
    #[serde(flatten)]
    pub entry: TimelineEntry,
}

/// Mints the stable per-turn `message_id` for streamed chunks.
///
/// One tracker per agent. `chunk_id` returns the current id, minting a fresh
/// one when none is active; `boundary` ends the current segment so the next
/// chunk starts a new id. A `tool_call` or `user_message_chunk` is a
/// boundary.
#[derive(Debug, Default)]
pub struct TurnTracker {
    current: Option<String>,
}

impl TurnTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for the next assistant/thought chunk, minting on first use.
    pub fn chunk_id(&mut self) -> String {
        match &self.current {
            Some(id) => id.clone(),
            None => {
                let id = format!("msg-{}", nanoid::nanoid!(19));
                self.current = Some(id.clone());
                id
            }
        }
    }

    /// End the current segment. The next `chunk_id` mints a fresh id.
    pub fn boundary(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
#[path = "timeline_tests.rs"]
mod tests;
