// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared wire-level value types: summaries, error codes, key events.

use base64::Engine as _;
use paseo_core::{
    AgentId, AgentStatus, ProviderKind, SessionModeState, TerminalId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Typed error codes surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    UnknownAgent,
    UnknownTerminal,
    InvalidArgument,
    ResourceExhausted,
    RateLimited,
    Precondition,
    NotFound,
    Conflict,
    Timeout,
    AdapterFailure,
    Transport,
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unauthorized => "unauthorized",
            Self::UnknownAgent => "unknown_agent",
            Self::UnknownTerminal => "unknown_terminal",
            Self::InvalidArgument => "invalid_argument",
            Self::ResourceExhausted => "resource_exhausted",
            Self::RateLimited => "rate_limited",
            Self::Precondition => "precondition",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Timeout => "timeout",
            Self::AdapterFailure => "adapter_failure",
            Self::Transport => "transport",
            Self::Internal => "internal",
        };
        write!(f, "{}", s)
    }
}

/// Point-in-time agent summary for lists and the directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: AgentId,
    pub title: String,
    pub provider: ProviderKind,
    pub cwd: PathBuf,
    pub status: AgentStatus,
    pub created_at_ms: u64,
    pub last_activity_at_ms: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub mode: SessionModeState,
}

/// Terminal summary for per-cwd lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalInfo {
    pub id: TerminalId,
    pub cwd: PathBuf,
    /// Short display name (e.g. "sh (paseo)").
    pub name: String,
    pub created_at_ms: u64,
}

/// A structured key press, translated server-side to terminal bytes.
///
/// Raw printable text never travels as a key event; it goes through
/// `send_terminal_stream_input` instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key: String,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub meta: bool,
}

impl KeyEvent {
    pub fn named(key: impl Into<String>) -> Self {
        Self { key: key.into(), ..Self::default() }
    }
}

/// Encode terminal bytes for a JSON frame.
pub fn encode_bytes(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// Decode terminal bytes from a JSON frame.
pub fn decode_bytes(data: &str) -> Result<Vec<u8>, crate::WireError> {
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| crate::WireError::Encoding(e.to_string()))
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;
