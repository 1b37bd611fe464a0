// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provider variants and their capability surface.
//!
//! Each variant names one external ACP assistant. Behavior differences the
//! manager cares about (session persistence, static mode lists, spawn argv)
//! are exposed here as capability accessors so the rest of the daemon never
//! matches on the variant directly.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Provider-specific options carried on the agent record.
///
/// The `claude` variant carries the ACP session id of a previous run when
/// the provider supports session persistence; `codex` and `opencode` start
/// fresh sessions on every initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum ProviderOptions {
    Claude {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    Codex,
    Opencode,
}

/// Bare provider discriminant, for logging and wire summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Claude,
    Codex,
    Opencode,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Claude => write!(f, "claude"),
            Self::Codex => write!(f, "codex"),
            Self::Opencode => write!(f, "opencode"),
        }
    }
}

/// A named session mode advertised by an adapter or declared statically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMode {
    pub id: String,
    pub name: String,
}

impl SessionMode {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into() }
    }
}

/// Current + available modes for a live session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionModeState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_mode_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_modes: Vec<SessionMode>,
}

impl SessionModeState {
    /// True when `mode_id` is one of the available modes.
    pub fn contains(&self, mode_id: &str) -> bool {
        self.available_modes.iter().any(|m| m.id == mode_id)
    }
}

impl ProviderOptions {
    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Claude { .. } => ProviderKind::Claude,
            Self::Codex => ProviderKind::Codex,
            Self::Opencode => ProviderKind::Opencode,
        }
    }

    /// Whether the adapter can reload a previous session by id.
    pub fn supports_session_persistence(&self) -> bool {
        matches!(self, Self::Claude { .. })
    }

    /// The persisted session id carried on the options, if any.
    pub fn persisted_session_id(&self) -> Option<&str> {
        match self {
            Self::Claude { session_id } => session_id.as_deref(),
            _ => None,
        }
    }

    /// Store a session id for the next load, when the provider persists.
    pub fn with_session_id(self, id: Option<String>) -> Self {
        match self {
            Self::Claude { .. } => Self::Claude { session_id: id },
            other => other,
        }
    }

    /// Static mode list used when the adapter does not advertise modes.
    pub fn static_modes(&self) -> Vec<SessionMode> {
        match self.kind() {
            ProviderKind::Claude => vec![
                SessionMode::new("default", "Always Ask"),
                SessionMode::new("acceptEdits", "Accept Edits"),
                SessionMode::new("bypassPermissions", "Bypass Permissions"),
                SessionMode::new("plan", "Plan Mode"),
            ],
            ProviderKind::Codex | ProviderKind::Opencode => Vec::new(),
        }
    }

    /// Default mode id used to remap an unknown requested mode.
    pub fn default_mode_id(&self) -> Option<&'static str> {
        match self.kind() {
            ProviderKind::Claude => Some("default"),
            ProviderKind::Codex | ProviderKind::Opencode => None,
        }
    }

    /// Spawn argv for the provider's ACP child process.
    pub fn command(&self) -> Vec<String> {
        let argv: &[&str] = match self.kind() {
            ProviderKind::Claude => &["claude-code-acp"],
            ProviderKind::Codex => &["codex-acp"],
            ProviderKind::Opencode => &["opencode", "acp"],
        };
        argv.iter().map(|s| s.to_string()).collect()
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
