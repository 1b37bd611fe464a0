// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted agent record.
//!
//! Record existence is orthogonal to process existence: a record survives
//! daemon restarts and the agent's child process is started lazily on the
//! next prompt. The record must round-trip through JSON and tolerate
//! unknown fields written by newer daemons.

use crate::clock::epoch_ms_now;
use crate::{AgentId, ProviderOptions};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One persisted agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: AgentId,
    /// Human-readable title, defaulting to the cwd basename.
    #[serde(default)]
    pub title: String,
    pub provider: ProviderOptions,
    /// ACP session id from a previous run, for providers that persist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persisted_session_id: Option<String>,
    /// Epoch milliseconds when created
    pub created_at_ms: u64,
    /// Epoch milliseconds of last activity (prompt, notification, mode change)
    pub last_activity_at_ms: u64,
    /// Absolute working directory the agent is bound to.
    pub cwd: PathBuf,
    /// Free-form key→value labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl AgentRecord {
    pub fn new(provider: ProviderOptions, cwd: PathBuf) -> Self {
        let now = epoch_ms_now();
        let title = cwd
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| cwd.display().to_string());
        Self {
            id: AgentId::new(),
            title,
            provider,
            persisted_session_id: None,
            created_at_ms: now,
            last_activity_at_ms: now,
            cwd,
            labels: BTreeMap::new(),
        }
    }

    /// Bump the activity timestamp to now.
    pub fn touch(&mut self) {
        self.last_activity_at_ms = epoch_ms_now();
    }
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
