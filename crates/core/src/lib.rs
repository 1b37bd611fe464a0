// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Core domain types shared by the daemon and host runtime.
//!
//! This crate is dependency-light by design: ids, persisted records,
//! provider variants, and timeline update shapes. Anything that touches
//! processes, sockets, or the filesystem lives in `paseo-daemon`.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod clock;
pub mod id;
mod provider;
mod record;
mod timeline;

pub use provider::{ProviderKind, ProviderOptions, SessionMode, SessionModeState};
pub use record::AgentRecord;
pub use timeline::{
    AgentStatus, AgentUpdate, ContentBlock, PermissionOption, PermissionOptionKind,
    PermissionOutcome, PromptContent, StopReason, TimelineEntry, ToolCall, ToolCallStatus,
    TurnTracker,
};

define_id! {
    /// Identifier for a managed agent. Stable across daemon restarts.
    pub struct AgentId("agt-");
}

define_id! {
    /// Identifier for a terminal owned by the multiplexer.
    pub struct TerminalId("term-");
}

define_id! {
    /// Identifier for one attachment of a terminal byte stream.
    pub struct StreamId("stm-");
}
