// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client-side host runtime: transport candidates, latency probing, an
//! adaptive connection controller with hysteresis, and the store that
//! manages one controller per configured server.
//!
//! Everything here publishes immutable snapshots; UI layers only read
//! snapshots and never reach into live connections.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod client;
pub mod controller;
pub mod probe;
pub mod profile;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::{ClientStatus, HostClient, HostClientBuilder, HostError, WsClientBuilder};
pub use controller::{
    AgentDirectoryStatus, ConnectionStatus, HostRuntimeController, HostRuntimeSnapshot,
    ReasonCode, SWITCH_CONSECUTIVE_WINS, SWITCH_LATENCY_ADVANTAGE_MS,
};
pub use paseo_wire::{PairingError, PairingOffer};
pub use probe::{ProbeResult, Prober, TcpRttProber};
pub use profile::{HostConnection, HostProfile, TransportKind};
pub use store::HostRuntimeStore;
