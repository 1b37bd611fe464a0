// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client↔daemon wire protocol.
//!
//! Every WebSocket text frame is one JSON message: a [`ClientFrame`] inbound
//! or a [`ServerFrame`] outbound. Requests correlate to responses by
//! `request_id`; events are scoped to the client-chosen subscription id they
//! were bound with. Terminal byte payloads travel base64-encoded.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod event;
mod frame;
pub mod pairing;
mod request;
mod response;
mod types;

pub use event::Event;
pub use pairing::{PairingError, PairingOffer, RelayHint};
pub use frame::{decode_client, decode_server, encode_client, encode_server, ClientFrame,
    ServerFrame, WireError};
pub use request::{Request, TerminalInput};
pub use response::Response;
pub use types::{decode_bytes, encode_bytes, AgentInfo, ErrorCode, KeyEvent, TerminalInfo};

/// Protocol version exchanged in the hello handshake.
pub const PROTOCOL_VERSION: u32 = 2;

#[cfg(test)]
mod property_tests;
