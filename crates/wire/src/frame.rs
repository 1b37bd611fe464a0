// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frame envelopes and JSON encode/decode.
//!
//! One WebSocket text message is one frame. Inbound frames are requests;
//! outbound frames are correlated responses or subscription-scoped events.

use crate::{Event, Request, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Frame from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum ClientFrame {
    Request {
        request_id: String,
        #[serde(flatten)]
        request: Request,
    },
}

/// Frame from daemon to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum ServerFrame {
    Response {
        request_id: String,
        #[serde(flatten)]
        response: Response,
    },
    Event {
        subscription_id: String,
        #[serde(flatten)]
        event: Event,
    },
}

/// Errors from frame encoding/decoding.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("encoding error: {0}")]
    Encoding(String),
}

pub fn encode_client(frame: &ClientFrame) -> Result<String, WireError> {
    Ok(serde_json::to_string(frame)?)
}

pub fn decode_client(text: &str) -> Result<ClientFrame, WireError> {
    Ok(serde_json::from_str(text)?)
}

pub fn encode_server(frame: &ServerFrame) -> Result<String, WireError> {
    Ok(serde_json::to_string(frame)?)
}

pub fn decode_server(text: &str) -> Result<ServerFrame, WireError> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
