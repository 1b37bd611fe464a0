// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pairing URLs: `https://<app-host>/#offer=<base64url(JSON)>`.
//!
//! The daemon encodes an offer from its persisted identity; clients decode
//! it into transport candidates. v2 carries the relay endpoint and daemon
//! public key; v1 additionally carries a session id and direct endpoint
//! candidates. Unknown fields are tolerated so older clients survive newer
//! daemons.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PairingError {
    #[error("not a pairing url (missing #offer= fragment)")]
    MissingFragment,

    #[error("offer is not valid base64url: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("offer is not valid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported offer version {0}")]
    UnsupportedVersion(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayHint {
    pub endpoint: String,
}

/// The decoded offer payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingOffer {
    pub v: u32,
    pub server_id: String,
    pub daemon_public_key_b64: String,
    pub relay: RelayHint,
    /// v1 only: pairing session id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// v1 only: direct host:port candidates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<String>,
}

impl PairingOffer {
    /// Parse a full pairing URL.
    pub fn parse_url(url: &str) -> Result<Self, PairingError> {
        let fragment = url
            .split_once("#offer=")
            .map(|(_, frag)| frag)
            .ok_or(PairingError::MissingFragment)?;
        Self::parse_fragment(fragment)
    }

    /// Parse just the base64url offer payload.
    pub fn parse_fragment(fragment: &str) -> Result<Self, PairingError> {
        let raw = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(fragment)?;
        let offer: Self = serde_json::from_slice(&raw)?;
        match offer.v {
            1 | 2 => Ok(offer),
            other => Err(PairingError::UnsupportedVersion(other)),
        }
    }

    /// Encode into a pairing URL rooted at `app_host`.
    pub fn to_url(&self, app_host: &str) -> Result<String, PairingError> {
        let json = serde_json::to_vec(self)?;
        let fragment = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json);
        Ok(format!("https://{}/#offer={}", app_host, fragment))
    }

}

#[cfg(test)]
#[path = "pairing_tests.rs"]
mod tests;
