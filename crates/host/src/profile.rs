// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host profiles and transport candidates.

use serde::{Deserialize, Serialize};

/// How a candidate reaches the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportKind {
    /// Direct LAN endpoint (host:port).
    Direct { endpoint: String },
    /// Relay endpoint plus the daemon's public key for the tunnel
    /// handshake.
    Relay {
        endpoint: String,
        daemon_public_key_b64: String,
    },
}

/// One transport candidate. Ids are stable for a given profile revision:
/// `direct:<endpoint>` or `relay:<endpoint>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConnection {
    pub id: String,
    #[serde(flatten)]
    pub kind: TransportKind,
}

impl HostConnection {
    pub fn direct(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        Self { id: format!("direct:{}", endpoint), kind: TransportKind::Direct { endpoint } }
    }

    pub fn relay(endpoint: impl Into<String>, daemon_public_key_b64: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        Self {
            id: format!("relay:{}", endpoint),
            kind: TransportKind::Relay {
                endpoint,
                daemon_public_key_b64: daemon_public_key_b64.into(),
            },
        }
    }

    pub fn endpoint(&self) -> &str {
        match &self.kind {
            TransportKind::Direct { endpoint } | TransportKind::Relay { endpoint, .. } => {
                endpoint
            }
        }
    }
}

/// Everything a controller needs to reach one daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostProfile {
    pub server_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub connections: Vec<HostConnection>,
    /// Sticky user choice; used only when no strictly faster candidate
    /// exists at startup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_connection_id: Option<String>,
}

impl HostProfile {
    pub fn candidate(&self, id: &str) -> Option<&HostConnection> {
        self.connections.iter().find(|c| c.id == id)
    }

    /// Derive the candidate set a pairing offer advertises: the direct
    /// endpoints (v1) followed by the relay.
    pub fn from_offer(offer: &paseo_wire::PairingOffer) -> Self {
        let mut connections: Vec<HostConnection> =
            offer.endpoints.iter().map(HostConnection::direct).collect();
        connections.push(HostConnection::relay(
            offer.relay.endpoint.clone(),
            offer.daemon_public_key_b64.clone(),
        ));
        Self {
            server_id: offer.server_id.clone(),
            name: None,
            connections,
            preferred_connection_id: None,
        }
    }
}

#[cfg(test)]
#[path = "profile_tests.rs"]
mod tests;
