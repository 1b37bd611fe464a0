// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon identity: stable server id + keypair, persisted under
//! `$PASEO_HOME`.
//!
//! The server id survives restarts so clients can key their controllers
//! and subscription ids on it. The key material is opaque to the core; the
//! relay handshake transports the public half out-of-band via the pairing
//! URL.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("io error on {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed identity file: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Persisted daemon identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub server_id: String,
    pub public_key_b64: String,
    pub secret_key_b64: String,
}

impl Identity {
    fn generate() -> Self {
        Self {
            server_id: format!("srv_{}", nanoid::nanoid!(16)),
            public_key_b64: random_key_b64(),
            secret_key_b64: random_key_b64(),
        }
    }

    /// Load the identity, creating and persisting one on first start.
    pub fn load_or_create(path: &Path) -> Result<Self, IdentityError> {
        let io = |source| IdentityError::Io { path: path.to_path_buf(), source };
        match std::fs::read_to_string(path) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let identity = Self::generate();
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(io)?;
                }
                std::fs::write(path, serde_json::to_string_pretty(&identity)?.as_bytes())
                    .map_err(io)?;
                info!(server_id = %identity.server_id, "generated daemon identity");
                Ok(identity)
            }
            Err(e) => Err(io(e)),
        }
    }
}

/// 32 opaque random bytes, base64. Key exchange internals live outside the
/// core; this is only the stable blob the pairing URL carries.
fn random_key_b64() -> String {
    let mut bytes = [0u8; 32];
    bytes[..16].copy_from_slice(uuid::Uuid::new_v4().as_bytes());
    bytes[16..].copy_from_slice(uuid::Uuid::new_v4().as_bytes());
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[cfg(test)]
#[path = "identity_tests.rs"]
mod tests;
