// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::LifecycleError;

/// Daemon version (from Cargo.toml)
pub const DAEMON_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Resolve the persistence root: PASEO_HOME > ~/.paseo
pub fn paseo_home() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("PASEO_HOME") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir().map(|h| h.join(".paseo")).ok_or(LifecycleError::NoHomeDir)
}

/// Listener bind address: PASEO_LISTEN > 127.0.0.1:6767
pub fn listen_addr() -> String {
    std::env::var("PASEO_LISTEN").unwrap_or_else(|_| "127.0.0.1:6767".to_string())
}

/// LAN IP advertised in v1 pairing endpoints, when set.
pub fn primary_lan_ip() -> Option<String> {
    std::env::var("PASEO_PRIMARY_LAN_IP").ok().filter(|s| !s.is_empty())
}

/// Relay endpoint advertised in pairing offers.
pub fn relay_endpoint() -> String {
    std::env::var("PASEO_RELAY").unwrap_or_else(|_| "relay.paseo.sh:443".to_string())
}

/// App host pairing URLs point at.
pub fn app_host() -> String {
    std::env::var("PASEO_APP_HOST").unwrap_or_else(|_| "app.paseo.sh".to_string())
}

/// Auth token required in the hello handshake, when set.
pub fn auth_token() -> Option<String> {
    std::env::var("PASEO_AUTH_TOKEN").ok().filter(|s| !s.is_empty())
}

/// Handshake / single-request timeout
pub fn ipc_timeout() -> Duration {
    std::env::var("PASEO_IPC_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

/// Upper bound on one full prompt turn.
pub fn turn_timeout() -> Duration {
    std::env::var("PASEO_TURN_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(600))
}

/// Shutdown drain timeout (default 5s, configurable via `PASEO_DRAIN_TIMEOUT_MS`).
pub fn drain_timeout() -> Duration {
    std::env::var("PASEO_DRAIN_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

/// Grace period between SIGTERM and SIGKILL for children.
pub fn kill_grace() -> Duration {
    std::env::var("PASEO_KILL_GRACE_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
