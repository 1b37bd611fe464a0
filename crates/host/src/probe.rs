// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Latency probing: one side-effect-free RTT measurement per candidate.

use crate::profile::HostConnection;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Latest probe outcome for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProbeResult {
    Available { latency_ms: u64 },
    Unavailable,
}

impl ProbeResult {
    pub fn latency_ms(&self) -> Option<u64> {
        match self {
            Self::Available { latency_ms } => Some(*latency_ms),
            Self::Unavailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available { .. })
    }
}

/// Measures RTT to one candidate without establishing a session.
#[async_trait]
pub trait Prober: Send + Sync + 'static {
    async fn probe(&self, candidate: &HostConnection) -> ProbeResult;
}

/// Production prober: a TCP connect round-trip, bounded by a timeout.
pub struct TcpRttProber {
    pub timeout: Duration,
}

impl Default for TcpRttProber {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(3) }
    }
}

#[async_trait]
impl Prober for TcpRttProber {
    async fn probe(&self, candidate: &HostConnection) -> ProbeResult {
        let start = tokio::time::Instant::now();
        let connect = tokio::net::TcpStream::connect(candidate.endpoint());
        match tokio::time::timeout(self.timeout, connect).await {
            Ok(Ok(_stream)) => {
                ProbeResult::Available { latency_ms: start.elapsed().as_millis() as u64 }
            }
            _ => ProbeResult::Unavailable,
        }
    }
}

#[cfg(test)]
#[path = "probe_tests.rs"]
mod tests;
