// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Adaptive connection controller for one server.
//!
//! All state is published as immutable snapshots through a watch channel;
//! observers always see a coherent (status, active connection, client,
//! generation) combination. Overlap safety rests on three monotonic
//! counters: the probe version (stale cycles are dropped at application),
//! the switch version (stale switch attempts abandon themselves at each
//! await point), and the client generation (stale client status never
//! overrides a newer client's).

use crate::client::{ClientStatus, HostClient, HostClientBuilder, HostError};
use crate::probe::{ProbeResult, Prober};
use crate::profile::{HostConnection, HostProfile};
use paseo_core::clock::epoch_ms_now;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// An alternative must beat the active candidate by this many milliseconds
/// to count as a win.
pub const SWITCH_LATENCY_ADVANTAGE_MS: u64 = 40;

/// Consecutive winning probe cycles required before an adaptive switch.
pub const SWITCH_CONSECUTIVE_WINS: u32 = 3;

/// Connection status surfaced to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Idle,
    Connecting,
    Online,
    Offline,
    Error,
}

/// Directory freshness, orthogonal to the connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentDirectoryStatus {
    Idle,
    InitialLoading,
    Revalidating,
    Ready,
    ErrorBeforeFirstSuccess,
    ErrorAfterReady,
}

/// Classified failure reasons for structured logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonCode {
    ConnectTimeout,
    Disposed,
    ClientClosed,
    TransportError,
    ConnectFailed,
    Unknown,
}

/// Map a raw reason string onto its classification.
pub fn classify_reason(raw: &str) -> ReasonCode {
    let lower = raw.to_lowercase();
    if lower.contains("connect_timeout") || lower.contains("timed out") {
        ReasonCode::ConnectTimeout
    } else if lower.contains("disposed") {
        ReasonCode::Disposed
    } else if lower.contains("client_closed") || lower.contains("closed") {
        ReasonCode::ClientClosed
    } else if lower.contains("connect failed") || lower.contains("connect_failed") {
        ReasonCode::ConnectFailed
    } else if lower.contains("io error")
        || lower.contains("transport")
        || lower.contains("reset")
        || lower.contains("broken pipe")
    {
        ReasonCode::TransportError
    } else {
        ReasonCode::Unknown
    }
}

/// Immutable controller state. Published atomically; shared by value.
#[derive(Clone)]
pub struct HostRuntimeSnapshot {
    pub server_id: String,
    pub active_connection_id: Option<String>,
    pub active_connection: Option<HostConnection>,
    pub connection_status: ConnectionStatus,
    pub last_error: Option<String>,
    pub last_online_at_ms: Option<u64>,
    pub probes: HashMap<String, ProbeResult>,
    pub client: Option<Arc<dyn HostClient>>,
    /// Strictly increases on every new active client.
    pub client_generation: u64,
    pub agent_directory_status: AgentDirectoryStatus,
    pub agent_directory_error: Option<String>,
    pub has_ever_loaded_agent_directory: bool,
}

impl std::fmt::Debug for HostRuntimeSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostRuntimeSnapshot")
            .field("server_id", &self.server_id)
            .field("active_connection_id", &self.active_connection_id)
            .field("connection_status", &self.connection_status)
            .field("last_error", &self.last_error)
            .field("client_generation", &self.client_generation)
            .field("has_client", &self.client.is_some())
            .field("agent_directory_status", &self.agent_directory_status)
            .finish()
    }
}

impl HostRuntimeSnapshot {
    fn initial(server_id: String) -> Self {
        Self {
            server_id,
            active_connection_id: None,
            active_connection: None,
            connection_status: ConnectionStatus::Idle,
            last_error: None,
            last_online_at_ms: None,
            probes: HashMap::new(),
            client: None,
            client_generation: 0,
            agent_directory_status: AgentDirectoryStatus::Idle,
            agent_directory_error: None,
            has_ever_loaded_agent_directory: false,
        }
    }

    pub fn is_online(&self) -> bool {
        self.connection_status == ConnectionStatus::Online
    }
}

#[derive(Default)]
struct WinsCounter {
    candidate: Option<String>,
    count: u32,
}

struct Inner {
    builder: Arc<dyn HostClientBuilder>,
    prober: Arc<dyn Prober>,
    profile: Mutex<HostProfile>,
    snapshot_tx: watch::Sender<HostRuntimeSnapshot>,
    probe_version: AtomicU64,
    applied_probe_version: AtomicU64,
    switch_version: AtomicU64,
    /// Serializes the close→build→publish critical section of a switch;
    /// superseded attempts abort at the version checkpoints.
    switch_lock: tokio::sync::Mutex<()>,
    wins: Mutex<WinsCounter>,
    stopped: AtomicBool,
}

/// Controller for one server. Cheap to clone.
#[derive(Clone)]
pub struct HostRuntimeController {
    inner: Arc<Inner>,
}

impl HostRuntimeController {
    pub fn new(
        profile: HostProfile,
        builder: Arc<dyn HostClientBuilder>,
        prober: Arc<dyn Prober>,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(HostRuntimeSnapshot::initial(
            profile.server_id.clone(),
        ));
        Self {
            inner: Arc::new(Inner {
                builder,
                prober,
                profile: Mutex::new(profile),
                snapshot_tx,
                probe_version: AtomicU64::new(0),
                applied_probe_version: AtomicU64::new(0),
                switch_version: AtomicU64::new(0),
                switch_lock: tokio::sync::Mutex::new(()),
                wins: Mutex::new(WinsCounter::default()),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    pub fn server_id(&self) -> String {
        self.inner.profile.lock().server_id.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<HostRuntimeSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> HostRuntimeSnapshot {
        self.inner.snapshot_tx.borrow().clone()
    }

    /// Probe, pick the startup candidate, and connect.
    pub async fn start(&self) {
        self.run_probe_cycle_now().await;
        if self.snapshot().active_connection_id.is_some() {
            return;
        }
        // No candidate was selected by the probe pass (e.g. everything
        // unavailable): fall back to the preferred or first candidate.
        let fallback = {
            let profile = self.inner.profile.lock();
            profile
                .preferred_connection_id
                .clone()
                .filter(|id| profile.candidate(id).is_some())
                .or_else(|| profile.connections.first().map(|c| c.id.clone()))
        };
        if let Some(id) = fallback {
            if let Err(e) = self.switch_to_connection(&id, None).await {
                debug!(server_id = %self.server_id(), err = %e, "fallback connect failed");
            }
        }
    }

    /// One probe cycle: measure every candidate in parallel, apply the
    /// results unless a newer cycle already landed, then evaluate the
    /// selection policy.
    pub async fn run_probe_cycle_now(&self) {
        let version = self.inner.probe_version.fetch_add(1, Ordering::SeqCst) + 1;
        let candidates = self.inner.profile.lock().connections.clone();

        let measured = futures_util::future::join_all(candidates.iter().map(|candidate| {
            let prober = Arc::clone(&self.inner.prober);
            async move { (candidate.id.clone(), prober.probe(candidate).await) }
        }))
        .await;

        // Results from prior cycles are dropped at the point of application.
        let applied = &self.inner.applied_probe_version;
        let mut current = applied.load(Ordering::SeqCst);
        loop {
            if version <= current {
                debug!(version, current, "dropping stale probe cycle");
                return;
            }
            match applied.compare_exchange(
                current,
                version,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(newer) => current = newer,
            }
        }

        let probes: HashMap<String, ProbeResult> = measured.into_iter().collect();
        self.publish(|snap| snap.probes = probes.clone());

        if self.inner.stopped.load(Ordering::SeqCst) {
            return;
        }
        self.evaluate_selection(version).await;
    }

    /// Selection policy: startup pick, immediate failover, or hysteresis.
    async fn evaluate_selection(&self, probe_version: u64) {
        let snap = self.snapshot();
        let probes = &snap.probes;

        let active_latency = snap
            .active_connection_id
            .as_ref()
            .and_then(|id| probes.get(id))
            .and_then(ProbeResult::latency_ms);

        match (&snap.active_connection_id, active_latency) {
            (None, _) => {
                let choice = startup_choice(&self.inner.profile.lock(), probes);
                if let Some(choice) = choice {
                    if let Err(e) = self.switch_to_connection(&choice, Some(probe_version)).await
                    {
                        debug!(candidate = %choice, err = %e, "startup connect failed");
                    }
                }
            }
            (Some(active_id), None) => {
                // Active became unavailable: best available wins now.
                self.inner.wins.lock().count = 0;
                let best = best_available(probes, Some(active_id));
                if let Some((id, _)) = best {
                    info!(from = %active_id, to = %id, "failing over");
                    if let Err(e) = self.switch_to_connection(&id, Some(probe_version)).await {
                        warn!(candidate = %id, err = %e, "failover connect failed");
                    }
                }
            }
            (Some(active_id), Some(active_ms)) => {
                let challenger = best_available(probes, Some(active_id)).filter(
                    |(_, latency_ms)| latency_ms + SWITCH_LATENCY_ADVANTAGE_MS <= active_ms,
                );
                let winner = {
                    let mut wins = self.inner.wins.lock();
                    match challenger {
                        Some((id, _)) => {
                            if wins.candidate.as_deref() == Some(id.as_str()) {
                                wins.count += 1;
                            } else {
                                wins.candidate = Some(id.clone());
                                wins.count = 1;
                            }
                            (wins.count >= SWITCH_CONSECUTIVE_WINS).then(|| {
                                wins.count = 0;
                                id
                            })
                        }
                        None => {
                            wins.candidate = None;
                            wins.count = 0;
                            None
                        }
                    }
                };
                if let Some(id) = winner {
                    info!(from = %active_id, to = %id, "adaptive switch after consecutive wins");
                    if let Err(e) = self.switch_to_connection(&id, Some(probe_version)).await {
                        warn!(candidate = %id, err = %e, "adaptive switch failed");
                    }
                }
            }
        }
    }

    /// Versioned switch. Abandons itself whenever a newer switch or probe
    /// cycle supersedes it; any client it created is closed on abandon.
    pub async fn switch_to_connection(
        &self,
        connection_id: &str,
        expected_probe_version: Option<u64>,
    ) -> Result<(), HostError> {
        let my_version = self.inner.switch_version.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = self.inner.switch_lock.lock().await;

        if self.inner.switch_version.load(Ordering::SeqCst) != my_version {
            debug!(connection_id, "switch abandoned: superseded while queued");
            return Ok(());
        }
        if let Some(expected) = expected_probe_version {
            if expected != self.inner.applied_probe_version.load(Ordering::SeqCst) {
                debug!(connection_id, "switch abandoned: stale probe version");
                return Ok(());
            }
        }
        if self.inner.stopped.load(Ordering::SeqCst) {
            return Ok(());
        }

        let candidate = self
            .inner
            .profile
            .lock()
            .candidate(connection_id)
            .cloned()
            .ok_or_else(|| {
                HostError::Connect(format!("unknown candidate {}", connection_id))
            })?;

        // Close the previous client before creating its successor.
        let previous = self.snapshot().client.clone();
        if let Some(previous) = previous {
            previous.close("disposed").await;
        }
        if self.inner.switch_version.load(Ordering::SeqCst) != my_version {
            debug!(connection_id, "switch abandoned after close");
            return Ok(());
        }

        let generation = self.snapshot().client_generation + 1;
        let server_id = self.server_id();
        let client = self
            .inner
            .builder
            .build(&server_id, &candidate, generation)
            .await?;
        if self.inner.switch_version.load(Ordering::SeqCst) != my_version {
            client.close("disposed").await;
            debug!(connection_id, "switch abandoned after build");
            return Ok(());
        }

        // One atomic snapshot: candidate + connecting + client + generation.
        self.publish(|snap| {
            snap.active_connection_id = Some(candidate.id.clone());
            snap.active_connection = Some(candidate.clone());
            snap.connection_status = ConnectionStatus::Connecting;
            snap.last_error = None;
            snap.client = Some(Arc::clone(&client));
            snap.client_generation = generation;
        });

        self.spawn_status_listener(Arc::clone(&client), generation);

        match client.connect().await {
            Ok(()) => Ok(()),
            Err(e) => {
                let message = format!("connect_failed: {}", e);
                // A stale failure must never override a newer client.
                self.publish_if_generation(generation, |snap| {
                    snap.connection_status = ConnectionStatus::Error;
                    snap.last_error = Some(message.clone());
                });
                warn!(connection_id, reason = ?classify_reason(&message), "connect failed");
                Err(e)
            }
        }
    }

    /// Drive controller status from one client's status stream, guarded by
    /// that client's generation.
    fn spawn_status_listener(&self, client: Arc<dyn HostClient>, generation: u64) {
        let controller = self.clone();
        tokio::spawn(async move {
            let mut rx = client.status();
            loop {
                let status = rx.borrow_and_update().clone();
                controller.apply_client_status(generation, status);
                if rx.changed().await.is_err() {
                    return;
                }
            }
        });
    }

    fn apply_client_status(&self, generation: u64, status: ClientStatus) {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return;
        }
        match status {
            ClientStatus::Idle | ClientStatus::Connecting => {}
            ClientStatus::Online => {
                self.publish_if_generation(generation, |snap| {
                    snap.connection_status = ConnectionStatus::Online;
                    snap.last_error = None;
                    snap.last_online_at_ms = Some(epoch_ms_now());
                });
            }
            ClientStatus::Closed { reason } => {
                debug!(reason = ?classify_reason(&reason), "client closed");
                self.publish_if_generation(generation, |snap| {
                    snap.connection_status = ConnectionStatus::Offline;
                });
            }
            ClientStatus::Error { reason } => {
                warn!(reason = ?classify_reason(&reason), raw = %reason, "client error");
                self.publish_if_generation(generation, |snap| {
                    snap.connection_status = ConnectionStatus::Error;
                    snap.last_error = Some(reason.clone());
                });
            }
        }
    }

    /// Replace the candidate set (profile revision). Re-selects when the
    /// active candidate vanished.
    pub async fn set_profile(&self, profile: HostProfile) {
        let active = {
            let mut held = self.inner.profile.lock();
            *held = profile;
            self.snapshot().active_connection_id
        };
        let still_exists = active
            .as_ref()
            .map(|id| self.inner.profile.lock().candidate(id).is_some())
            .unwrap_or(false);
        if active.is_some() && !still_exists {
            self.publish(|snap| {
                snap.active_connection_id = None;
                snap.active_connection = None;
            });
            self.run_probe_cycle_now().await;
        }
    }

    /// Stop the controller: close the client, invalidate in-flight
    /// switches, publish a final offline snapshot.
    pub async fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.switch_version.fetch_add(1, Ordering::SeqCst);
        let client = self.snapshot().client.clone();
        if let Some(client) = client {
            client.close("disposed").await;
        }
        self.publish(|snap| {
            snap.connection_status = ConnectionStatus::Offline;
            snap.client = None;
        });
    }

    // ---- agent directory status (orthogonal to the connection) ----

    pub fn mark_directory_fetch_started(&self) {
        self.publish(|snap| {
            snap.agent_directory_status = if snap.has_ever_loaded_agent_directory {
                AgentDirectoryStatus::Revalidating
            } else {
                AgentDirectoryStatus::InitialLoading
            };
        });
    }

    pub fn mark_directory_ready(&self) {
        self.publish(|snap| {
            snap.agent_directory_status = AgentDirectoryStatus::Ready;
            snap.agent_directory_error = None;
            snap.has_ever_loaded_agent_directory = true;
        });
    }

    pub fn mark_directory_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.publish(|snap| {
            snap.agent_directory_status = if snap.has_ever_loaded_agent_directory {
                AgentDirectoryStatus::ErrorAfterReady
            } else {
                AgentDirectoryStatus::ErrorBeforeFirstSuccess
            };
            snap.agent_directory_error = Some(message.clone());
        });
    }

    // ---- snapshot publication ----

    fn publish(&self, mutate: impl FnOnce(&mut HostRuntimeSnapshot)) {
        self.inner.snapshot_tx.send_modify(|snap| {
            let prev_generation = snap.client_generation;
            let prev_online = snap.last_online_at_ms;
            mutate(snap);
            // Monotonicity: the generation never decreases and
            // last_online_at never regresses.
            snap.client_generation = snap.client_generation.max(prev_generation);
            snap.last_online_at_ms = match (prev_online, snap.last_online_at_ms) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (Some(a), None) => Some(a),
                (None, b) => b,
            };
        });
    }

    fn publish_if_generation(
        &self,
        generation: u64,
        mutate: impl FnOnce(&mut HostRuntimeSnapshot),
    ) {
        let current = self.inner.snapshot_tx.borrow().client_generation;
        if current != generation {
            debug!(generation, current, "dropping stale client status");
            return;
        }
        self.publish(mutate);
    }
}

/// Lowest-latency available candidate, excluding `skip`.
fn best_available(
    probes: &HashMap<String, ProbeResult>,
    skip: Option<&String>,
) -> Option<(String, u64)> {
    probes
        .iter()
        .filter(|(id, _)| Some(*id) != skip)
        .filter_map(|(id, result)| result.latency_ms().map(|ms| (id.clone(), ms)))
        .min_by_key(|(id, ms)| (*ms, id.clone()))
}

/// Startup pick: lowest latency wins; the preferred candidate is used only
/// when nothing is strictly faster. With nothing available, `None` (the
/// caller falls back to preferred-or-first).
fn startup_choice(
    profile: &HostProfile,
    probes: &HashMap<String, ProbeResult>,
) -> Option<String> {
    let best = best_available(probes, None)?;
    if let Some(preferred) = &profile.preferred_connection_id {
        if let Some(preferred_ms) =
            probes.get(preferred).and_then(ProbeResult::latency_ms)
        {
            if preferred_ms <= best.1 {
                return Some(preferred.clone());
            }
        }
    }
    Some(best.0)
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
