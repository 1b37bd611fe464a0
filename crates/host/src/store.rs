// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry of one controller per configured server.
//!
//! The store diffs host profiles in and out, watches each controller for
//! its first online transition, and bootstraps the agent directory exactly
//! once per server (concurrent transitions collapse into one in-flight
//! fetch; failures may be retried on a later transition).

use crate::client::HostClientBuilder;
use crate::controller::{ConnectionStatus, HostRuntimeController, HostRuntimeSnapshot};
use crate::probe::Prober;
use crate::profile::HostProfile;
use parking_lot::Mutex;
use paseo_wire::{Request, Response};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

struct StoreInner {
    builder: Arc<dyn HostClientBuilder>,
    prober: Arc<dyn Prober>,
    controllers: Mutex<HashMap<String, HostRuntimeController>>,
    /// Servers whose directory bootstrap has succeeded.
    bootstrapped: Mutex<HashSet<String>>,
    /// Servers with a bootstrap currently in flight.
    bootstrap_inflight: Mutex<HashSet<String>>,
    /// Global stream of (server_id, snapshot) pairs.
    global_tx: watch::Sender<Option<(String, HostRuntimeSnapshot)>>,
}

/// Process-wide registry of host runtime controllers.
#[derive(Clone)]
pub struct HostRuntimeStore {
    inner: Arc<StoreInner>,
}

impl HostRuntimeStore {
    pub fn new(builder: Arc<dyn HostClientBuilder>, prober: Arc<dyn Prober>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                builder,
                prober,
                controllers: Mutex::new(HashMap::new()),
                bootstrapped: Mutex::new(HashSet::new()),
                bootstrap_inflight: Mutex::new(HashSet::new()),
                global_tx: watch::channel(None).0,
            }),
        }
    }

    pub fn controller(&self, server_id: &str) -> Option<HostRuntimeController> {
        self.inner.controllers.lock().get(server_id).cloned()
    }

    pub fn server_ids(&self) -> Vec<String> {
        self.inner.controllers.lock().keys().cloned().collect()
    }

    /// Per-server snapshot subscription.
    pub fn subscribe(&self, server_id: &str) -> Option<watch::Receiver<HostRuntimeSnapshot>> {
        self.controller(server_id).map(|c| c.subscribe())
    }

    /// Global subscription: the latest (server_id, snapshot) pair.
    pub fn subscribe_all(&self) -> watch::Receiver<Option<(String, HostRuntimeSnapshot)>> {
        self.inner.global_tx.subscribe()
    }

    /// Reconcile the controller set with the given profiles: add new
    /// servers, update existing ones, stop and drop removed ones.
    pub async fn sync_hosts(&self, profiles: Vec<HostProfile>) {
        let incoming: HashSet<String> =
            profiles.iter().map(|p| p.server_id.clone()).collect();

        let removed: Vec<HostRuntimeController> = {
            let mut controllers = self.inner.controllers.lock();
            let stale: Vec<String> = controllers
                .keys()
                .filter(|id| !incoming.contains(*id))
                .cloned()
                .collect();
            stale.iter().filter_map(|id| controllers.remove(id)).collect()
        };
        for controller in removed {
            info!(server_id = %controller.server_id(), "stopping removed host");
            controller.stop().await;
        }

        for profile in profiles {
            let existing = self.controller(&profile.server_id);
            match existing {
                Some(controller) => {
                    controller.set_profile(profile).await;
                }
                None => {
                    let controller = HostRuntimeController::new(
                        profile.clone(),
                        Arc::clone(&self.inner.builder),
                        Arc::clone(&self.inner.prober),
                    );
                    self.inner
                        .controllers
                        .lock()
                        .insert(profile.server_id.clone(), controller.clone());
                    self.watch_controller(profile.server_id.clone(), controller.clone());
                    let starter = controller.clone();
                    tokio::spawn(async move { starter.start().await });
                }
            }
        }
    }

    /// Probe now: either the named servers or all of them.
    pub async fn run_probe_cycle_now(&self, server_ids: Option<&[String]>) {
        let controllers: Vec<HostRuntimeController> = {
            let held = self.inner.controllers.lock();
            match server_ids {
                Some(ids) => ids.iter().filter_map(|id| held.get(id).cloned()).collect(),
                None => held.values().cloned().collect(),
            }
        };
        futures_util::future::join_all(
            controllers.iter().map(|c| c.run_probe_cycle_now()),
        )
        .await;
    }

    /// Re-fetch every online server's directory (revalidation).
    pub async fn refresh_all_agent_directories(&self) {
        let ids = self.server_ids();
        for server_id in ids {
            if let Some(controller) = self.controller(&server_id) {
                if controller.snapshot().is_online() {
                    self.refresh_agent_directory(&server_id).await;
                }
            }
        }
    }

    /// Fetch the directory for one server, binding the app-scoped
    /// subscription so deltas keep flowing on the same id across
    /// reconnects.
    pub async fn refresh_agent_directory(&self, server_id: &str) {
        let Some(controller) = self.controller(server_id) else { return };
        let Some(client) = controller.snapshot().client else {
            debug!(server_id, "directory refresh skipped: no client");
            return;
        };

        controller.mark_directory_fetch_started();
        let subscription_id = format!("app:{}", server_id);
        match client
            .request(Request::FetchAgents { subscription_id: Some(subscription_id) })
            .await
        {
            Ok(Response::Agents { agents }) => {
                debug!(server_id, agents = agents.len(), "agent directory loaded");
                controller.mark_directory_ready();
                self.inner.bootstrapped.lock().insert(server_id.to_string());
            }
            Ok(Response::Error { code, message }) => {
                warn!(server_id, %code, %message, "agent directory fetch rejected");
                controller.mark_directory_error(message);
            }
            Ok(other) => {
                warn!(server_id, "unexpected directory response: {:?}", other);
                controller.mark_directory_error("unexpected response shape");
            }
            Err(e) => {
                warn!(server_id, err = %e, "agent directory fetch failed");
                controller.mark_directory_error(e.to_string());
            }
        }
    }

    /// Mirror controller snapshots into the global stream and bootstrap the
    /// directory on the first online transition.
    fn watch_controller(&self, server_id: String, controller: HostRuntimeController) {
        let store = self.clone();
        tokio::spawn(async move {
            let mut rx = controller.subscribe();
            loop {
                let snapshot = rx.borrow_and_update().clone();
                let online = snapshot.connection_status == ConnectionStatus::Online;
                let _ = store
                    .inner
                    .global_tx
                    .send(Some((server_id.clone(), snapshot)));

                if online {
                    store.maybe_bootstrap(&server_id).await;
                }

                if rx.changed().await.is_err() {
                    return;
                }
                // Stop mirroring once the controller is dropped from the set.
                if store.controller(&server_id).is_none() {
                    return;
                }
            }
        });
    }

    /// First-online bootstrap; concurrent transitions collapse.
    async fn maybe_bootstrap(&self, server_id: &str) {
        {
            if self.inner.bootstrapped.lock().contains(server_id) {
                return;
            }
            let mut inflight = self.inner.bootstrap_inflight.lock();
            if !inflight.insert(server_id.to_string()) {
                return;
            }
        }
        info!(server_id, "bootstrapping agent directory");
        self.refresh_agent_directory(server_id).await;
        self.inner.bootstrap_inflight.lock().remove(server_id);
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
