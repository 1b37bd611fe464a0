// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store tests: host sync, first-online bootstrap, revalidation.

use super::*;
use crate::controller::AgentDirectoryStatus;
use crate::test_support::{up, FakeBuilder, ScriptedProber};
use paseo_wire::Response;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn profile(server_id: &str, endpoint: &str) -> HostProfile {
    HostProfile {
        server_id: server_id.to_string(),
        name: None,
        connections: vec![crate::profile::HostConnection::direct(endpoint)],
        preferred_connection_id: None,
    }
}

struct Rig {
    store: HostRuntimeStore,
    prober: Arc<ScriptedProber>,
    builder: Arc<FakeBuilder>,
}

fn rig() -> Rig {
    let prober = Arc::new(ScriptedProber::default());
    let builder = Arc::new(FakeBuilder::default());
    let store = HostRuntimeStore::new(
        Arc::clone(&builder) as Arc<dyn HostClientBuilder>,
        Arc::clone(&prober) as Arc<dyn Prober>,
    );
    Rig { store, prober, builder }
}

async fn wait_until(mut check: impl FnMut() -> bool, what: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn sync_hosts_adds_starts_and_removes_controllers() {
    let r = rig();
    r.prober.push("direct:a:1", up(10));
    r.store.sync_hosts(vec![profile("srv_a", "a:1")]).await;

    wait_until(
        || {
            r.store
                .controller("srv_a")
                .map(|c| c.snapshot().is_online())
                .unwrap_or(false)
        },
        "srv_a online",
    )
    .await;
    assert_eq!(r.store.server_ids(), vec!["srv_a".to_string()]);

    // Removing the profile stops and drops the controller.
    let client = r.builder.client_for("direct:a:1").unwrap();
    r.store.sync_hosts(vec![]).await;
    assert!(r.store.controller("srv_a").is_none());
    assert!(client.closes.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn first_online_bootstraps_the_directory_exactly_once() {
    let r = rig();
    r.prober.push("direct:a:1", up(10));
    r.store.sync_hosts(vec![profile("srv_a", "a:1")]).await;

    wait_until(
        || {
            r.store
                .controller("srv_a")
                .map(|c| c.snapshot().has_ever_loaded_agent_directory)
                .unwrap_or(false)
        },
        "directory bootstrap",
    )
    .await;

    let controller = r.store.controller("srv_a").unwrap();
    assert_eq!(
        controller.snapshot().agent_directory_status,
        AgentDirectoryStatus::Ready
    );

    // Later snapshot churn does not re-trigger the bootstrap.
    r.prober.push("direct:a:1", up(12));
    r.store.run_probe_cycle_now(None).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let client = r.builder.client_for("direct:a:1").unwrap();
    assert_eq!(client.directory_fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn bootstrap_failure_is_recorded_and_manual_refresh_recovers() {
    let r = rig();
    r.prober.push("direct:a:1", up(10));
    r.builder.script_directory("direct:a:1", Err("relay hiccup".to_string()));
    r.store.sync_hosts(vec![profile("srv_a", "a:1")]).await;

    wait_until(
        || {
            r.store
                .controller("srv_a")
                .map(|c| {
                    c.snapshot().agent_directory_status
                        == AgentDirectoryStatus::ErrorBeforeFirstSuccess
                })
                .unwrap_or(false)
        },
        "bootstrap error recorded",
    )
    .await;

    // A manual refresh succeeds and flips to ready.
    let client = r.builder.client_for("direct:a:1").unwrap();
    *client.directory.lock() = Some(Ok(Response::Agents { agents: vec![] }));
    r.store.refresh_agent_directory("srv_a").await;
    let controller = r.store.controller("srv_a").unwrap();
    assert_eq!(
        controller.snapshot().agent_directory_status,
        AgentDirectoryStatus::Ready
    );
    assert!(controller.snapshot().has_ever_loaded_agent_directory);
}

#[tokio::test]
async fn refresh_all_marks_revalidating_then_ready() {
    let r = rig();
    r.prober.push("direct:a:1", up(10));
    r.store.sync_hosts(vec![profile("srv_a", "a:1")]).await;
    wait_until(
        || {
            r.store
                .controller("srv_a")
                .map(|c| c.snapshot().has_ever_loaded_agent_directory)
                .unwrap_or(false)
        },
        "initial bootstrap",
    )
    .await;

    r.store.refresh_all_agent_directories().await;
    let controller = r.store.controller("srv_a").unwrap();
    assert_eq!(
        controller.snapshot().agent_directory_status,
        AgentDirectoryStatus::Ready
    );
    let client = r.builder.client_for("direct:a:1").unwrap();
    assert_eq!(client.directory_fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn global_subscription_carries_per_server_snapshots() {
    let r = rig();
    let mut rx = r.store.subscribe_all();

    r.prober.push("direct:a:1", up(10));
    r.store.sync_hosts(vec![profile("srv_a", "a:1")]).await;

    wait_until(
        || {
            rx.borrow()
                .as_ref()
                .map(|(id, _)| id == "srv_a")
                .unwrap_or(false)
        },
        "global snapshot",
    )
    .await;

    let per_server = r.store.subscribe("srv_a").expect("per-server subscription");
    assert_eq!(per_server.borrow().server_id, "srv_a");
}

#[tokio::test]
async fn updating_a_profile_keeps_the_same_controller() {
    let r = rig();
    r.prober.push("direct:a:1", up(10));
    r.store.sync_hosts(vec![profile("srv_a", "a:1")]).await;
    wait_until(|| r.store.controller("srv_a").is_some(), "controller added").await;

    let before = r.store.controller("srv_a").unwrap();
    r.store.sync_hosts(vec![profile("srv_a", "a:1")]).await;
    let after = r.store.controller("srv_a").unwrap();
    assert_eq!(before.snapshot().server_id, after.snapshot().server_id);
    assert_eq!(r.store.server_ids().len(), 1);
}
