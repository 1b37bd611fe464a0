// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup, lock exclusivity, and pairing offers.

use super::*;
use serial_test::serial;

fn config_in(dir: &std::path::Path) -> Config {
    Config {
        home: dir.to_path_buf(),
        listen: "127.0.0.1:0".to_string(),
        agents_path: dir.join("agents.jsonl"),
        identity_path: dir.join("identity.json"),
        lock_path: dir.join("daemon.pid"),
        log_path: dir.join("daemon.log"),
    }
}

#[tokio::test]
#[serial]
async fn startup_creates_identity_and_binds_an_ephemeral_port() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = startup(config_in(dir.path())).await.unwrap();

    assert!(daemon.identity.server_id.starts_with("srv_"));
    assert!(dir.path().join("identity.json").exists());
    assert!(dir.path().join("daemon.pid").exists());
    let addr = daemon.gateway.local_addr().unwrap();
    assert_ne!(addr.port(), 0);
}

#[tokio::test]
#[serial]
async fn second_daemon_on_the_same_home_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let first = startup(config_in(dir.path())).await.unwrap();

    match startup(config_in(dir.path())).await {
        Err(LifecycleError::AlreadyRunning(path)) => {
            assert_eq!(path, dir.path().join("daemon.pid"));
        }
        other => panic!("expected AlreadyRunning, got {:?}", other.is_ok()),
    }
    drop(first);
}

#[tokio::test]
#[serial]
async fn pairing_url_is_v2_without_a_lan_ip_and_v1_with_one() {
    let dir = tempfile::tempdir().unwrap();
    std::env::remove_var("PASEO_PRIMARY_LAN_IP");
    let daemon = startup(config_in(dir.path())).await.unwrap();

    let url = daemon.pairing_url(true).expect("pairing url");
    let offer = paseo_wire::PairingOffer::parse_url(&url).unwrap();
    assert_eq!(offer.v, 2);
    assert_eq!(offer.server_id, daemon.identity.server_id);
    assert_eq!(offer.daemon_public_key_b64, daemon.identity.public_key_b64);
    assert!(offer.endpoints.is_empty());

    std::env::set_var("PASEO_PRIMARY_LAN_IP", "192.168.7.7");
    let url = daemon.pairing_url(true).expect("v1 pairing url");
    let offer = paseo_wire::PairingOffer::parse_url(&url).unwrap();
    assert_eq!(offer.v, 1);
    assert_eq!(offer.endpoints, vec!["192.168.7.7:0".to_string()]);
    assert!(offer.session_id.is_some());
    std::env::remove_var("PASEO_PRIMARY_LAN_IP");

    // Relay disabled: nothing to advertise.
    assert_eq!(daemon.pairing_url(false), None);
}
