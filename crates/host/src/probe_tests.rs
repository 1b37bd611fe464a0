// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RTT prober tests against real loopback sockets.

use super::*;
use crate::profile::HostConnection;

#[tokio::test]
async fn listening_endpoint_reports_available_with_a_sane_latency() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let prober = TcpRttProber::default();
    let result = prober.probe(&HostConnection::direct(addr.to_string())).await;

    match result {
        ProbeResult::Available { latency_ms } => {
            // Loopback: the RTT must be essentially instant.
            assert!(latency_ms < 1_000, "implausible loopback latency: {}ms", latency_ms);
        }
        ProbeResult::Unavailable => panic!("loopback listener reported unavailable"),
    }
    assert!(result.is_available());
    assert!(result.latency_ms().is_some());
}

#[tokio::test]
async fn closed_port_reports_unavailable() {
    // Bind then drop to get a port nothing is listening on.
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let prober = TcpRttProber::default();
    let result = prober.probe(&HostConnection::direct(addr.to_string())).await;
    assert_eq!(result, ProbeResult::Unavailable);
    assert_eq!(result.latency_ms(), None);
}

#[tokio::test]
async fn unroutable_endpoint_times_out_as_unavailable() {
    // TEST-NET-1 (192.0.2.0/24) is reserved and never routed; a short
    // timeout keeps the test fast whether the connect hangs or is refused.
    let prober = TcpRttProber { timeout: std::time::Duration::from_millis(200) };
    let started = tokio::time::Instant::now();
    let result = prober.probe(&HostConnection::direct("192.0.2.1:6767")).await;

    assert_eq!(result, ProbeResult::Unavailable);
    assert!(
        started.elapsed() < std::time::Duration::from_secs(2),
        "probe must respect its timeout"
    );
}

#[tokio::test]
async fn malformed_endpoint_is_unavailable_not_a_panic() {
    let prober = TcpRttProber::default();
    let result = prober.probe(&HostConnection::direct("not-an-endpoint")).await;
    assert_eq!(result, ProbeResult::Unavailable);
}
