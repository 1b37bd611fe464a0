// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use std::sync::Arc;

fn incoming(raw: &str) -> Incoming {
    serde_json::from_str(raw).unwrap()
}

#[test]
fn classification_covers_all_frame_shapes() {
    let note = incoming(r#"{"jsonrpc":"2.0","method":"session/update","params":{}}"#);
    assert!(note.is_notification());
    assert!(!note.is_request());

    let req = incoming(r#"{"jsonrpc":"2.0","id":5,"method":"fs/read_text_file","params":{}}"#);
    assert!(req.is_request());
    assert!(!req.is_response());

    let resp = incoming(r#"{"jsonrpc":"2.0","id":5,"result":{"ok":true}}"#);
    assert!(resp.is_response());
    assert!(!resp.is_notification());
}

async fn sink_peer() -> (Arc<RpcPeer>, tokio::process::Child) {
    // A child that swallows stdin keeps the writer half happy while the
    // tests drive the response path by hand.
    let mut child = tokio::process::Command::new("cat")
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::null())
        .spawn()
        .unwrap();
    let stdin = child.stdin.take().unwrap();
    (Arc::new(RpcPeer::new(stdin)), child)
}

#[tokio::test]
async fn request_resolves_with_result() {
    let (peer, mut child) = sink_peer().await;

    let requester = Arc::clone(&peer);
    let handle = tokio::spawn(async move {
        requester.request("session/new", json!({"cwd": "/tmp"})).await
    });
    tokio::task::yield_now().await;

    peer.resolve(incoming(r#"{"jsonrpc":"2.0","id":1,"result":{"sessionId":"s1"}}"#));
    let value = handle.await.unwrap().unwrap();
    assert_eq!(value["sessionId"], "s1");

    let _ = child.kill().await;
}

#[tokio::test]
async fn request_resolves_with_agent_error() {
    let (peer, mut child) = sink_peer().await;

    let requester = Arc::clone(&peer);
    let handle =
        tokio::spawn(async move { requester.request("session/prompt", json!({})).await });
    tokio::task::yield_now().await;

    peer.resolve(incoming(
        r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"busy"}}"#,
    ));
    match handle.await.unwrap() {
        Err(AcpError::Agent(msg)) => assert_eq!(msg, "busy"),
        other => panic!("unexpected: {:?}", other),
    }

    let _ = child.kill().await;
}

#[tokio::test]
async fn close_fails_all_inflight_requests() {
    let (peer, mut child) = sink_peer().await;

    let requester = Arc::clone(&peer);
    let handle = tokio::spawn(async move { requester.request("initialize", json!({})).await });
    tokio::task::yield_now().await;

    peer.close();
    assert!(matches!(handle.await.unwrap(), Err(AcpError::Closed)));

    let _ = child.kill().await;
}

#[tokio::test]
async fn resolve_ignores_unknown_ids() {
    let (peer, mut child) = sink_peer().await;
    // Should neither panic nor hang.
    peer.resolve(incoming(r#"{"jsonrpc":"2.0","id":99,"result":null}"#));
    let _ = child.kill().await;
}
