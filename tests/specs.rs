// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level end-to-end specs: a real gateway on an ephemeral port,
//! driven through the host runtime's production WebSocket client, with the
//! scripted ACP adapter standing in for the assistant child process.

use paseo_daemon::acp::{FakeAcpAdapter, FakeTurn};
use paseo_daemon::gateway::{Gateway, GatewayCtx};
use paseo_daemon::manager::AgentManager;
use paseo_daemon::storage::AgentStore;
use paseo_daemon::term::TerminalMux;
use paseo_host::{
    HostClient, HostClientBuilder, HostConnection, WsClientBuilder,
};
use paseo_wire::{Event, Request, Response};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Harness {
    adapter: FakeAcpAdapter,
    manager: AgentManager,
    addr: std::net::SocketAddr,
    shutdown: CancellationToken,
    _dir: tempfile::TempDir,
}

async fn start_daemon() -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let (store, records) = AgentStore::open(&dir.path().join("agents.jsonl")).expect("store");
    let adapter = FakeAcpAdapter::new();
    let manager = AgentManager::new(Arc::new(adapter.clone()), store, records);
    let term = TerminalMux::new();
    let shutdown = CancellationToken::new();

    let ctx = Arc::new(GatewayCtx {
        manager: manager.clone(),
        term,
        server_id: "srv_spec".to_string(),
        auth_token: None,
        shutdown: shutdown.clone(),
    });
    let gateway = Gateway::bind("127.0.0.1:0", ctx).await.expect("bind");
    let addr = gateway.local_addr().expect("addr");
    tokio::spawn(gateway.run());

    Harness { adapter, manager, addr, shutdown, _dir: dir }
}

async fn connect_client(harness: &Harness) -> Arc<dyn HostClient> {
    let builder = WsClientBuilder { client_id: "spec-client".to_string(), token: None };
    let candidate = HostConnection::direct(harness.addr.to_string());
    let client = builder.build("srv_spec", &candidate, 1).await.expect("build client");
    client.connect().await.expect("connect");
    client
}

#[tokio::test]
async fn full_prompt_turn_over_the_wire() {
    let harness = start_daemon().await;
    let client = connect_client(&harness).await;

    // Create an agent rooted in a real directory.
    let cwd = harness._dir.path().to_path_buf();
    let created = client
        .request(Request::CreateAgent {
            provider: paseo_core::ProviderOptions::Claude { session_id: None },
            cwd,
            initial_prompt: None,
            initial_mode: None,
        })
        .await
        .expect("create_agent");
    let Response::AgentCreated { agent_id } = created else {
        panic!("unexpected: {:?}", created);
    };

    // Subscribe to the timeline, then prompt.
    let mut events = client.events();
    let fetched = client
        .request(Request::FetchAgentTimeline {
            agent_id,
            subscription_id: Some("spec-timeline".to_string()),
        })
        .await
        .expect("fetch timeline");
    assert!(matches!(fetched, Response::AgentTimeline { .. }));

    harness.adapter.push_turn(FakeTurn::text("over the wire"));
    let sent = client
        .request(Request::SendPrompt {
            agent_id,
            prompt: paseo_core::PromptContent::Text("run the suite".to_string()),
            session_mode: None,
            message_id: Some("spec-msg-1".to_string()),
        })
        .await
        .expect("send_prompt");
    assert_eq!(sent, Response::Ok);

    // The streamed chunk and the settled status both arrive as events.
    let mut saw_chunk = false;
    let mut saw_completed = false;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !(saw_chunk && saw_completed) {
        assert!(tokio::time::Instant::now() < deadline, "events missing");
        let Ok(Ok((subscription_id, event))) =
            tokio::time::timeout(Duration::from_secs(1), events.recv()).await
        else {
            continue;
        };
        assert_eq!(subscription_id, "spec-timeline");
        if let Event::AgentUpdate { update, .. } = event {
            match update.entry {
                paseo_core::TimelineEntry::AgentMessageChunk { .. } => saw_chunk = true,
                paseo_core::TimelineEntry::StatusChanged {
                    status: paseo_core::AgentStatus::Completed,
                    ..
                } => saw_completed = true,
                _ => {}
            }
        }
    }

    // wait_for_finish over the wire agrees.
    let finished = client
        .request(Request::WaitForFinish { agent_id, timeout_ms: Some(2_000) })
        .await
        .expect("wait_for_finish");
    match finished {
        Response::Finished { status, stop_reason } => {
            assert_eq!(status, paseo_core::AgentStatus::Completed);
            assert_eq!(stop_reason, Some(paseo_core::StopReason::EndTurn));
        }
        other => panic!("unexpected: {:?}", other),
    }

    harness.shutdown.cancel();
}

#[tokio::test]
async fn terminal_stream_over_the_wire() {
    let harness = start_daemon().await;
    let client = connect_client(&harness).await;
    let cwd = harness._dir.path().to_path_buf();

    let created = client
        .request(Request::CreateTerminal { cwd: cwd.clone() })
        .await
        .expect("create terminal");
    let Response::TerminalCreated { terminal } = created else {
        panic!("unexpected: {:?}", created);
    };

    let mut events = client.events();
    let attached = client
        .request(Request::AttachTerminalStream {
            terminal_id: terminal.id,
            subscription_id: "spec-term".to_string(),
        })
        .await
        .expect("attach");
    let Response::StreamAttached { stream_id, .. } = attached else {
        panic!("unexpected: {:?}", attached);
    };

    client
        .request(Request::SendTerminalStreamInput {
            stream_id,
            data: paseo_wire::encode_bytes(b"echo wire-$((6*7))\n"),
        })
        .await
        .expect("input");

    let mut collected = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        assert!(
            tokio::time::Instant::now() < deadline,
            "no echo, saw: {:?}",
            String::from_utf8_lossy(&collected)
        );
        let Ok(Ok((_, event))) =
            tokio::time::timeout(Duration::from_secs(1), events.recv()).await
        else {
            continue;
        };
        if let Event::TerminalStreamData { data, .. } = event {
            collected.extend(paseo_wire::decode_bytes(&data).expect("decode"));
            if String::from_utf8_lossy(&collected).contains("wire-42") {
                break;
            }
        }
    }

    let killed = client
        .request(Request::KillTerminal { terminal_id: terminal.id })
        .await
        .expect("kill");
    assert_eq!(killed, Response::Ok);

    harness.shutdown.cancel();
}

#[tokio::test]
async fn permissions_resolve_over_the_wire() {
    let harness = start_daemon().await;
    let client = connect_client(&harness).await;
    let cwd = harness._dir.path().to_path_buf();

    let Response::AgentCreated { agent_id } = client
        .request(Request::CreateAgent {
            provider: paseo_core::ProviderOptions::Claude { session_id: None },
            cwd,
            initial_prompt: None,
            initial_mode: None,
        })
        .await
        .expect("create")
    else {
        panic!("create failed");
    };

    let mut events = client.events();
    client
        .request(Request::FetchAgentTimeline {
            agent_id,
            subscription_id: Some("spec-perm".to_string()),
        })
        .await
        .expect("fetch");

    harness.adapter.push_turn(FakeTurn {
        ask_permission: Some((
            paseo_core::ToolCall {
                tool_call_id: "tc-wire".to_string(),
                title: "Apply patch".to_string(),
                kind: Some("edit".to_string()),
                status: paseo_core::ToolCallStatus::Pending,
                raw_input: None,
            },
            vec![paseo_core::PermissionOption {
                kind: paseo_core::PermissionOptionKind::AllowOnce,
                option_id: "yes".to_string(),
                name: "Allow".to_string(),
            }],
        )),
        ..FakeTurn::default()
    });
    client
        .request(Request::SendPrompt {
            agent_id,
            prompt: paseo_core::PromptContent::Text("patch it".to_string()),
            session_mode: None,
            message_id: None,
        })
        .await
        .expect("prompt");

    // Wait for the permission_request event, answer it, then expect the
    // matching resolution with the same option id.
    let request_id = loop {
        let (_, event) = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event wait")
            .expect("event stream");
        if let Event::PermissionRequest { request_id, options, .. } = event {
            assert_eq!(options.len(), 1);
            break request_id;
        }
    };

    let answered = client
        .request(Request::RespondToPermission {
            agent_id,
            request_id: request_id.clone(),
            option_id: "yes".to_string(),
        })
        .await
        .expect("respond");
    assert_eq!(answered, Response::Ok);

    loop {
        let (_, event) = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("resolution wait")
            .expect("event stream");
        if let Event::PermissionResolved { request_id: resolved, outcome, .. } = event {
            assert_eq!(resolved, request_id);
            assert_eq!(
                outcome,
                paseo_core::PermissionOutcome::Selected { option_id: "yes".to_string() }
            );
            break;
        }
    }

    harness.manager.shutdown().await;
    harness.shutdown.cancel();
}
