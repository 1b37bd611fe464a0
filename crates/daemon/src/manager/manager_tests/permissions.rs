// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Permission arbitration: exactly-once resolution, cancellation paths.

use crate::acp::FakeTurn;
use crate::manager::test_support::*;
use crate::manager::ManagerError;
use paseo_core::{
    AgentStatus, PermissionOption, PermissionOptionKind, PermissionOutcome, PromptContent,
    TimelineEntry, ToolCall, ToolCallStatus,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn permission_turn() -> FakeTurn {
    FakeTurn {
        ask_permission: Some((
            ToolCall {
                tool_call_id: "tc-1".to_string(),
                title: "Write file".to_string(),
                kind: Some("edit".to_string()),
                status: ToolCallStatus::Pending,
                raw_input: None,
            },
            vec![
                PermissionOption {
                    kind: PermissionOptionKind::AllowOnce,
                    option_id: "allow".to_string(),
                    name: "Allow".to_string(),
                },
                PermissionOption {
                    kind: PermissionOptionKind::RejectOnce,
                    option_id: "reject".to_string(),
                    name: "Reject".to_string(),
                },
            ],
        )),
        ..FakeTurn::default()
    }
}

fn prompt() -> PromptContent {
    PromptContent::Text("do the thing".to_string())
}

#[tokio::test]
async fn permission_resolves_exactly_once_with_selected_option() {
    let t = test_manager();
    let id = t.create_default_agent().await;
    let collector = Collector::new();
    t.manager.subscribe_updates(&id, collector.callback()).unwrap();

    t.adapter.push_turn(permission_turn());
    t.manager.send_prompt(&id, prompt(), None, None).await.unwrap();

    let cancel = CancellationToken::new();
    let ask = t
        .manager
        .wait_for_permission_request(&id, &cancel)
        .await
        .unwrap()
        .expect("permission should arrive");
    assert_eq!(ask.options.len(), 2);

    t.manager.respond_to_permission(&id, &ask.request_id, "allow").await.unwrap();

    // Second resolution of the same request is rejected.
    let err = t
        .manager
        .respond_to_permission(&id, &ask.request_id, "allow")
        .await
        .unwrap_err();
    assert!(matches!(err, ManagerError::UnknownPermission(_)));

    t.manager.wait_for_finish(&id, Duration::from_secs(2)).await.unwrap();

    let resolved: Vec<_> = collector
        .updates()
        .into_iter()
        .filter_map(|u| match u.entry {
            TimelineEntry::PermissionResolved { request_id, outcome } => {
                Some((request_id, outcome))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        resolved,
        vec![(
            ask.request_id.clone(),
            PermissionOutcome::Selected { option_id: "allow".to_string() }
        )]
    );
}

#[tokio::test]
async fn unknown_option_is_rejected_without_resolving() {
    let t = test_manager();
    let id = t.create_default_agent().await;

    t.adapter.push_turn(permission_turn());
    t.manager.send_prompt(&id, prompt(), None, None).await.unwrap();

    let cancel = CancellationToken::new();
    let ask = t.manager.wait_for_permission_request(&id, &cancel).await.unwrap().unwrap();

    let err = t
        .manager
        .respond_to_permission(&id, &ask.request_id, "nope")
        .await
        .unwrap_err();
    assert!(matches!(err, ManagerError::Validation(_)));

    // Still pending: a proper response works afterwards.
    t.manager.respond_to_permission(&id, &ask.request_id, "reject").await.unwrap();
    t.manager.wait_for_finish(&id, Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn new_prompt_cancels_pending_permission_before_user_chunk() {
    let t = test_manager();
    let id = t.create_default_agent().await;
    let collector = Collector::new();
    t.manager.subscribe_updates(&id, collector.callback()).unwrap();

    t.adapter.push_turn(permission_turn());
    t.manager.send_prompt(&id, prompt(), None, None).await.unwrap();
    let cancel = CancellationToken::new();
    let ask = t.manager.wait_for_permission_request(&id, &cancel).await.unwrap().unwrap();

    t.adapter.push_turn(FakeTurn::text("fresh start"));
    t.manager
        .send_prompt(&id, prompt(), None, Some("second-prompt".to_string()))
        .await
        .unwrap();
    t.manager.wait_for_finish(&id, Duration::from_secs(2)).await.unwrap();

    let updates = collector.updates();
    let resolved_at = updates
        .iter()
        .position(|u| {
            matches!(&u.entry, TimelineEntry::PermissionResolved { request_id, outcome }
                if *request_id == ask.request_id && *outcome == PermissionOutcome::Cancelled)
        })
        .expect("cancelled resolution recorded");
    let second_chunk_at = updates
        .iter()
        .position(|u| {
            matches!(&u.entry, TimelineEntry::UserMessageChunk { message_id, .. }
                if message_id == "second-prompt")
        })
        .expect("second user chunk recorded");
    assert!(
        resolved_at < second_chunk_at,
        "permission_resolved must precede the new user_message_chunk"
    );
    assert!(t.manager.pending_permissions(&id).unwrap().is_empty());
}

#[tokio::test]
async fn kill_resolves_pending_permission_and_removes_agent() {
    let t = test_manager();
    let id = t.create_default_agent().await;
    let collector = Collector::new();
    t.manager.subscribe_updates(&id, collector.callback()).unwrap();

    t.adapter.push_turn(permission_turn());
    t.manager.send_prompt(&id, prompt(), None, None).await.unwrap();
    let cancel = CancellationToken::new();
    let ask = t.manager.wait_for_permission_request(&id, &cancel).await.unwrap().unwrap();

    t.manager.kill_agent(&id).await.unwrap();

    let updates = collector.updates();
    assert!(updates.iter().any(|u| {
        matches!(&u.entry, TimelineEntry::PermissionResolved { request_id, outcome }
            if *request_id == ask.request_id && *outcome == PermissionOutcome::Cancelled)
    }));
    assert!(updates.iter().any(|u| {
        matches!(&u.entry, TimelineEntry::StatusChanged { status: AgentStatus::Killed, .. })
    }));

    // The record leaves the in-memory set shortly after status emission.
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(matches!(
        t.manager.get_agent(&id),
        Err(ManagerError::UnknownAgent(_))
    ));
}

#[tokio::test]
async fn wait_for_permission_returns_none_when_turn_finishes_quietly() {
    let t = test_manager();
    let id = t.create_default_agent().await;

    t.adapter.push_turn(FakeTurn::text("no questions"));
    t.manager.send_prompt(&id, prompt(), None, None).await.unwrap();

    let cancel = CancellationToken::new();
    let got = t.manager.wait_for_permission_request(&id, &cancel).await.unwrap();
    assert!(got.is_none());
}

#[tokio::test]
async fn wait_for_permission_respects_external_cancel() {
    let t = test_manager();
    let id = t.create_default_agent().await;

    t.adapter.push_turn(FakeTurn::held());
    t.manager.send_prompt(&id, prompt(), None, None).await.unwrap();

    let cancel = CancellationToken::new();
    let waiter = {
        let manager = t.manager.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { manager.wait_for_permission_request(&id, &cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();
    let got = waiter.await.unwrap().unwrap();
    assert!(got.is_none());

    t.manager.cancel_agent(&id).await.unwrap();
}
