// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prompt turns: streaming, coalescing, cancellation, failure.

use crate::acp::{FakeCall, FakeTurn, SessionUpdate};
use crate::manager::test_support::*;
use crate::manager::ManagerError;
use paseo_core::{
    AgentStatus, ContentBlock, PromptContent, StopReason, TimelineEntry, ToolCall,
    ToolCallStatus,
};
use std::time::Duration;

fn text_prompt(text: &str) -> PromptContent {
    PromptContent::Text(text.to_string())
}

fn chunk(text: &str) -> SessionUpdate {
    SessionUpdate::AgentMessageChunk {
        content: vec![ContentBlock::Text { text: text.to_string() }],
    }
}

fn tool_call(id: &str) -> ToolCall {
    ToolCall {
        tool_call_id: id.to_string(),
        title: "run tests".to_string(),
        kind: Some("execute".to_string()),
        status: ToolCallStatus::Pending,
        raw_input: None,
    }
}

#[tokio::test]
async fn empty_prompts_are_rejected() {
    let t = test_manager();
    let id = t.create_default_agent().await;
    let err = t.manager.send_prompt(&id, text_prompt("   "), None, None).await.unwrap_err();
    assert!(matches!(err, ManagerError::Validation(_)));
}

#[tokio::test]
async fn prompt_turn_streams_and_settles_completed() {
    let t = test_manager();
    let id = t.create_default_agent().await;

    let collector = Collector::new();
    t.manager.subscribe_updates(&id, collector.callback()).unwrap();

    t.adapter.push_turn(FakeTurn::text("hello back"));
    t.manager
        .send_prompt(&id, text_prompt("hello"), None, Some("client-msg-1".to_string()))
        .await
        .unwrap();

    let (status, stop) =
        t.manager.wait_for_finish(&id, Duration::from_secs(2)).await.unwrap();
    assert_eq!(status, AgentStatus::Completed);
    assert_eq!(stop, Some(StopReason::EndTurn));

    let updates = collector.updates();
    // The synthetic user chunk carries the caller's message id.
    let user = updates
        .iter()
        .find_map(|u| match &u.entry {
            TimelineEntry::UserMessageChunk { message_id, .. } => Some(message_id.clone()),
            _ => None,
        })
        .expect("user chunk recorded");
    assert_eq!(user, "client-msg-1");

    // Ordering: user chunk before processing status before agent chunk.
    let seqs: Vec<u64> = updates.iter().map(|u| u.seq).collect();
    let mut sorted = seqs.clone();
    sorted.sort_unstable();
    assert_eq!(seqs, sorted, "subscriber saw updates out of order");
}

#[tokio::test]
async fn chunks_share_message_id_until_tool_call_boundary() {
    let t = test_manager();
    let id = t.create_default_agent().await;

    t.adapter.push_turn(FakeTurn {
        updates: vec![
            chunk("a"),
            chunk("b"),
            chunk("c"),
            SessionUpdate::ToolCall(tool_call("tc-1")),
            chunk("d"),
            chunk("e"),
        ],
        ..FakeTurn::default()
    });
    t.manager.send_prompt(&id, text_prompt("go"), None, None).await.unwrap();
    t.manager.wait_for_finish(&id, Duration::from_secs(2)).await.unwrap();

    let (_, updates) = t.manager.fetch_agent_timeline(&id).await.unwrap();
    let ids: Vec<String> = updates
        .iter()
        .filter_map(|u| match &u.entry {
            TimelineEntry::AgentMessageChunk { message_id, .. } => Some(message_id.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(ids.len(), 5);
    assert_eq!(ids[0], ids[1]);
    assert_eq!(ids[1], ids[2]);
    assert_eq!(ids[3], ids[4]);
    assert_ne!(ids[0], ids[3], "tool call must start a fresh message id");

    let distinct: std::collections::BTreeSet<_> = ids.iter().collect();
    assert_eq!(distinct.len(), 2);
}

#[tokio::test]
async fn new_prompt_mints_fresh_message_id_for_next_turn() {
    let t = test_manager();
    let id = t.create_default_agent().await;

    t.adapter.push_turn(FakeTurn::text("first"));
    t.manager.send_prompt(&id, text_prompt("one"), None, None).await.unwrap();
    t.manager.wait_for_finish(&id, Duration::from_secs(2)).await.unwrap();

    t.adapter.push_turn(FakeTurn::text("second"));
    t.manager.send_prompt(&id, text_prompt("two"), None, None).await.unwrap();
    t.manager.wait_for_finish(&id, Duration::from_secs(2)).await.unwrap();

    let (_, updates) = t.manager.fetch_agent_timeline(&id).await.unwrap();
    let ids: Vec<String> = updates
        .iter()
        .filter_map(|u| match &u.entry {
            TimelineEntry::AgentMessageChunk { message_id, .. } => Some(message_id.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
}

#[tokio::test]
async fn refusal_and_other_settle_completed_cancelled_settles_ready() {
    let t = test_manager();
    let id = t.create_default_agent().await;

    for (scripted, status, stop) in [
        (StopReason::Refusal, AgentStatus::Completed, StopReason::Refusal),
        (StopReason::Cancelled, AgentStatus::Ready, StopReason::Cancelled),
        (StopReason::Other, AgentStatus::Completed, StopReason::Other),
    ] {
        t.adapter.push_turn(FakeTurn { stop_reason: Some(scripted), ..FakeTurn::default() });
        t.manager.send_prompt(&id, text_prompt("go"), None, None).await.unwrap();
        let (got_status, got_stop) =
            t.manager.wait_for_finish(&id, Duration::from_secs(2)).await.unwrap();
        assert_eq!(got_status, status);
        assert_eq!(got_stop, Some(stop));
    }
}

#[tokio::test]
async fn adapter_error_fails_the_agent() {
    let t = test_manager();
    let id = t.create_default_agent().await;

    t.adapter.push_turn(FakeTurn {
        error: Some("model exploded".to_string()),
        ..FakeTurn::default()
    });
    t.manager.send_prompt(&id, text_prompt("go"), None, None).await.unwrap();
    let (status, _) = t.manager.wait_for_finish(&id, Duration::from_secs(2)).await.unwrap();
    assert_eq!(status, AgentStatus::Failed);

    let err = t.manager.send_prompt(&id, text_prompt("again"), None, None).await.unwrap_err();
    assert!(matches!(err, ManagerError::Precondition(AgentStatus::Failed)));
}

#[tokio::test]
async fn prompt_while_processing_cancels_then_starts_new_turn() {
    let t = test_manager();
    let id = t.create_default_agent().await;

    t.adapter.push_turn(FakeTurn::held());
    t.manager.send_prompt(&id, text_prompt("first"), None, None).await.unwrap();
    assert_eq!(t.manager.get_agent(&id).unwrap().status, AgentStatus::Processing);

    t.adapter.push_turn(FakeTurn::text("done"));
    t.manager.send_prompt(&id, text_prompt("second"), None, None).await.unwrap();

    let (status, stop) =
        t.manager.wait_for_finish(&id, Duration::from_secs(2)).await.unwrap();
    assert_eq!(status, AgentStatus::Completed);
    assert_eq!(stop, Some(StopReason::EndTurn));
    assert!(t.adapter.calls().contains(&FakeCall::Cancel));
    // One spawn for both turns: the runtime is reused.
    assert_eq!(t.adapter.spawn_count(), 1);
}

#[tokio::test]
async fn cancel_agent_settles_ready_and_is_noop_when_idle() {
    let t = test_manager();
    let id = t.create_default_agent().await;

    // No-op outside processing.
    t.manager.cancel_agent(&id).await.unwrap();
    assert_eq!(t.adapter.spawn_count(), 0);

    t.adapter.push_turn(FakeTurn::held());
    t.manager.send_prompt(&id, text_prompt("go"), None, None).await.unwrap();
    t.manager.cancel_agent(&id).await.unwrap();

    assert_eq!(t.manager.get_agent(&id).unwrap().status, AgentStatus::Ready);
}

#[tokio::test]
async fn wait_for_finish_times_out_on_held_turn() {
    let t = test_manager();
    let id = t.create_default_agent().await;

    t.adapter.push_turn(FakeTurn::held());
    t.manager.send_prompt(&id, text_prompt("go"), None, None).await.unwrap();

    let err =
        t.manager.wait_for_finish(&id, Duration::from_millis(50)).await.unwrap_err();
    assert!(matches!(err, ManagerError::Timeout));

    t.manager.cancel_agent(&id).await.unwrap();
}

#[tokio::test]
async fn timeline_retention_drops_the_oldest_entries() {
    let t = test_manager();
    let id = t.create_default_agent().await;

    let flood = (0..crate::manager::TIMELINE_RETENTION + 64)
        .map(|i| chunk(&format!("chunk {}", i)))
        .collect::<Vec<_>>();
    t.adapter.push_turn(FakeTurn { updates: flood, ..FakeTurn::default() });
    t.manager.send_prompt(&id, text_prompt("flood"), None, None).await.unwrap();
    t.manager.wait_for_finish(&id, Duration::from_secs(5)).await.unwrap();

    let (_, updates) = t.manager.fetch_agent_timeline(&id).await.unwrap();
    assert!(updates.len() <= crate::manager::TIMELINE_RETENTION);
    // The oldest entries fell off; sequence numbers keep counting.
    assert!(updates.first().map(|u| u.seq > 0).unwrap_or(false));
    let seqs: Vec<u64> = updates.iter().map(|u| u.seq).collect();
    let mut sorted = seqs.clone();
    sorted.sort_unstable();
    assert_eq!(seqs, sorted);
}

#[tokio::test]
async fn unexpected_process_exit_fails_a_ready_agent() {
    let t = test_manager();
    let id = t.create_default_agent().await;
    let _ = t.manager.fetch_agent_timeline(&id).await.unwrap();

    t.adapter.simulate_exit(Some(137)).await;
    // The pump applies the transition asynchronously.
    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            if t.manager.get_agent(&id).unwrap().status == AgentStatus::Failed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("agent should fail after child exit");
}
