// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn chunk_ids_are_stable_within_a_segment() {
    let mut tracker = TurnTracker::new();
    let a = tracker.chunk_id();
    let b = tracker.chunk_id();
    let c = tracker.chunk_id();
    assert_eq!(a, b);
    assert_eq!(b, c);
    assert!(a.starts_with("msg-"));
}

#[test]
fn boundary_mints_a_fresh_id() {
    // Three chunks, a tool_call boundary, two more chunks: exactly two
    // distinct message ids across the five chunks.
    let mut tracker = TurnTracker::new();
    let first = [tracker.chunk_id(), tracker.chunk_id(), tracker.chunk_id()];
    tracker.boundary();
    let second = [tracker.chunk_id(), tracker.chunk_id()];

    assert!(first.iter().all(|id| *id == first[0]));
    assert!(second.iter().all(|id| *id == second[0]));
    assert_ne!(first[0], second[0]);
}

#[test]
fn consecutive_boundaries_are_harmless() {
    let mut tracker = TurnTracker::new();
    tracker.boundary();
    tracker.boundary();
    let id = tracker.chunk_id();
    assert!(!id.is_empty());
}

#[test]
fn stop_reason_settles_status() {
    assert_eq!(StopReason::EndTurn.settled_status(), AgentStatus::Completed);
    assert_eq!(StopReason::Refusal.settled_status(), AgentStatus::Completed);
    assert_eq!(StopReason::Cancelled.settled_status(), AgentStatus::Ready);
    assert_eq!(StopReason::Other.settled_status(), AgentStatus::Completed);
}

#[test]
fn terminal_statuses() {
    assert!(AgentStatus::Failed.is_terminal());
    assert!(AgentStatus::Killed.is_terminal());
    assert!(!AgentStatus::Completed.is_terminal());
    assert!(!AgentStatus::Processing.is_terminal());
}

#[test]
fn prompt_content_text_becomes_one_block() {
    let content = PromptContent::Text("hello".to_string());
    assert_eq!(
        content.into_blocks(),
        vec![ContentBlock::Text { text: "hello".to_string() }]
    );
}

#[test]
fn prompt_content_empty_detection() {
    assert!(PromptContent::Text("   ".to_string()).is_empty());
    assert!(PromptContent::Blocks(vec![]).is_empty());
    assert!(!PromptContent::Text("x".to_string()).is_empty());
}

#[test]
fn timeline_entry_serde_uses_snake_case_tags() {
    let entry = TimelineEntry::AgentMessageChunk {
        message_id: "msg-1".to_string(),
        content: vec![ContentBlock::Text { text: "hi".to_string() }],
    };
    let json = serde_json::to_value(&entry).unwrap();
    assert_eq!(json["type"], "agent_message_chunk");
    assert_eq!(json["message_id"], "msg-1");

    let back: TimelineEntry = serde_json::from_value(json).unwrap();
    assert_eq!(back, entry);
}

#[test]
fn permission_resolved_flattens_outcome() {
    let entry = TimelineEntry::PermissionResolved {
        request_id: "perm-1".to_string(),
        outcome: PermissionOutcome::Selected { option_id: "allow".to_string() },
    };
    let json = serde_json::to_value(&entry).unwrap();
    assert_eq!(json["type"], "permission_resolved");
    assert_eq!(json["outcome"], "selected");
    assert_eq!(json["option_id"], "allow");

    let cancelled = TimelineEntry::PermissionResolved {
        request_id: "perm-2".to_string(),
        outcome: PermissionOutcome::Cancelled,
    };
    let json = serde_json::to_value(&cancelled).unwrap();
    assert_eq!(json["outcome"], "cancelled");
}

#[test]
fn agent_update_flattens_entry() {
    let update = AgentUpdate {
        seq: 4,
        at_ms: 99,
        entry: TimelineEntry::StatusChanged {
            status: AgentStatus::Ready,
            stop_reason: None,
            error: None,
        },
    };
    let json = serde_json::to_value(&update).unwrap();
    assert_eq!(json["seq"], 4);
    assert_eq!(json["type"], "status_changed");
    assert_eq!(json["status"], "ready");
}
