// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kill, delete, shutdown, modes, titles, and the directory stream.

use crate::acp::{FakeCall, FakeTurn};
use crate::manager::test_support::*;
use crate::manager::{DirectoryChange, ManagerError};
use crate::storage::AgentStore;
use paseo_core::{AgentStatus, PromptContent};
use std::sync::Arc;
use std::time::Duration;

fn prompt() -> PromptContent {
    PromptContent::Text("work".to_string())
}

#[tokio::test]
async fn kill_terminates_child_and_keeps_persisted_record() {
    let t = test_manager();
    let id = t.create_default_agent().await;
    let _ = t.manager.fetch_agent_timeline(&id).await.unwrap();

    t.manager.kill_agent(&id).await.unwrap();
    assert!(t.adapter.calls().contains(&FakeCall::Terminate));

    // Killed, then gone from the in-memory set...
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(t.manager.get_agent(&id).is_err());

    // ...but the persisted record survives (only delete removes it).
    t.manager.inner.store.flush().await;
    let (_s, records) = AgentStore::open(&t.dir.path().join("agents.jsonl")).unwrap();
    assert!(records.iter().any(|r| r.id == id));
}

#[tokio::test]
async fn delete_removes_the_persisted_record_too() {
    let t = test_manager();
    let id = t.create_default_agent().await;

    t.manager.delete_agent(&id).await.unwrap();
    t.manager.inner.store.flush().await;

    let (_s, records) = AgentStore::open(&t.dir.path().join("agents.jsonl")).unwrap();
    assert!(!records.iter().any(|r| r.id == id));
}

#[tokio::test]
async fn prompt_after_kill_is_a_precondition_error() {
    let t = test_manager();
    let id = t.create_default_agent().await;
    t.manager.kill_agent(&id).await.unwrap();

    // Within the linger window the agent is still visible and killed.
    let err = t.manager.send_prompt(&id, prompt(), None, None).await.unwrap_err();
    assert!(matches!(
        err,
        ManagerError::Precondition(AgentStatus::Killed) | ManagerError::UnknownAgent(_)
    ));
}

#[tokio::test]
async fn set_session_mode_switches_and_validates() {
    let t = test_manager();
    let id = t.create_default_agent().await;
    let _ = t.manager.fetch_agent_timeline(&id).await.unwrap();

    t.manager.set_session_mode(&id, "acceptEdits").await.unwrap();
    assert!(t.adapter.calls().contains(&FakeCall::SetMode("acceptEdits".to_string())));
    assert_eq!(
        t.manager.get_agent(&id).unwrap().mode.current_mode_id.as_deref(),
        Some("acceptEdits")
    );

    let err = t.manager.set_session_mode(&id, "warp9").await.unwrap_err();
    assert!(matches!(err, ManagerError::Validation(_)));
}

#[tokio::test]
async fn set_session_mode_before_init_holds_pending_mode() {
    let t = test_manager();
    let id = t.create_default_agent().await;

    t.manager.set_session_mode(&id, "plan").await.unwrap();
    assert_eq!(t.adapter.spawn_count(), 0, "mode hold must not initialize");

    let (info, _) = t.manager.fetch_agent_timeline(&id).await.unwrap();
    assert_eq!(info.mode.current_mode_id.as_deref(), Some("plan"));
}

#[tokio::test]
async fn set_agent_title_persists_and_validates() {
    let t = test_manager();
    let id = t.create_default_agent().await;

    t.manager.set_agent_title(&id, "refactor worker".to_string()).unwrap();
    assert_eq!(t.manager.get_agent(&id).unwrap().title, "refactor worker");

    let err = t.manager.set_agent_title(&id, "  ".to_string()).unwrap_err();
    assert!(matches!(err, ManagerError::Validation(_)));

    t.manager.inner.store.flush().await;
    let (_s, records) = AgentStore::open(&t.dir.path().join("agents.jsonl")).unwrap();
    assert_eq!(records.iter().find(|r| r.id == id).unwrap().title, "refactor worker");
}

#[tokio::test]
async fn labels_upsert_and_remove_persistently() {
    let t = test_manager();
    let id = t.create_default_agent().await;

    t.manager.label_agent(&id, "team", Some("infra".to_string())).unwrap();
    t.manager.label_agent(&id, "tier", Some("gold".to_string())).unwrap();
    t.manager.label_agent(&id, "tier", None).unwrap();
    assert!(matches!(
        t.manager.label_agent(&id, "  ", Some("x".to_string())),
        Err(ManagerError::Validation(_))
    ));

    let info = t.manager.get_agent(&id).unwrap();
    assert_eq!(info.labels.get("team").map(String::as_str), Some("infra"));
    assert!(!info.labels.contains_key("tier"));

    t.manager.inner.store.flush().await;
    let (_s, records) = AgentStore::open(&t.dir.path().join("agents.jsonl")).unwrap();
    let persisted = records.iter().find(|r| r.id == id).unwrap();
    assert_eq!(persisted.labels.get("team").map(String::as_str), Some("infra"));
}

#[tokio::test]
async fn directory_stream_sees_upserts_and_removals() {
    let t = test_manager();
    let changes: Arc<parking_lot::Mutex<Vec<DirectoryChange>>> = Arc::default();
    let sink = Arc::clone(&changes);
    t.manager.subscribe_directory(Arc::new(move |c| sink.lock().push(c)));

    let id = t.create_default_agent().await;
    t.manager.delete_agent(&id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;

    let seen = changes.lock().clone();
    assert!(seen.iter().any(
        |c| matches!(c, DirectoryChange::Upserted(info) if info.id == id)
    ));
    assert!(seen.iter().any(|c| matches!(c, DirectoryChange::Removed(got) if *got == id)));
}

#[tokio::test]
async fn shutdown_waits_for_processing_then_terminates_children() {
    let t = test_manager();
    let id = t.create_default_agent().await;

    t.adapter.push_turn(FakeTurn::text("quick"));
    t.manager.send_prompt(&id, prompt(), None, None).await.unwrap();

    t.manager.shutdown().await;
    assert!(t.adapter.calls().contains(&FakeCall::Terminate));

    // State persisted on the way down.
    let (_s, records) = AgentStore::open(&t.dir.path().join("agents.jsonl")).unwrap();
    assert!(records.iter().any(|r| r.id == id));
}

#[tokio::test]
async fn unsubscribe_is_idempotent() {
    let t = test_manager();
    let id = t.create_default_agent().await;
    let collector = Collector::new();
    let sub = t.manager.subscribe_updates(&id, collector.callback()).unwrap();

    t.manager.unsubscribe_updates(&id, sub);
    t.manager.unsubscribe_updates(&id, sub);

    t.adapter.push_turn(FakeTurn::text("quiet"));
    t.manager.send_prompt(&id, prompt(), None, None).await.unwrap();
    t.manager.wait_for_finish(&id, Duration::from_secs(2)).await.unwrap();

    assert!(collector.updates().is_empty());
}
