// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Creation, lazy initialization, and mode policy.

use crate::acp::FakeCall;
use crate::manager::test_support::*;
use crate::manager::{CreateAgentParams, ManagerError};
use crate::storage::AgentStore;
use paseo_core::{AgentStatus, ProviderOptions, SessionMode, SessionModeState};

#[tokio::test]
async fn create_agent_rejects_inaccessible_cwd() {
    let t = test_manager();
    let err = t
        .manager
        .create_agent(CreateAgentParams {
            provider: ProviderOptions::Codex,
            cwd: "/definitely/not/a/real/dir".into(),
            initial_prompt: None,
            initial_mode: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ManagerError::CwdInaccessible(_)));

    let err = t
        .manager
        .create_agent(CreateAgentParams {
            provider: ProviderOptions::Codex,
            cwd: "relative/path".into(),
            initial_prompt: None,
            initial_mode: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ManagerError::Validation(_)));
}

#[tokio::test]
async fn create_agent_persists_before_returning() {
    let t = test_manager();
    let id = t.create_default_agent().await;
    t.manager.inner.store.flush().await;

    let (_store, records) =
        AgentStore::open(&t.dir.path().join("agents.jsonl")).expect("reopen");
    assert!(records.iter().any(|r| r.id == id));

    // No adapter side effects on create.
    assert_eq!(t.adapter.spawn_count(), 0);
    assert_eq!(t.manager.get_agent(&id).unwrap().status, AgentStatus::Uninitialized);
}

#[tokio::test]
async fn fetch_timeline_initializes_once_and_returns_history() {
    let t = test_manager();
    let id = t.create_default_agent().await;

    let (info, updates) = t.manager.fetch_agent_timeline(&id).await.unwrap();
    assert_eq!(info.status, AgentStatus::Ready);
    // initializing + ready status entries are already recorded
    assert!(updates.len() >= 2);
    assert_eq!(t.adapter.spawn_count(), 1);

    // Re-fetch: no second spawn.
    let _ = t.manager.fetch_agent_timeline(&id).await.unwrap();
    assert_eq!(t.adapter.spawn_count(), 1);
}

#[tokio::test]
async fn concurrent_initialization_spawns_exactly_once() {
    let t = test_manager();
    let id = t.create_default_agent().await;

    let m1 = t.manager.clone();
    let m2 = t.manager.clone();
    let (a, b) = tokio::join!(m1.fetch_agent_timeline(&id), m2.fetch_agent_timeline(&id));
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(t.adapter.spawn_count(), 1);
    assert_eq!(a.unwrap().0.status, AgentStatus::Ready);
}

#[tokio::test]
async fn init_failure_marks_agent_failed_and_further_ops_error() {
    let t = test_manager();
    let id = t.create_default_agent().await;
    t.adapter.fail_next_spawn();

    let err = t.manager.fetch_agent_timeline(&id).await.unwrap_err();
    assert!(matches!(err, ManagerError::Adapter(_)));
    assert_eq!(t.manager.get_agent(&id).unwrap().status, AgentStatus::Failed);

    let err = t
        .manager
        .send_prompt(&id, "hello".to_string().into_prompt(), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ManagerError::Precondition(AgentStatus::Failed)));
}

#[tokio::test]
async fn silent_adapter_falls_back_to_static_provider_modes() {
    let t = test_manager();
    let id = t.create_default_agent().await;

    let (info, _) = t.manager.fetch_agent_timeline(&id).await.unwrap();
    assert_eq!(info.mode.current_mode_id.as_deref(), Some("default"));
    assert!(info.mode.available_modes.iter().any(|m| m.id == "bypassPermissions"));
}

#[tokio::test]
async fn advertised_modes_win_over_static_ones() {
    let t = test_manager();
    t.adapter.advertise_modes(SessionModeState {
        current_mode_id: Some("turbo".to_string()),
        available_modes: vec![SessionMode::new("turbo", "Turbo")],
    });
    let id = t.create_default_agent().await;

    let (info, _) = t.manager.fetch_agent_timeline(&id).await.unwrap();
    assert_eq!(info.mode.current_mode_id.as_deref(), Some("turbo"));
    assert_eq!(info.mode.available_modes.len(), 1);
}

#[tokio::test]
async fn unknown_initial_mode_remaps_to_provider_default() {
    let t = test_manager();
    let id = t
        .manager
        .create_agent(CreateAgentParams {
            provider: ProviderOptions::Claude { session_id: None },
            cwd: t.cwd(),
            initial_prompt: None,
            initial_mode: Some("warp9".to_string()),
        })
        .await
        .unwrap();

    let (info, _) = t.manager.fetch_agent_timeline(&id).await.unwrap();
    assert_eq!(info.mode.current_mode_id.as_deref(), Some("default"));
    // The remap never reached the adapter as "warp9".
    assert!(!t.adapter.calls().contains(&FakeCall::SetMode("warp9".to_string())));
}

#[tokio::test]
async fn valid_initial_mode_is_applied_after_init() {
    let t = test_manager();
    let id = t
        .manager
        .create_agent(CreateAgentParams {
            provider: ProviderOptions::Claude { session_id: None },
            cwd: t.cwd(),
            initial_prompt: None,
            initial_mode: Some("plan".to_string()),
        })
        .await
        .unwrap();

    let (info, _) = t.manager.fetch_agent_timeline(&id).await.unwrap();
    assert_eq!(info.mode.current_mode_id.as_deref(), Some("plan"));
    assert!(t.adapter.calls().contains(&FakeCall::SetMode("plan".to_string())));
}

#[tokio::test]
async fn persisted_session_is_loaded_not_recreated() {
    let t = test_manager();
    let id = t.create_default_agent().await;

    // First init opens a fresh session and persists its id.
    let _ = t.manager.fetch_agent_timeline(&id).await.unwrap();
    t.manager.inner.store.flush().await;
    let (_s, records) = AgentStore::open(&t.dir.path().join("agents.jsonl")).unwrap();
    let persisted = records
        .iter()
        .find(|r| r.id == id)
        .and_then(|r| r.persisted_session_id.clone())
        .expect("session id persisted");

    // A second manager over the same store loads the session by id.
    let adapter2 = crate::acp::FakeAcpAdapter::new();
    let (store2, records2) =
        AgentStore::open(&t.dir.path().join("agents.jsonl")).unwrap();
    let manager2 = crate::manager::AgentManager::new(
        std::sync::Arc::new(adapter2.clone()),
        store2,
        records2,
    );
    let _ = manager2.fetch_agent_timeline(&id).await.unwrap();
    assert!(adapter2.calls().contains(&FakeCall::LoadSession(persisted)));
}

// Small helper so tests read naturally.
trait IntoPrompt {
    fn into_prompt(self) -> paseo_core::PromptContent;
}

impl IntoPrompt for String {
    fn into_prompt(self) -> paseo_core::PromptContent {
        paseo_core::PromptContent::Text(self)
    }
}
