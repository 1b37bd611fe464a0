// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for manager tests.

use super::{AgentManager, CreateAgentParams};
use crate::acp::FakeAcpAdapter;
use crate::storage::AgentStore;
use paseo_core::{AgentId, AgentUpdate, ProviderOptions};
use std::sync::Arc;

pub(crate) struct TestManager {
    pub manager: AgentManager,
    pub adapter: FakeAcpAdapter,
    pub dir: tempfile::TempDir,
}

impl TestManager {
    pub fn cwd(&self) -> std::path::PathBuf {
        self.dir.path().to_path_buf()
    }

    pub async fn create_default_agent(&self) -> AgentId {
        self.manager
            .create_agent(CreateAgentParams {
                provider: ProviderOptions::Claude { session_id: None },
                cwd: self.cwd(),
                initial_prompt: None,
                initial_mode: None,
            })
            .await
            .expect("create agent")
    }
}

pub(crate) fn test_manager() -> TestManager {
    let dir = tempfile::tempdir().expect("tempdir");
    let (store, records) = AgentStore::open(&dir.path().join("agents.jsonl")).expect("store");
    let adapter = FakeAcpAdapter::new();
    let manager = AgentManager::new(Arc::new(adapter.clone()), store, records);
    TestManager { manager, adapter, dir }
}

/// Collects every update a subscription sees, in order.
#[derive(Clone, Default)]
pub(crate) struct Collector {
    updates: Arc<parking_lot::Mutex<Vec<AgentUpdate>>>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> Arc<dyn Fn(AgentUpdate) + Send + Sync> {
        let updates = Arc::clone(&self.updates);
        Arc::new(move |u| updates.lock().push(u))
    }

    pub fn updates(&self) -> Vec<AgentUpdate> {
        self.updates.lock().clone()
    }
}
