// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted prober and client doubles shared by controller and store tests.

use crate::client::{ClientStatus, HostClient, HostClientBuilder, HostError};
use crate::probe::{ProbeResult, Prober};
use crate::profile::HostConnection;
use async_trait::async_trait;
use parking_lot::Mutex;
use paseo_wire::{Event, Request, Response};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

pub(crate) fn up(latency_ms: u64) -> ProbeResult {
    ProbeResult::Available { latency_ms }
}

/// One scripted probe outcome, optionally delayed.
#[derive(Clone, Copy)]
pub(crate) struct Scripted {
    pub delay: Duration,
    pub result: ProbeResult,
}

#[derive(Default)]
pub(crate) struct ScriptedProber {
    queues: Mutex<HashMap<String, VecDeque<Scripted>>>,
    /// Reused when a candidate's queue runs dry.
    last: Mutex<HashMap<String, ProbeResult>>,
}

impl ScriptedProber {
    pub fn push(&self, candidate_id: &str, result: ProbeResult) {
        self.push_delayed(candidate_id, Duration::ZERO, result);
    }

    pub fn push_delayed(&self, candidate_id: &str, delay: Duration, result: ProbeResult) {
        self.queues
            .lock()
            .entry(candidate_id.to_string())
            .or_default()
            .push_back(Scripted { delay, result });
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, candidate: &HostConnection) -> ProbeResult {
        let scripted =
            self.queues.lock().get_mut(&candidate.id).and_then(VecDeque::pop_front);
        match scripted {
            Some(Scripted { delay, result }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                self.last.lock().insert(candidate.id.clone(), result);
                result
            }
            None => self
                .last
                .lock()
                .get(&candidate.id)
                .copied()
                .unwrap_or(ProbeResult::Unavailable),
        }
    }
}

#[derive(Clone, Copy)]
pub(crate) enum ConnectBehavior {
    Succeed,
    Fail,
    FailAfter(Duration),
}

pub(crate) struct FakeClient {
    pub candidate_id: String,
    pub generation: u64,
    behavior: ConnectBehavior,
    pub status_tx: watch::Sender<ClientStatus>,
    events_tx: broadcast::Sender<(String, Event)>,
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    /// Scripted reply for directory fetches; `None` means empty success.
    pub directory: Mutex<Option<Result<Response, String>>>,
    pub directory_fetches: AtomicUsize,
}

#[async_trait]
impl HostClient for FakeClient {
    async fn connect(&self) -> Result<(), HostError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let _ = self.status_tx.send(ClientStatus::Connecting);
        match self.behavior {
            ConnectBehavior::Succeed => {
                let _ = self.status_tx.send(ClientStatus::Online);
                Ok(())
            }
            ConnectBehavior::Fail => Err(HostError::Connect("scripted refusal".to_string())),
            ConnectBehavior::FailAfter(delay) => {
                tokio::time::sleep(delay).await;
                Err(HostError::Connect("scripted slow refusal".to_string()))
            }
        }
    }

    fn status(&self) -> watch::Receiver<ClientStatus> {
        self.status_tx.subscribe()
    }

    async fn request(&self, request: Request) -> Result<Response, HostError> {
        match request {
            Request::FetchAgents { .. } => {
                self.directory_fetches.fetch_add(1, Ordering::SeqCst);
                match self.directory.lock().clone() {
                    Some(Ok(response)) => Ok(response),
                    Some(Err(message)) => Err(HostError::Rejected(message)),
                    None => Ok(Response::Agents { agents: vec![] }),
                }
            }
            _ => Ok(Response::Ok),
        }
    }

    fn events(&self) -> broadcast::Receiver<(String, Event)> {
        self.events_tx.subscribe()
    }

    async fn close(&self, _reason: &str) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        let _ = self
            .status_tx
            .send(ClientStatus::Closed { reason: "client_closed".to_string() });
    }
}

#[derive(Default)]
pub(crate) struct FakeBuilder {
    behaviors: Mutex<HashMap<String, ConnectBehavior>>,
    directory_scripts: Mutex<HashMap<String, Result<Response, String>>>,
    pub built: Mutex<Vec<Arc<FakeClient>>>,
}

impl FakeBuilder {
    pub fn behave(&self, candidate_id: &str, behavior: ConnectBehavior) {
        self.behaviors.lock().insert(candidate_id.to_string(), behavior);
    }

    /// Preload the directory reply clients for this candidate start with.
    pub fn script_directory(&self, candidate_id: &str, reply: Result<Response, String>) {
        self.directory_scripts.lock().insert(candidate_id.to_string(), reply);
    }

    pub fn built_count(&self) -> usize {
        self.built.lock().len()
    }

    pub fn client_for(&self, candidate_id: &str) -> Option<Arc<FakeClient>> {
        self.built
            .lock()
            .iter()
            .rev()
            .find(|c| c.candidate_id == candidate_id)
            .cloned()
    }
}

#[async_trait]
impl HostClientBuilder for FakeBuilder {
    async fn build(
        &self,
        _server_id: &str,
        candidate: &HostConnection,
        generation: u64,
    ) -> Result<Arc<dyn HostClient>, HostError> {
        let behavior = self
            .behaviors
            .lock()
            .get(&candidate.id)
            .copied()
            .unwrap_or(ConnectBehavior::Succeed);
        let directory = self.directory_scripts.lock().get(&candidate.id).cloned();
        let client = Arc::new(FakeClient {
            candidate_id: candidate.id.clone(),
            generation,
            behavior,
            status_tx: watch::channel(ClientStatus::Idle).0,
            events_tx: broadcast::channel(64).0,
            connects: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            directory: Mutex::new(directory),
            directory_fetches: AtomicUsize::new(0),
        });
        self.built.lock().push(Arc::clone(&client));
        Ok(client)
    }
}
