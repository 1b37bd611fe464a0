// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: configuration, startup, shutdown.

mod identity;
pub use identity::{Identity, IdentityError};

use crate::acp::ProcessAcpAdapter;
use crate::gateway::{Gateway, GatewayCtx};
use crate::manager::AgentManager;
use crate::storage::{AgentStore, StorageError};
use crate::term::TerminalMux;
use crate::env;
use fs2::FileExt;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("cannot resolve a home directory (set PASEO_HOME)")]
    NoHomeDir,

    #[error("another daemon already holds {}", .0.display())]
    AlreadyRunning(PathBuf),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Daemon configuration, resolved from env + flags.
#[derive(Debug, Clone)]
pub struct Config {
    /// Persistence root (e.g. ~/.paseo)
    pub home: PathBuf,
    /// WebSocket bind address
    pub listen: String,
    /// Path to the agent record log
    pub agents_path: PathBuf,
    /// Path to the identity file
    pub identity_path: PathBuf,
    /// Path to the lock/PID file
    pub lock_path: PathBuf,
    /// Path to the daemon log file
    pub log_path: PathBuf,
}

impl Config {
    /// Resolve from the environment; `listen` falls back to `PASEO_LISTEN`.
    pub fn load(listen_override: Option<String>) -> Result<Self, LifecycleError> {
        let home = env::paseo_home()?;
        Ok(Self {
            listen: listen_override.unwrap_or_else(env::listen_addr),
            agents_path: home.join("agents.jsonl"),
            identity_path: home.join("identity.json"),
            lock_path: home.join("daemon.pid"),
            log_path: home.join("daemon.log"),
            home,
        })
    }
}

/// A started daemon: listener plus the components it serves.
pub struct Daemon {
    pub config: Config,
    pub identity: Identity,
    pub manager: AgentManager,
    pub term: TerminalMux,
    pub gateway: Gateway,
    pub shutdown: CancellationToken,
    // NOTE(lifetime): held to maintain the exclusive lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
}

/// Bring the daemon up: lock, identity, store replay, listener bind.
pub async fn startup(config: Config) -> Result<Daemon, LifecycleError> {
    std::fs::create_dir_all(&config.home)
        .map_err(|e| LifecycleError::Io { path: config.home.clone(), source: e })?;

    let lock_file = File::create(&config.lock_path)
        .map_err(|e| LifecycleError::Io { path: config.lock_path.clone(), source: e })?;
    if lock_file.try_lock_exclusive().is_err() {
        return Err(LifecycleError::AlreadyRunning(config.lock_path.clone()));
    }
    use std::io::Write as _;
    let mut lock_file = lock_file;
    let _ = writeln!(lock_file, "{}", std::process::id());

    let identity = Identity::load_or_create(&config.identity_path)?;
    let (store, records) = AgentStore::open(&config.agents_path)?;
    info!(agents = records.len(), server_id = %identity.server_id, "state loaded");

    let shutdown = CancellationToken::new();
    let manager = AgentManager::new(Arc::new(ProcessAcpAdapter::new()), store, records);
    let term = TerminalMux::new();

    let ctx = Arc::new(GatewayCtx {
        manager: manager.clone(),
        term: term.clone(),
        server_id: identity.server_id.clone(),
        auth_token: env::auth_token(),
        shutdown: shutdown.clone(),
    });
    let gateway = Gateway::bind(&config.listen, ctx)
        .await
        .map_err(|e| LifecycleError::Io { path: PathBuf::from(&config.listen), source: e })?;

    Ok(Daemon { config, identity, manager, term, gateway, shutdown, lock_file })
}

impl Daemon {
    /// Pairing URL advertising this daemon's reachability, or `None` when
    /// relay announcement is disabled.
    ///
    /// With `PASEO_PRIMARY_LAN_IP` set, a v1 offer carries direct LAN
    /// endpoints alongside the relay; otherwise a v2 offer carries the
    /// relay alone.
    pub fn pairing_url(&self, relay_enabled: bool) -> Option<String> {
        if !relay_enabled {
            return None;
        }
        let port = self.config.listen.rsplit(':').next().unwrap_or("6767");
        let endpoints: Vec<String> = env::primary_lan_ip()
            .map(|ip| vec![format!("{}:{}", ip, port)])
            .unwrap_or_default();
        let offer = paseo_wire::PairingOffer {
            v: if endpoints.is_empty() { 2 } else { 1 },
            server_id: self.identity.server_id.clone(),
            daemon_public_key_b64: self.identity.public_key_b64.clone(),
            relay: paseo_wire::RelayHint { endpoint: env::relay_endpoint() },
            session_id: (!endpoints.is_empty())
                .then(|| format!("pair-{}", nanoid::nanoid!(12))),
            endpoints,
        };
        offer.to_url(&env::app_host()).ok()
    }

    /// Serve until the shutdown token fires, then drain and stop.
    pub async fn run(self) {
        let gateway = self.gateway;
        let shutdown = self.shutdown.clone();
        let accept = tokio::spawn(gateway.run());

        shutdown.cancelled().await;
        info!("shutdown requested, draining");
        self.manager.shutdown().await;
        let _ = accept.await;
        info!("daemon stopped");
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
