// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session gateway: one WebSocket per client, typed request/response with
//! subscription fan-out.
//!
//! The accept loop spawns a task per connection; each connection runs a
//! hello handshake, then a read loop that dispatches requests and a single
//! writer task that serializes outbound frames. Events flow through
//! per-subscription bounded queues so one slow subscription never blocks
//! the manager or the other subscriptions.

mod connection;
mod dispatch;

pub(crate) use connection::Session;

use crate::manager::AgentManager;
use crate::term::TerminalMux;
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Shared daemon context for all connections.
pub struct GatewayCtx {
    pub manager: AgentManager,
    pub term: TerminalMux,
    /// Stable server identity from the persisted keypair.
    pub server_id: String,
    /// When set, clients must present this token in the hello handshake.
    pub auth_token: Option<String>,
    pub shutdown: CancellationToken,
}

/// WebSocket listener.
pub struct Gateway {
    listener: TcpListener,
    ctx: Arc<GatewayCtx>,
}

impl Gateway {
    pub async fn bind(addr: &str, ctx: Arc<GatewayCtx>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "gateway listening");
        Ok(Self { listener, ctx })
    }

    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept until shutdown, spawning a task per connection.
    pub async fn run(self) {
        loop {
            tokio::select! {
                _ = self.ctx.shutdown.cancelled() => {
                    info!("gateway accept loop stopping");
                    return;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            debug!(%addr, "connection accepted");
                            let ctx = Arc::clone(&self.ctx);
                            tokio::spawn(async move {
                                match tokio_tungstenite::accept_async(stream).await {
                                    Ok(ws) => connection::serve(ws, ctx).await,
                                    Err(e) => debug!(%addr, err = %e, "ws handshake failed"),
                                }
                            });
                        }
                        Err(e) => error!(err = %e, "accept error"),
                    }
                }
            }
        }
    }
}
