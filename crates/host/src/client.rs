// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport clients behind the controller.
//!
//! The controller only sees [`HostClient`]/[`HostClientBuilder`]; the
//! production builder dials direct candidates as plain WebSockets and relay
//! candidates as TLS WebSockets carrying the daemon public key in the
//! handshake header. The relay forwards opaque bytes; its crypto is not
//! modeled here.

use crate::profile::{HostConnection, TransportKind};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use paseo_wire::{
    decode_server, encode_client, ClientFrame, Event, Request, Response, ServerFrame,
    PROTOCOL_VERSION,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

/// Handshake + single-request deadline.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from client operations.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("connection closed")]
    Closed,

    #[error("timed out")]
    Timeout,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("daemon rejected request: {0}")]
    Rejected(String),
}

/// Observable client state, driven by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientStatus {
    Idle,
    Connecting,
    Online,
    /// Locally initiated close (`client_closed`, `disposed`).
    Closed { reason: String },
    /// Transport failure.
    Error { reason: String },
}

/// A live (or connectable) session with one daemon over one candidate.
#[async_trait]
pub trait HostClient: Send + Sync + 'static {
    /// Dial and handshake. The status stream reports progress either way.
    async fn connect(&self) -> Result<(), HostError>;

    /// Status updates, starting from the current value.
    fn status(&self) -> watch::Receiver<ClientStatus>;

    /// One correlated request.
    async fn request(&self, request: Request) -> Result<Response, HostError>;

    /// Subscription-scoped events pushed by the daemon.
    fn events(&self) -> broadcast::Receiver<(String, Event)>;

    /// Close and release the transport. Idempotent.
    async fn close(&self, reason: &str);
}

/// Builds a client for one candidate.
#[async_trait]
pub trait HostClientBuilder: Send + Sync + 'static {
    async fn build(
        &self,
        server_id: &str,
        candidate: &HostConnection,
        runtime_generation: u64,
    ) -> Result<Arc<dyn HostClient>, HostError>;
}

/// Production builder over tokio-tungstenite.
pub struct WsClientBuilder {
    /// Stable client identity presented in the hello handshake.
    pub client_id: String,
    /// Auth token presented to daemons that require one.
    pub token: Option<String>,
}

#[async_trait]
impl HostClientBuilder for WsClientBuilder {
    async fn build(
        &self,
        _server_id: &str,
        candidate: &HostConnection,
        runtime_generation: u64,
    ) -> Result<Arc<dyn HostClient>, HostError> {
        Ok(Arc::new(WsHostClient {
            candidate: candidate.clone(),
            client_id: self.client_id.clone(),
            token: self.token.clone(),
            runtime_generation,
            status: watch::channel(ClientStatus::Idle).0,
            events: broadcast::channel(256).0,
            inner: Mutex::new(None),
        }))
    }
}

struct WsInner {
    outbound: mpsc::Sender<Message>,
    pending: Arc<Mutex<HashMap<String, oneshot::Sender<Response>>>>,
}

struct WsHostClient {
    candidate: HostConnection,
    client_id: String,
    token: Option<String>,
    runtime_generation: u64,
    status: watch::Sender<ClientStatus>,
    events: broadcast::Sender<(String, Event)>,
    inner: Mutex<Option<WsInner>>,
}

impl WsHostClient {
    fn set_status(&self, status: ClientStatus) {
        let _ = self.status.send(status);
    }

    fn ws_request(&self) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request, HostError> {
        let url = match &self.candidate.kind {
            TransportKind::Direct { endpoint } => format!("ws://{}/", endpoint),
            TransportKind::Relay { endpoint, .. } => format!("wss://{}/", endpoint),
        };
        let mut request =
            url.into_client_request().map_err(|e| HostError::Connect(e.to_string()))?;
        if let TransportKind::Relay { daemon_public_key_b64, .. } = &self.candidate.kind {
            let value = daemon_public_key_b64
                .parse()
                .map_err(|_| HostError::Connect("invalid daemon key header".to_string()))?;
            request.headers_mut().insert("x-paseo-daemon-key", value);
        }
        Ok(request)
    }
}

#[async_trait]
impl HostClient for WsHostClient {
    async fn connect(&self) -> Result<(), HostError> {
        self.set_status(ClientStatus::Connecting);

        let request = self.ws_request()?;
        let connect = tokio_tungstenite::connect_async(request);
        let (ws, _) = match tokio::time::timeout(REQUEST_TIMEOUT, connect).await {
            Ok(Ok(ok)) => ok,
            Ok(Err(e)) => {
                let reason = e.to_string();
                self.set_status(ClientStatus::Error { reason: reason.clone() });
                return Err(HostError::Connect(reason));
            }
            Err(_) => {
                self.set_status(ClientStatus::Error {
                    reason: "connect_timeout".to_string(),
                });
                return Err(HostError::Timeout);
            }
        };
        let (mut ws_tx, mut ws_rx) = ws.split();

        // Hello handshake before anything else.
        let hello = ClientFrame::Request {
            request_id: "hello".to_string(),
            request: Request::Hello {
                client_id: self.client_id.clone(),
                runtime_generation: self.runtime_generation,
                protocol_version: PROTOCOL_VERSION,
                token: self.token.clone(),
            },
        };
        let text = encode_client(&hello).map_err(|e| HostError::Protocol(e.to_string()))?;
        ws_tx
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| HostError::Transport(e.to_string()))?;

        let hello_response = tokio::time::timeout(REQUEST_TIMEOUT, ws_rx.next()).await;
        match hello_response {
            Ok(Some(Ok(Message::Text(text)))) => match decode_server(&text) {
                Ok(ServerFrame::Response { response: Response::Hello { .. }, .. }) => {}
                Ok(ServerFrame::Response { response: Response::Error { message, .. }, .. }) => {
                    self.set_status(ClientStatus::Error { reason: message.clone() });
                    return Err(HostError::Rejected(message));
                }
                other => {
                    let reason = format!("unexpected hello reply: {:?}", other);
                    self.set_status(ClientStatus::Error { reason: reason.clone() });
                    return Err(HostError::Protocol(reason));
                }
            },
            _ => {
                self.set_status(ClientStatus::Error {
                    reason: "connect_timeout".to_string(),
                });
                return Err(HostError::Timeout);
            }
        }

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(256);
        let pending: Arc<Mutex<HashMap<String, oneshot::Sender<Response>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        *self.inner.lock() =
            Some(WsInner { outbound: outbound_tx, pending: Arc::clone(&pending) });
        self.set_status(ClientStatus::Online);

        // Writer.
        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if ws_tx.send(message).await.is_err() {
                    break;
                }
            }
            let _ = ws_tx.close().await;
        });

        // Reader: correlate responses, fan out events, drive status.
        let status = self.status.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            loop {
                match ws_rx.next().await {
                    Some(Ok(Message::Text(text))) => match decode_server(&text) {
                        Ok(ServerFrame::Response { request_id, response }) => {
                            if let Some(waiter) = pending.lock().remove(&request_id) {
                                let _ = waiter.send(response);
                            }
                        }
                        Ok(ServerFrame::Event { subscription_id, event }) => {
                            let _ = events.send((subscription_id, event));
                        }
                        Err(e) => debug!(err = %e, "malformed server frame"),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        let _ = status.send(ClientStatus::Closed {
                            reason: "client_closed".to_string(),
                        });
                        break;
                    }
                    Some(Err(e)) => {
                        let _ =
                            status.send(ClientStatus::Error { reason: e.to_string() });
                        break;
                    }
                    Some(Ok(_)) => {} // ping/pong/binary
                }
            }
            pending.lock().clear();
        });

        Ok(())
    }

    fn status(&self) -> watch::Receiver<ClientStatus> {
        self.status.subscribe()
    }

    async fn request(&self, request: Request) -> Result<Response, HostError> {
        let (outbound, pending) = {
            let inner = self.inner.lock();
            let inner = inner.as_ref().ok_or(HostError::Closed)?;
            (inner.outbound.clone(), Arc::clone(&inner.pending))
        };

        let request_id = format!("req-{}", nanoid::nanoid!(12));
        let (tx, rx) = oneshot::channel();
        pending.lock().insert(request_id.clone(), tx);

        let frame = ClientFrame::Request { request_id: request_id.clone(), request };
        let text = encode_client(&frame).map_err(|e| HostError::Protocol(e.to_string()))?;
        if outbound.send(Message::Text(text.into())).await.is_err() {
            pending.lock().remove(&request_id);
            return Err(HostError::Closed);
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(HostError::Closed),
            Err(_) => {
                pending.lock().remove(&request_id);
                Err(HostError::Timeout)
            }
        }
    }

    fn events(&self) -> broadcast::Receiver<(String, Event)> {
        self.events.subscribe()
    }

    async fn close(&self, reason: &str) {
        let inner = self.inner.lock().take();
        if let Some(inner) = inner {
            drop(inner.outbound);
            debug!(candidate = %self.candidate.id, reason, "client closed");
        }
        self.set_status(ClientStatus::Closed { reason: reason.to_string() });
    }
}
