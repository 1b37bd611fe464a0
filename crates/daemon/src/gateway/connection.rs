// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection state: handshake, subscriptions, backpressure, writer.

use super::{dispatch, GatewayCtx};
use crate::env;
use paseo_core::{AgentId, StreamId};
use paseo_wire::{
    decode_client, encode_server, ClientFrame, ErrorCode, Event, Request, Response, ServerFrame,
    PROTOCOL_VERSION,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};

use futures_util::{SinkExt, StreamExt};

/// Bounded depth of each subscription queue.
pub(crate) const SUBSCRIPTION_QUEUE_CAP: usize = 256;

/// Outbound writer queue depth (responses + forwarded events).
const OUTBOUND_CAP: usize = 1024;

/// Requests accepted per connection per one-second window.
pub(crate) const RATE_LIMIT_PER_SEC: u32 = 64;

/// Who is on the other end, from the hello handshake.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionIdentity {
    pub client_id: String,
    pub runtime_generation: u64,
}

/// What a subscription id is bound to, with the handles needed to unbind.
pub(crate) enum Binding {
    Agent { agent_id: AgentId, manager_sub: u64 },
    Directory { manager_sub: u64 },
    TerminalList { cwd: PathBuf, mux_sub: u64 },
    TerminalStream { stream_id: StreamId },
}

/// Control messages from subscription callbacks back to the session task.
pub(crate) enum Control {
    /// A subscription's queue overflowed; drop it and tell the client.
    Exhausted(String),
}

/// Fixed one-second request window.
struct RateWindow {
    start: std::time::Instant,
    count: u32,
}

pub(crate) struct Session {
    pub ctx: Arc<GatewayCtx>,
    pub identity: ConnectionIdentity,
    outbound: mpsc::Sender<ServerFrame>,
    control: mpsc::UnboundedSender<Control>,
    bindings: Mutex<HashMap<String, Binding>>,
    rate: Mutex<RateWindow>,
}

/// One subscription's bounded queue. Pushes never block the caller: a full
/// queue either coalesces (identical consecutive event) or reports
/// exhaustion, per the backpressure contract.
pub(crate) struct SubQueue {
    subscription_id: String,
    tx: mpsc::Sender<Event>,
    last: Mutex<Option<Event>>,
    control: mpsc::UnboundedSender<Control>,
}

impl SubQueue {
    pub fn push(&self, event: Event) {
        match self.tx.try_send(event.clone()) {
            Ok(()) => {
                *self.last.lock() = Some(event);
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                // Consecutive identical events coalesce away silently.
                if self.last.lock().as_ref() == Some(&event) {
                    return;
                }
                let _ = self.control.send(Control::Exhausted(self.subscription_id.clone()));
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

impl Session {
    /// Register a subscription queue + its binding. Returns the queue for
    /// the callback side. Rebinding an existing id replaces the old binding
    /// (resumable subscriptions across reconnects reuse their ids).
    pub(crate) fn bind(&self, subscription_id: &str, binding: Binding) -> Arc<SubQueue> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_QUEUE_CAP);
        let queue = Arc::new(SubQueue {
            subscription_id: subscription_id.to_string(),
            tx,
            last: Mutex::new(None),
            control: self.control.clone(),
        });
        if let Some(old) = self
            .bindings
            .lock()
            .insert(subscription_id.to_string(), binding)
        {
            self.unbind_handles(old);
        }
        tokio::spawn(forward_events(
            subscription_id.to_string(),
            rx,
            self.outbound.clone(),
        ));
        queue
    }

    /// Replace a binding's handles after registration, without touching the
    /// queue. Used to fill in the real manager/mux handle once known.
    pub(crate) fn set_binding(&self, subscription_id: &str, binding: Binding) {
        self.bindings.lock().insert(subscription_id.to_string(), binding);
    }

    /// Remove a binding and release its callbacks. Idempotent.
    pub(crate) fn unbind(&self, subscription_id: &str) {
        if let Some(binding) = self.bindings.lock().remove(subscription_id) {
            self.unbind_handles(binding);
        }
    }

    /// Remove the terminal-list binding for a cwd, if any.
    pub(crate) fn unbind_terminal_list(&self, cwd: &std::path::Path) {
        let found = {
            let bindings = self.bindings.lock();
            bindings
                .iter()
                .find_map(|(id, b)| match b {
                    Binding::TerminalList { cwd: bound, .. } if bound == cwd => {
                        Some(id.clone())
                    }
                    _ => None,
                })
        };
        if let Some(id) = found {
            self.unbind(&id);
        }
    }

    fn unbind_handles(&self, binding: Binding) {
        match binding {
            Binding::Agent { agent_id, manager_sub } => {
                self.ctx.manager.unsubscribe_updates(&agent_id, manager_sub);
            }
            Binding::Directory { manager_sub } => {
                self.ctx.manager.unsubscribe_directory(manager_sub);
            }
            Binding::TerminalList { mux_sub, .. } => {
                self.ctx.term.unsubscribe_lists(mux_sub);
            }
            Binding::TerminalStream { stream_id } => {
                self.ctx.term.detach_stream(&stream_id);
            }
        }
    }

    fn unbind_all(&self) {
        let drained: Vec<Binding> =
            self.bindings.lock().drain().map(|(_, b)| b).collect();
        for binding in drained {
            self.unbind_handles(binding);
        }
    }

    async fn respond(&self, request_id: String, response: Response) {
        let frame = ServerFrame::Response { request_id, response };
        if self.outbound.send(frame).await.is_err() {
            debug!("connection writer gone, dropping response");
        }
    }

    /// Count one request against the current window.
    pub(crate) fn admit_request(&self) -> bool {
        let mut window = self.rate.lock();
        let now = std::time::Instant::now();
        if now.duration_since(window.start) >= std::time::Duration::from_secs(1) {
            window.start = now;
            window.count = 0;
        }
        window.count += 1;
        window.count <= RATE_LIMIT_PER_SEC
    }
}

/// Forward one subscription's events into the connection writer, preserving
/// per-subscription order.
async fn forward_events(
    subscription_id: String,
    mut rx: mpsc::Receiver<Event>,
    outbound: mpsc::Sender<ServerFrame>,
) {
    while let Some(event) = rx.recv().await {
        let frame = ServerFrame::Event { subscription_id: subscription_id.clone(), event };
        if outbound.send(frame).await.is_err() {
            return;
        }
    }
}

/// Run one accepted WebSocket to completion.
pub(crate) async fn serve(ws: WebSocketStream<TcpStream>, ctx: Arc<GatewayCtx>) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    // Hello handshake, bounded by the ipc timeout.
    let hello = tokio::time::timeout(env::ipc_timeout(), ws_rx.next()).await;
    let frame = match hello {
        Ok(Some(Ok(Message::Text(text)))) => match decode_client(&text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(err = %e, "malformed hello frame");
                return;
            }
        },
        _ => {
            debug!("connection closed before hello");
            return;
        }
    };
    let ClientFrame::Request { request_id, request } = frame;
    let identity = match request {
        Request::Hello { client_id, runtime_generation, protocol_version, token } => {
            if protocol_version != PROTOCOL_VERSION {
                let _ = send_direct(
                    &mut ws_tx,
                    ServerFrame::Response {
                        request_id,
                        response: Response::error(
                            ErrorCode::InvalidArgument,
                            format!("unsupported protocol version {}", protocol_version),
                        ),
                    },
                )
                .await;
                return;
            }
            if let Some(expected) = ctx.auth_token.as_deref() {
                if token.as_deref() != Some(expected) {
                    let _ = send_direct(
                        &mut ws_tx,
                        ServerFrame::Response {
                            request_id,
                            response: Response::error(ErrorCode::Unauthorized, "unauthorized"),
                        },
                    )
                    .await;
                    return;
                }
            }
            let identity = ConnectionIdentity { client_id, runtime_generation };
            let ok = send_direct(
                &mut ws_tx,
                ServerFrame::Response {
                    request_id,
                    response: Response::Hello {
                        protocol_version: PROTOCOL_VERSION,
                        server_id: ctx.server_id.clone(),
                    },
                },
            )
            .await;
            if !ok {
                return;
            }
            identity
        }
        _ => {
            let _ = send_direct(
                &mut ws_tx,
                ServerFrame::Response {
                    request_id,
                    response: Response::error(
                        ErrorCode::Unauthorized,
                        "connection must start with hello",
                    ),
                },
            )
            .await;
            return;
        }
    };

    debug!(client_id = %identity.client_id, generation = identity.runtime_generation,
        "client connected");

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerFrame>(OUTBOUND_CAP);
    let (control_tx, mut control_rx) = mpsc::unbounded_channel::<Control>();

    let session = Arc::new(Session {
        ctx: Arc::clone(&ctx),
        identity,
        outbound: outbound_tx,
        control: control_tx,
        bindings: Mutex::new(HashMap::new()),
        rate: Mutex::new(RateWindow { start: std::time::Instant::now(), count: 0 }),
    });

    // Single writer preserves frame order end-to-end.
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            match encode_server(&frame) {
                Ok(text) => {
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(err = %e, "failed to encode outbound frame"),
            }
        }
        let _ = ws_tx.close().await;
    });

    // Read loop: dispatch requests, watch controls and shutdown.
    loop {
        tokio::select! {
            _ = ctx.shutdown.cancelled() => break,
            Some(control) = control_rx.recv() => {
                let Control::Exhausted(subscription_id) = control;
                warn!(subscription_id = %subscription_id, "subscription queue overflow");
                session.unbind(&subscription_id);
                let frame = ServerFrame::Event {
                    subscription_id: subscription_id.clone(),
                    event: Event::ResourceExhausted { subscription_id },
                };
                let _ = session.outbound.try_send(frame);
            }
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let frame = match decode_client(&text) {
                            Ok(frame) => frame,
                            Err(e) => {
                                debug!(err = %e, "malformed client frame");
                                continue;
                            }
                        };
                        let ClientFrame::Request { request_id, request } = frame;
                        if !session.admit_request() {
                            let _ = session.outbound.try_send(ServerFrame::Response {
                                request_id,
                                response: Response::error(
                                    ErrorCode::RateLimited,
                                    "request rate exceeded, back off",
                                ),
                            });
                            continue;
                        }
                        let session = Arc::clone(&session);
                        tokio::spawn(async move {
                            let response = dispatch::handle(&session, request).await;
                            session.respond(request_id, response).await;
                        });
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // ping/pong/binary: ignore
                    Some(Err(e)) => {
                        debug!(err = %e, "ws read error");
                        break;
                    }
                }
            }
        }
    }

    session.unbind_all();
    debug!(client_id = %session.identity.client_id, "client disconnected");
    drop(session);
    let _ = writer.await;
}

async fn send_direct(
    ws_tx: &mut (impl SinkExt<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin),
    frame: ServerFrame,
) -> bool {
    match encode_server(&frame) {
        Ok(text) => ws_tx.send(Message::Text(text.into())).await.is_ok(),
        Err(_) => false,
    }
}

/// Build a session with its outbound/control receivers exposed, for tests
/// that drive dispatch without a socket.
#[cfg(test)]
pub(crate) fn test_session(
    ctx: Arc<GatewayCtx>,
) -> (Arc<Session>, mpsc::Receiver<ServerFrame>, mpsc::UnboundedReceiver<Control>) {
    let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CAP);
    let (control, control_rx) = mpsc::unbounded_channel();
    let session = Arc::new(Session {
        ctx,
        identity: ConnectionIdentity {
            client_id: "test-client".to_string(),
            runtime_generation: 1,
        },
        outbound,
        control,
        bindings: Mutex::new(HashMap::new()),
        rate: Mutex::new(RateWindow { start: std::time::Instant::now(), count: 0 }),
    });
    (session, outbound_rx, control_rx)
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
