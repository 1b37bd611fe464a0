// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal multiplexer: PTYs per working directory with attached byte
//! streams.
//!
//! Each terminal owns one PTY and a bounded scrollback ring. A newly
//! attached subscriber gets the ring as a single snapshot and then the live
//! tail; both happen under one lock, so there are no gaps or duplicates.
//! Byte order per terminal is preserved by the single reader task.

mod keys;
mod pty;

pub use keys::encode_key;
pub use pty::{Pty, PtyError};

use bytes::Bytes;
use paseo_core::clock::epoch_ms_now;
use paseo_core::{StreamId, TerminalId};
use paseo_wire::TerminalInfo;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Scrollback retained per terminal.
pub const SCROLLBACK_CAP: usize = 200 * 1024;

/// Default PTY geometry before the first resize.
const DEFAULT_ROWS: u16 = 24;
const DEFAULT_COLS: u16 = 80;

/// SIGHUP → SIGKILL escalation delay for kill_terminal.
const KILL_ESCALATION: std::time::Duration = std::time::Duration::from_secs(3);

/// Errors from multiplexer operations.
#[derive(Debug, Error)]
pub enum TermError {
    #[error("unknown terminal: {0}")]
    UnknownTerminal(TerminalId),

    #[error("unknown stream: {0}")]
    UnknownStream(StreamId),

    #[error("unsupported key: {0}")]
    UnsupportedKey(String),

    #[error(transparent)]
    Pty(#[from] PtyError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Events delivered to one attached stream, in order.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Data(Bytes),
    Exit,
}

struct Scrollback {
    bytes: VecDeque<u8>,
}

impl Scrollback {
    fn new() -> Self {
        Self { bytes: VecDeque::new() }
    }

    fn push(&mut self, data: &[u8]) {
        // Oversized writes keep only their tail.
        let start = data.len().saturating_sub(SCROLLBACK_CAP);
        self.bytes.extend(&data[start..]);
        while self.bytes.len() > SCROLLBACK_CAP {
            self.bytes.pop_front();
        }
    }

    fn snapshot(&self) -> Vec<u8> {
        self.bytes.iter().copied().collect()
    }
}

struct TermState {
    scrollback: Scrollback,
    subscribers: HashMap<StreamId, Arc<dyn Fn(StreamEvent) + Send + Sync>>,
    exited: bool,
}

struct Terminal {
    id: TerminalId,
    cwd: PathBuf,
    name: String,
    created_at_ms: u64,
    pty: Pty,
    state: Mutex<TermState>,
}

impl Terminal {
    fn info(&self) -> TerminalInfo {
        TerminalInfo {
            id: self.id,
            cwd: self.cwd.clone(),
            name: self.name.clone(),
            created_at_ms: self.created_at_ms,
        }
    }
}

struct ListSub {
    cwd: PathBuf,
    callback: Arc<dyn Fn(Vec<TerminalInfo>) + Send + Sync>,
}

struct TermInner {
    terminals: Mutex<HashMap<TerminalId, Arc<Terminal>>>,
    /// stream id → owning terminal.
    streams: Mutex<HashMap<StreamId, TerminalId>>,
    list_subs: Mutex<HashMap<u64, ListSub>>,
    next_sub: AtomicU64,
}

/// Handle to the terminal pool. Cheap to clone.
#[derive(Clone)]
pub struct TerminalMux {
    inner: Arc<TermInner>,
}

impl Default for TerminalMux {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalMux {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TermInner {
                terminals: Mutex::new(HashMap::new()),
                streams: Mutex::new(HashMap::new()),
                list_subs: Mutex::new(HashMap::new()),
                next_sub: AtomicU64::new(1),
            }),
        }
    }

    /// Terminals bound to `cwd`, oldest first.
    pub fn list_terminals(&self, cwd: &Path) -> Vec<TerminalInfo> {
        let mut infos: Vec<_> = self
            .inner
            .terminals
            .lock()
            .values()
            .filter(|t| t.cwd == cwd)
            .map(|t| t.info())
            .collect();
        infos.sort_by_key(|i| i.created_at_ms);
        infos
    }

    /// Spawn a shell PTY in `cwd`. The terminal is listed before this
    /// returns.
    pub fn create_terminal(&self, cwd: &Path) -> Result<TerminalInfo, TermError> {
        let pty = Pty::spawn_shell(cwd, DEFAULT_ROWS, DEFAULT_COLS)?;
        let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
        let shell_name = Path::new(&shell)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or(shell);
        let dir_name = cwd
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| cwd.display().to_string());

        let terminal = Arc::new(Terminal {
            id: TerminalId::new(),
            cwd: cwd.to_path_buf(),
            name: format!("{} ({})", shell_name, dir_name),
            created_at_ms: epoch_ms_now(),
            pty,
            state: Mutex::new(TermState {
                scrollback: Scrollback::new(),
                subscribers: HashMap::new(),
                exited: false,
            }),
        });
        let info = terminal.info();

        self.inner.terminals.lock().insert(terminal.id, Arc::clone(&terminal));
        self.notify_lists(cwd);

        let mux = self.clone();
        tokio::spawn(async move { mux.read_loop(terminal).await });

        info!(terminal_id = %info.id, cwd = %cwd.display(), "terminal created");
        Ok(info)
    }

    /// Graceful exit signal, escalating after a bounded delay.
    pub fn kill_terminal(&self, id: &TerminalId) -> Result<(), TermError> {
        let terminal = self.get(id)?;
        terminal.pty.signal_hup();

        tokio::spawn(async move {
            tokio::time::sleep(KILL_ESCALATION).await;
            if !terminal.state.lock().exited {
                debug!(terminal_id = %terminal.id, "escalating terminal kill");
                terminal.pty.signal_kill();
            }
        });
        Ok(())
    }

    /// Attach a subscriber under a caller-chosen stream id. Returns the
    /// scrollback snapshot taken atomically with the registration, so the
    /// subscriber sees snapshot + live tail with no gap or duplicate.
    pub fn attach_stream(
        &self,
        terminal_id: &TerminalId,
        stream_id: StreamId,
        callback: Arc<dyn Fn(StreamEvent) + Send + Sync>,
    ) -> Result<Vec<u8>, TermError> {
        let terminal = self.get(terminal_id)?;

        let snapshot = {
            let mut state = terminal.state.lock();
            if state.exited {
                return Err(TermError::UnknownTerminal(*terminal_id));
            }
            state.subscribers.insert(stream_id, callback);
            state.scrollback.snapshot()
        };
        self.inner.streams.lock().insert(stream_id, *terminal_id);
        Ok(snapshot)
    }

    /// Detach a stream. Idempotent.
    pub fn detach_stream(&self, stream_id: &StreamId) {
        let Some(terminal_id) = self.inner.streams.lock().remove(stream_id) else {
            return;
        };
        if let Ok(terminal) = self.get(&terminal_id) {
            terminal.state.lock().subscribers.remove(stream_id);
        }
    }

    /// Raw input bytes for the PTY behind a stream.
    pub async fn send_stream_input(
        &self,
        stream_id: &StreamId,
        data: &[u8],
    ) -> Result<(), TermError> {
        let terminal = self.stream_terminal(stream_id)?;
        terminal.pty.write_all(data).await?;
        Ok(())
    }

    /// Structured key press, encoded server-side.
    pub async fn send_stream_key(
        &self,
        stream_id: &StreamId,
        key: &paseo_wire::KeyEvent,
    ) -> Result<(), TermError> {
        let bytes =
            encode_key(key).ok_or_else(|| TermError::UnsupportedKey(key.key.clone()))?;
        self.send_stream_input(stream_id, &bytes).await
    }

    /// Resize the PTY. Idempotent for equal sizes.
    pub fn resize_terminal(
        &self,
        id: &TerminalId,
        rows: u16,
        cols: u16,
    ) -> Result<(), TermError> {
        let terminal = self.get(id)?;
        terminal.pty.resize(rows, cols)?;
        Ok(())
    }

    /// List-change notifications for one cwd.
    pub fn subscribe_lists(
        &self,
        cwd: &Path,
        callback: Arc<dyn Fn(Vec<TerminalInfo>) + Send + Sync>,
    ) -> u64 {
        let sub = self.inner.next_sub.fetch_add(1, Ordering::Relaxed);
        self.inner
            .list_subs
            .lock()
            .insert(sub, ListSub { cwd: cwd.to_path_buf(), callback });
        sub
    }

    pub fn unsubscribe_lists(&self, sub: u64) {
        self.inner.list_subs.lock().remove(&sub);
    }

    fn get(&self, id: &TerminalId) -> Result<Arc<Terminal>, TermError> {
        self.inner
            .terminals
            .lock()
            .get(id.as_str())
            .cloned()
            .ok_or(TermError::UnknownTerminal(*id))
    }

    fn stream_terminal(&self, stream_id: &StreamId) -> Result<Arc<Terminal>, TermError> {
        let terminal_id = self
            .inner
            .streams
            .lock()
            .get(stream_id)
            .copied()
            .ok_or(TermError::UnknownStream(*stream_id))?;
        self.get(&terminal_id)
    }

    fn notify_lists(&self, cwd: &Path) {
        let subs: Vec<_> = self
            .inner
            .list_subs
            .lock()
            .values()
            .filter(|s| s.cwd == cwd)
            .map(|s| Arc::clone(&s.callback))
            .collect();
        if subs.is_empty() {
            return;
        }
        let terminals = self.list_terminals(cwd);
        for callback in subs {
            callback(terminals.clone());
        }
    }

    /// Single reader: scrollback + fan-out, then exit handling.
    async fn read_loop(&self, terminal: Arc<Terminal>) {
        let mut buf = vec![0u8; 8192];
        loop {
            match terminal.pty.read_chunk(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    let data = Bytes::copy_from_slice(&buf[..n]);
                    let subscribers: Vec<_> = {
                        let mut state = terminal.state.lock();
                        state.scrollback.push(&data);
                        state.subscribers.values().cloned().collect()
                    };
                    for callback in subscribers {
                        callback(StreamEvent::Data(data.clone()));
                    }
                }
                Err(e) if e.raw_os_error() == Some(nix::libc::EIO) => break,
                Err(e) => {
                    debug!(terminal_id = %terminal.id, err = %e, "pty read error");
                    break;
                }
            }
        }

        let exit_code = terminal.pty.wait_exit().await;
        info!(terminal_id = %terminal.id, ?exit_code, "terminal exited");

        let subscribers: Vec<_> = {
            let mut state = terminal.state.lock();
            state.exited = true;
            state.subscribers.drain().map(|(_, cb)| cb).collect()
        };
        for callback in subscribers {
            callback(StreamEvent::Exit);
        }

        self.inner.terminals.lock().remove(terminal.id.as_str());
        self.inner.streams.lock().retain(|_, tid| *tid != terminal.id);
        self.notify_lists(&terminal.cwd);
    }
}

#[cfg(test)]
#[path = "mux_tests.rs"]
mod tests;
