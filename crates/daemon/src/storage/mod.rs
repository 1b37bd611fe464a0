// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only agent record persistence.
//!
//! One JSONL log under `$PASEO_HOME`: each line is an `upsert` carrying the
//! full record or a `remove` carrying the id. Load replays the log into a
//! map; unreadable lines are skipped with a structured warning so one bad
//! write never takes the daemon down. When dead lines outnumber live
//! records, the log is compacted on load.
//!
//! All writes go through a single writer task; callers enqueue and return.
//! A write failure is logged and retried implicitly by the next write
//! (state transitions never block on the disk).

use paseo_core::{AgentId, AgentRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Errors from opening or compacting the store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One log line.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum LogOp {
    Upsert { record: AgentRecord },
    Remove { id: AgentId },
}

enum StoreMsg {
    Append(LogOp),
    Flush(oneshot::Sender<()>),
}

/// Handle to the agent record log. Cheap to clone; all clones share the
/// single writer task.
#[derive(Clone)]
pub struct AgentStore {
    tx: mpsc::UnboundedSender<StoreMsg>,
}

impl AgentStore {
    /// Open (or create) the log at `path`, replay it, and start the writer.
    ///
    /// Returns the store handle and the live records in replay order.
    pub fn open(path: &Path) -> Result<(Self, Vec<AgentRecord>), StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::Io { path: parent.to_path_buf(), source: e })?;
        }

        let (records, dead_lines) = replay(path)?;
        if dead_lines > records.len() {
            compact(path, &records)?;
            debug!(path = %path.display(), dead_lines, live = records.len(), "compacted agent log");
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(writer_task(path.to_path_buf(), rx));

        Ok((Self { tx }, records))
    }

    /// Enqueue an upsert. Idempotent: the latest record for an id wins.
    pub fn upsert(&self, record: AgentRecord) {
        let _ = self.tx.send(StoreMsg::Append(LogOp::Upsert { record }));
    }

    /// Enqueue a removal.
    pub fn remove(&self, id: AgentId) {
        let _ = self.tx.send(StoreMsg::Append(LogOp::Remove { id }));
    }

    /// Wait for all previously enqueued writes to reach the file.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(StoreMsg::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

/// Replay the log into live records. Returns (records, dead line count).
fn replay(path: &Path) -> Result<(Vec<AgentRecord>, usize), StorageError> {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(StorageError::Io { path: path.to_path_buf(), source: e }),
    };

    let mut map: HashMap<AgentId, AgentRecord> = HashMap::new();
    let mut order: Vec<AgentId> = Vec::new();
    let mut total_lines = 0usize;

    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!(path = %path.display(), line = line_no + 1, err = %e, "unreadable log line, skipping rest");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        total_lines += 1;
        match serde_json::from_str::<LogOp>(&line) {
            Ok(LogOp::Upsert { record }) => {
                if map.insert(record.id, record.clone()).is_none() {
                    order.push(record.id);
                }
            }
            Ok(LogOp::Remove { id }) => {
                map.remove(&id);
                order.retain(|o| *o != id);
            }
            Err(e) => {
                warn!(path = %path.display(), line = line_no + 1, err = %e, "skipping unparseable record");
            }
        }
    }

    let records: Vec<AgentRecord> =
        order.into_iter().filter_map(|id| map.remove(&id)).collect();
    let dead_lines = total_lines.saturating_sub(records.len());
    Ok((records, dead_lines))
}

/// Rewrite the log with only the live records.
fn compact(path: &Path, records: &[AgentRecord]) -> Result<(), StorageError> {
    let tmp = path.with_extension("jsonl.tmp");
    let io = |e| StorageError::Io { path: path.to_path_buf(), source: e };
    {
        let mut file = std::fs::File::create(&tmp).map_err(io)?;
        for record in records {
            let op = LogOp::Upsert { record: record.clone() };
            let line = serde_json::to_string(&op)
                .map_err(|e| io(std::io::Error::other(e)))?;
            writeln!(file, "{}", line).map_err(io)?;
        }
        file.sync_all().map_err(io)?;
    }
    std::fs::rename(&tmp, path).map_err(io)?;
    Ok(())
}

/// Single writer task: appends ops in arrival order.
async fn writer_task(path: PathBuf, mut rx: mpsc::UnboundedReceiver<StoreMsg>) {
    while let Some(msg) = rx.recv().await {
        match msg {
            StoreMsg::Append(op) => {
                if let Err(e) = append_line(&path, &op) {
                    warn!(path = %path.display(), err = %e, "agent log write failed");
                }
            }
            StoreMsg::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

fn append_line(path: &Path, op: &LogOp) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    let line = serde_json::to_string(op).map_err(std::io::Error::other)?;
    writeln!(file, "{}", line)?;
    file.flush()
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
