// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multiplexer tests against real PTYs running /bin/sh.

use super::*;
use std::time::Duration;

struct Sink {
    buf: Arc<parking_lot::Mutex<Vec<u8>>>,
    exited: Arc<parking_lot::Mutex<bool>>,
}

impl Sink {
    fn new() -> (Self, Arc<dyn Fn(StreamEvent) + Send + Sync>) {
        let buf: Arc<parking_lot::Mutex<Vec<u8>>> = Arc::default();
        let exited: Arc<parking_lot::Mutex<bool>> = Arc::default();
        let cb_buf = Arc::clone(&buf);
        let cb_exit = Arc::clone(&exited);
        let callback: Arc<dyn Fn(StreamEvent) + Send + Sync> =
            Arc::new(move |event| match event {
                StreamEvent::Data(data) => cb_buf.lock().extend_from_slice(&data),
                StreamEvent::Exit => *cb_exit.lock() = true,
            });
        (Self { buf, exited }, callback)
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock()).into_owned()
    }

    fn has_exited(&self) -> bool {
        *self.exited.lock()
    }
}

async fn wait_until(mut check: impl FnMut() -> bool, what: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn create_lists_and_kill_removes() {
    let dir = tempfile::tempdir().unwrap();
    let mux = TerminalMux::new();

    let info = mux.create_terminal(dir.path()).unwrap();
    assert_eq!(mux.list_terminals(dir.path()).len(), 1);
    assert!(info.id.as_str().starts_with("term-"));
    assert!(mux.list_terminals(std::path::Path::new("/elsewhere")).is_empty());

    mux.kill_terminal(&info.id).unwrap();
    let mux2 = mux.clone();
    let cwd = dir.path().to_path_buf();
    wait_until(move || mux2.list_terminals(&cwd).is_empty(), "terminal removal").await;

    // Attach after exit fails with unknown terminal.
    let (_sink, callback) = Sink::new();
    assert!(matches!(
        mux.attach_stream(&info.id, paseo_core::StreamId::new(), callback),
        Err(TermError::UnknownTerminal(_))
    ));
}

#[tokio::test]
async fn attached_stream_sees_input_echo() {
    let dir = tempfile::tempdir().unwrap();
    let mux = TerminalMux::new();
    let info = mux.create_terminal(dir.path()).unwrap();

    let (sink, callback) = Sink::new();
    let stream_id = paseo_core::StreamId::new();
    mux.attach_stream(&info.id, stream_id, callback).unwrap();

    mux.send_stream_input(&stream_id, b"echo paseo-mark-$((40+2))\n").await.unwrap();
    wait_until(|| sink.text().contains("paseo-mark-42"), "echoed output").await;

    mux.kill_terminal(&info.id).unwrap();
    wait_until(|| sink.has_exited(), "stream exit event").await;
}

#[tokio::test]
async fn late_attach_receives_scrollback_snapshot_then_tail() {
    let dir = tempfile::tempdir().unwrap();
    let mux = TerminalMux::new();
    let info = mux.create_terminal(dir.path()).unwrap();

    let (first, first_cb) = Sink::new();
    let first_stream = paseo_core::StreamId::new();
    mux.attach_stream(&info.id, first_stream, first_cb).unwrap();
    mux.send_stream_input(&first_stream, b"echo early-$((1+1))\n").await.unwrap();
    wait_until(|| first.text().contains("early-2"), "first output").await;

    // A late subscriber must see the history in its snapshot.
    let (_late, late_cb) = Sink::new();
    let late_stream = paseo_core::StreamId::new();
    let snapshot = mux.attach_stream(&info.id, late_stream, late_cb).unwrap();
    let history = String::from_utf8_lossy(&snapshot).into_owned();
    assert!(history.contains("early-2"), "snapshot missing history: {:?}", history);

    mux.detach_stream(&late_stream);
    mux.detach_stream(&late_stream); // idempotent
    mux.kill_terminal(&info.id).unwrap();
}

#[tokio::test]
async fn key_events_reach_the_shell() {
    let dir = tempfile::tempdir().unwrap();
    let mux = TerminalMux::new();
    let info = mux.create_terminal(dir.path()).unwrap();

    let (sink, callback) = Sink::new();
    let stream_id = paseo_core::StreamId::new();
    mux.attach_stream(&info.id, stream_id, callback).unwrap();

    mux.send_stream_input(&stream_id, b"echo key-$((20+3))").await.unwrap();
    mux.send_stream_key(&stream_id, &paseo_wire::KeyEvent::named("Enter")).await.unwrap();
    wait_until(|| sink.text().contains("key-23"), "key-driven output").await;

    let err = mux
        .send_stream_key(&stream_id, &paseo_wire::KeyEvent::named("Hyper"))
        .await
        .unwrap_err();
    assert!(matches!(err, TermError::UnsupportedKey(_)));

    mux.kill_terminal(&info.id).unwrap();
}

#[tokio::test]
async fn resize_is_idempotent_for_equal_sizes() {
    let dir = tempfile::tempdir().unwrap();
    let mux = TerminalMux::new();
    let info = mux.create_terminal(dir.path()).unwrap();

    mux.resize_terminal(&info.id, 40, 120).unwrap();
    mux.resize_terminal(&info.id, 40, 120).unwrap();
    mux.resize_terminal(&info.id, 50, 132).unwrap();

    mux.kill_terminal(&info.id).unwrap();
}

#[tokio::test]
async fn list_subscribers_hear_create_and_exit() {
    let dir = tempfile::tempdir().unwrap();
    let mux = TerminalMux::new();

    let lists: Arc<parking_lot::Mutex<Vec<usize>>> = Arc::default();
    let sink = Arc::clone(&lists);
    let sub = mux.subscribe_lists(dir.path(), Arc::new(move |ts| sink.lock().push(ts.len())));

    let info = mux.create_terminal(dir.path()).unwrap();
    wait_until(|| lists.lock().first() == Some(&1), "create notification").await;

    mux.kill_terminal(&info.id).unwrap();
    wait_until(|| lists.lock().last() == Some(&0), "exit notification").await;

    mux.unsubscribe_lists(sub);
}

#[tokio::test]
async fn stream_input_to_unknown_stream_errors() {
    let mux = TerminalMux::new();
    let err = mux
        .send_stream_input(&paseo_core::StreamId::new(), b"x")
        .await
        .unwrap_err();
    assert!(matches!(err, TermError::UnknownStream(_)));
}
