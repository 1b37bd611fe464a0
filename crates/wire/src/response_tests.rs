// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::types::ErrorCode;

#[test]
fn error_helper_builds_typed_errors() {
    let resp = Response::error(ErrorCode::UnknownAgent, "no such agent");
    let json = serde_json::to_value(&resp).unwrap();
    assert_eq!(json["type"], "error");
    assert_eq!(json["code"], "unknown_agent");
    assert_eq!(json["message"], "no such agent");
}

#[test]
fn finished_omits_absent_stop_reason() {
    let resp = Response::Finished { status: AgentStatus::Failed, stop_reason: None };
    let json = serde_json::to_value(&resp).unwrap();
    assert!(json.get("stop_reason").is_none());

    let resp = Response::Finished {
        status: AgentStatus::Completed,
        stop_reason: Some(StopReason::EndTurn),
    };
    let json = serde_json::to_value(&resp).unwrap();
    assert_eq!(json["stop_reason"], "end_turn");
}

#[test]
fn stream_attached_round_trips() {
    let resp = Response::StreamAttached {
        stream_id: "stm-7".into(),
        terminal_id: "term-7".into(),
        snapshot: crate::encode_bytes(b"$ ls\n"),
    };
    let json = serde_json::to_string(&resp).unwrap();
    let back: Response = serde_json::from_str(&json).unwrap();
    assert_eq!(back, resp);
}
