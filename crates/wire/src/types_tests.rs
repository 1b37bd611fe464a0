// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    unauthorized = { ErrorCode::Unauthorized, "unauthorized" },
    unknown_agent = { ErrorCode::UnknownAgent, "unknown_agent" },
    unknown_terminal = { ErrorCode::UnknownTerminal, "unknown_terminal" },
    invalid_argument = { ErrorCode::InvalidArgument, "invalid_argument" },
    resource_exhausted = { ErrorCode::ResourceExhausted, "resource_exhausted" },
    rate_limited = { ErrorCode::RateLimited, "rate_limited" },
)]
fn error_codes_display_their_wire_names(code: ErrorCode, expected: &str) {
    assert_eq!(code.to_string(), expected);
    let json = serde_json::to_value(code).unwrap();
    assert_eq!(json, expected);
}

#[test]
fn byte_payloads_round_trip_base64() {
    let data = b"\x1b[2J\x1b[Hhello \xf0\x9f\x8c\x8d";
    let encoded = encode_bytes(data);
    let decoded = decode_bytes(&encoded).unwrap();
    assert_eq!(decoded, data);
}

#[test]
fn decode_bytes_rejects_garbage() {
    assert!(decode_bytes("not base64 !!!").is_err());
}

#[test]
fn key_event_round_trips_with_modifiers() {
    let key = KeyEvent { key: "c".to_string(), ctrl: true, ..KeyEvent::default() };
    let json = serde_json::to_string(&key).unwrap();
    let back: KeyEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(back, key);
}

#[test]
fn agent_info_tolerates_missing_mode() {
    let json = r#"{
        "id": "agt-1", "title": "t", "provider": "claude", "cwd": "/tmp",
        "status": "ready", "created_at_ms": 1, "last_activity_at_ms": 1
    }"#;
    let info: AgentInfo = serde_json::from_str(json).unwrap();
    assert!(info.mode.available_modes.is_empty());
    assert!(info.labels.is_empty());
}
