// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parser tests for the stdio adapter's tolerant Value navigation.

use super::*;
use serde_json::json;
use yare::parameterized;

#[test]
fn session_update_parses_message_chunk_with_single_block() {
    let params = json!({
        "sessionId": "s1",
        "update": {
            "sessionUpdate": "agent_message_chunk",
            "content": { "type": "text", "text": "hello" },
        },
    });
    match parse_session_update(&params) {
        Some(SessionUpdate::AgentMessageChunk { content }) => {
            assert_eq!(content, vec![ContentBlock::Text { text: "hello".to_string() }]);
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn session_update_parses_block_arrays() {
    let params = json!({
        "update": {
            "sessionUpdate": "agent_thought_chunk",
            "content": [
                { "type": "text", "text": "a" },
                { "type": "unknown_kind", "x": 1 },
                { "type": "text", "text": "b" },
            ],
        },
    });
    match parse_session_update(&params) {
        Some(SessionUpdate::AgentThoughtChunk { content }) => {
            // Unknown block kinds are dropped, not fatal.
            assert_eq!(content.len(), 2);
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn session_update_parses_tool_call() {
    let params = json!({
        "update": {
            "sessionUpdate": "tool_call",
            "toolCallId": "tc-1",
            "title": "Edit main.rs",
            "kind": "edit",
            "status": "in_progress",
            "rawInput": { "path": "src/main.rs" },
        },
    });
    match parse_session_update(&params) {
        Some(SessionUpdate::ToolCall(tc)) => {
            assert_eq!(tc.tool_call_id, "tc-1");
            assert_eq!(tc.status, ToolCallStatus::InProgress);
            assert_eq!(tc.kind.as_deref(), Some("edit"));
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn session_update_parses_mode_change() {
    let params = json!({
        "update": { "sessionUpdate": "current_mode_update", "currentModeId": "plan" },
    });
    assert_eq!(
        parse_session_update(&params),
        Some(SessionUpdate::ModeChanged { mode_id: "plan".to_string() })
    );
}

#[test]
fn unknown_update_kinds_are_skipped() {
    let params = json!({ "update": { "sessionUpdate": "plan", "entries": [] } });
    assert_eq!(parse_session_update(&params), None);
    assert_eq!(parse_session_update(&json!({})), None);
}

#[parameterized(
    end_turn = { "end_turn", StopReason::EndTurn },
    refusal = { "refusal", StopReason::Refusal },
    cancelled = { "cancelled", StopReason::Cancelled },
    max_tokens = { "max_tokens", StopReason::Other },
    garbage = { "???", StopReason::Other },
)]
fn stop_reasons_map_with_other_fallback(raw: &str, expected: StopReason) {
    assert_eq!(parse_stop_reason(raw), expected);
}

#[test]
fn session_opened_requires_session_id() {
    let ok = parse_session_opened(&json!({
        "sessionId": "s9",
        "modes": {
            "currentModeId": "default",
            "availableModes": [ { "id": "default", "name": "Always Ask" } ],
        },
    }))
    .unwrap();
    assert_eq!(ok.session_id, "s9");
    let modes = ok.modes.unwrap();
    assert_eq!(modes.current_mode_id.as_deref(), Some("default"));
    assert_eq!(modes.available_modes.len(), 1);

    assert!(parse_session_opened(&json!({ "modes": {} })).is_err());
}

#[test]
fn modes_absent_when_adapter_is_silent() {
    let opened = parse_session_opened(&json!({ "sessionId": "s1" })).unwrap();
    assert!(opened.modes.is_none());
}

#[test]
fn permission_options_require_option_id() {
    let ok = parse_permission_option(&json!({
        "optionId": "allow", "name": "Allow", "kind": "allow_always",
    }))
    .unwrap();
    assert_eq!(ok.kind, PermissionOptionKind::AllowAlways);
    assert_eq!(ok.option_id, "allow");

    assert!(parse_permission_option(&json!({ "name": "Allow" })).is_none());
}

#[test]
fn resolve_path_roots_relative_paths_at_cwd() {
    let cwd = Path::new("/work/repo");
    assert_eq!(resolve_path(cwd, "src/lib.rs"), PathBuf::from("/work/repo/src/lib.rs"));
    assert_eq!(resolve_path(cwd, "/etc/hosts"), PathBuf::from("/etc/hosts"));
}
