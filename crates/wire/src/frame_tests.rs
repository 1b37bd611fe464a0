// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn client_frame_flattens_request() {
    let frame = ClientFrame::Request {
        request_id: "req-1".to_string(),
        request: Request::Ping,
    };
    let json: serde_json::Value =
        serde_json::from_str(&encode_client(&frame).unwrap()).unwrap();
    assert_eq!(json["frame"], "request");
    assert_eq!(json["request_id"], "req-1");
    assert_eq!(json["type"], "ping");
}

#[test]
fn server_frames_decode_both_variants() {
    let response = ServerFrame::Response {
        request_id: "req-1".to_string(),
        response: Response::Pong,
    };
    let text = encode_server(&response).unwrap();
    assert_eq!(decode_server(&text).unwrap(), response);

    let event = ServerFrame::Event {
        subscription_id: "app:srv_1".to_string(),
        event: Event::AgentDirectorySnapshot { agents: vec![] },
    };
    let text = encode_server(&event).unwrap();
    assert_eq!(decode_server(&text).unwrap(), event);
}

#[test]
fn malformed_frames_error() {
    assert!(decode_client("{").is_err());
    assert!(decode_client(r#"{"frame":"nope"}"#).is_err());
    assert!(decode_server(r#"{"frame":"event"}"#).is_err());
}
