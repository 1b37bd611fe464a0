// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Property tests: frame encoding round-trips for arbitrary payloads.

use crate::*;
use proptest::prelude::*;

fn arb_key_event() -> impl Strategy<Value = KeyEvent> {
    (
        prop_oneof![
            Just("Enter".to_string()),
            Just("Escape".to_string()),
            Just("Tab".to_string()),
            Just("ArrowUp".to_string()),
            "[a-z]",
        ],
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(|(key, ctrl, shift, alt, meta)| KeyEvent { key, ctrl, shift, alt, meta })
}

proptest! {
    #[test]
    fn key_events_round_trip(key in arb_key_event()) {
        let frame = ClientFrame::Request {
            request_id: "req-p".to_string(),
            request: Request::SendTerminalStreamKey {
                stream_id: "stm-p".into(),
                key: key.clone(),
            },
        };
        let text = encode_client(&frame).unwrap();
        let back = decode_client(&text).unwrap();
        let ClientFrame::Request { request, .. } = back;
        prop_assert_eq!(
            request,
            Request::SendTerminalStreamKey { stream_id: "stm-p".into(), key }
        );
    }

    #[test]
    fn byte_payloads_round_trip(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let encoded = encode_bytes(&data);
        let decoded = decode_bytes(&encoded).unwrap();
        prop_assert_eq!(decoded, data);
    }

    #[test]
    fn request_ids_survive_framing(id in "[a-zA-Z0-9:_-]{1,40}") {
        let frame = ClientFrame::Request {
            request_id: id.clone(),
            request: Request::Ping,
        };
        let text = encode_client(&frame).unwrap();
        let ClientFrame::Request { request_id, .. } = decode_client(&text).unwrap();
        prop_assert_eq!(request_id, id);
    }
}
