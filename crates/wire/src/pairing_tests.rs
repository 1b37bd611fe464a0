// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn v2_offer() -> PairingOffer {
    PairingOffer {
        v: 2,
        server_id: "srv_abc123".to_string(),
        daemon_public_key_b64: "cHVibGlja2V5".to_string(),
        relay: RelayHint { endpoint: "relay.paseo.sh:443".to_string() },
        session_id: None,
        endpoints: vec![],
    }
}

#[test]
fn url_round_trip() {
    let offer = v2_offer();
    let url = offer.to_url("app.paseo.sh").unwrap();
    assert!(url.starts_with("https://app.paseo.sh/#offer="));

    let parsed = PairingOffer::parse_url(&url).unwrap();
    assert_eq!(parsed, offer);
}

#[test]
fn v1_offers_carry_session_and_endpoints() {
    let offer = PairingOffer {
        v: 1,
        session_id: Some("pair-sess".to_string()),
        endpoints: vec!["192.168.1.10:6767".to_string(), "10.0.0.3:6767".to_string()],
        ..v2_offer()
    };
    let url = offer.to_url("app.paseo.sh").unwrap();
    let parsed = PairingOffer::parse_url(&url).unwrap();
    assert_eq!(parsed.session_id.as_deref(), Some("pair-sess"));
    assert_eq!(parsed.endpoints.len(), 2);
    assert_eq!(parsed.relay.endpoint, "relay.paseo.sh:443");
}

#[test]
fn unknown_fields_are_tolerated() {
    let json = serde_json::json!({
        "v": 2,
        "serverId": "srv_x",
        "daemonPublicKeyB64": "a2V5",
        "relay": { "endpoint": "relay.paseo.sh:443" },
        "futureHint": { "ignored": true },
    });
    let fragment = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .encode(serde_json::to_vec(&json).unwrap());
    let offer = PairingOffer::parse_fragment(&fragment).unwrap();
    assert_eq!(offer.server_id, "srv_x");
}

#[test]
fn bad_inputs_are_typed_errors() {
    assert!(matches!(
        PairingOffer::parse_url("https://app.paseo.sh/"),
        Err(PairingError::MissingFragment)
    ));
    assert!(matches!(
        PairingOffer::parse_fragment("!!!"),
        Err(PairingError::Base64(_))
    ));

    let v9 = serde_json::json!({
        "v": 9, "serverId": "s", "daemonPublicKeyB64": "k",
        "relay": { "endpoint": "e" },
    });
    let fragment = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .encode(serde_json::to_vec(&v9).unwrap());
    assert!(matches!(
        PairingOffer::parse_fragment(&fragment),
        Err(PairingError::UnsupportedVersion(9))
    ));
}
