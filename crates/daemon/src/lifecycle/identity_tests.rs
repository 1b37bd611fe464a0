// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn identity_is_created_once_and_stable_across_loads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("identity.json");

    let first = Identity::load_or_create(&path).unwrap();
    assert!(first.server_id.starts_with("srv_"));
    assert_ne!(first.public_key_b64, first.secret_key_b64);

    let second = Identity::load_or_create(&path).unwrap();
    assert_eq!(second.server_id, first.server_id);
    assert_eq!(second.public_key_b64, first.public_key_b64);
}

#[test]
fn malformed_identity_file_is_an_error_not_a_silent_regen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("identity.json");
    std::fs::write(&path, b"{broken").unwrap();

    assert!(matches!(
        Identity::load_or_create(&path),
        Err(IdentityError::Malformed(_))
    ));
}
