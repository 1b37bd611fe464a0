// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ID buffer and typed-ID macro tests.

use crate::id::{IdBuf, ID_MAX_LEN};
use crate::{AgentId, StreamId, TerminalId};
use std::borrow::Borrow;
use std::collections::HashMap;

#[test]
fn generated_ids_carry_prefix_and_fit_buffer() {
    let agent = AgentId::new();
    assert!(agent.as_str().starts_with("agt-"));
    assert!(agent.as_str().len() <= ID_MAX_LEN);

    let term = TerminalId::new();
    assert!(term.as_str().starts_with("term-"));
    assert_eq!(term.as_str().len(), "term-".len() + 19);

    let stream = StreamId::new();
    assert!(stream.as_str().starts_with("stm-"));
}

#[test]
fn generated_ids_are_unique() {
    let a = AgentId::new();
    let b = AgentId::new();
    assert_ne!(a, b);
}

#[test]
fn suffix_strips_prefix() {
    let id = AgentId::from_string("agt-abc123");
    assert_eq!(id.suffix(), "abc123");

    // No prefix: suffix falls back to the whole string
    let odd = AgentId::from_string("plainstring");
    assert_eq!(odd.suffix(), "plainstring");
}

#[test]
fn idbuf_hash_matches_str_for_map_lookup() {
    let mut map: HashMap<AgentId, u32> = HashMap::new();
    let id = AgentId::from_string("agt-lookup");
    map.insert(id, 7);
    assert_eq!(map.get("agt-lookup"), Some(&7));
}

#[test]
fn idbuf_borrow_returns_active_bytes() {
    let buf = IdBuf::new("agt-x");
    let s: &str = buf.borrow();
    assert_eq!(s, "agt-x");
    assert!(!buf.is_empty());
    assert!(IdBuf::empty().is_empty());
}

#[test]
fn serde_roundtrip_is_transparent() {
    let id = AgentId::from_string("agt-serde");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"agt-serde\"");
    let back: AgentId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}

#[test]
fn deserialize_rejects_oversized_ids() {
    let long = format!("\"{}\"", "x".repeat(ID_MAX_LEN + 1));
    let result: Result<AgentId, _> = serde_json::from_str(&long);
    assert!(result.is_err());
}

#[test]
fn display_and_deref() {
    let id = TerminalId::from_string("term-shell");
    assert_eq!(format!("{}", id), "term-shell");
    assert_eq!(&*id, "term-shell");
    assert!(id == "term-shell");
}
