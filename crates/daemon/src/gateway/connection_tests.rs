// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscription queue semantics: ordering, coalescing, exhaustion.

use super::*;
use crate::gateway::GatewayCtx;
use crate::manager::test_support::test_manager;
use crate::term::TerminalMux;
use paseo_core::{AgentStatus, AgentUpdate, TimelineEntry};

fn test_ctx() -> (Arc<GatewayCtx>, crate::manager::test_support::TestManager) {
    let t = test_manager();
    let ctx = Arc::new(GatewayCtx {
        manager: t.manager.clone(),
        term: TerminalMux::new(),
        server_id: "srv_test".to_string(),
        auth_token: None,
        shutdown: tokio_util::sync::CancellationToken::new(),
    });
    (ctx, t)
}

fn status_event(seq: u64, status: AgentStatus) -> Event {
    Event::AgentUpdate {
        agent_id: "agt-conn".into(),
        update: AgentUpdate {
            seq,
            at_ms: 0,
            entry: TimelineEntry::StatusChanged { status, stop_reason: None, error: None },
        },
    }
}

#[tokio::test]
async fn events_flow_in_order_through_the_queue() {
    let (ctx, _t) = test_ctx();
    let (session, mut outbound, _control) = test_session(ctx);

    let queue = session.bind("sub-1", Binding::Directory { manager_sub: 0 });
    for seq in 0..10 {
        queue.push(status_event(seq, AgentStatus::Ready));
    }

    for expected in 0..10u64 {
        let frame = outbound.recv().await.expect("frame");
        match frame {
            ServerFrame::Event { subscription_id, event: Event::AgentUpdate { update, .. } } => {
                assert_eq!(subscription_id, "sub-1");
                assert_eq!(update.seq, expected);
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}

#[tokio::test]
async fn overflow_of_identical_event_coalesces_silently() {
    let (ctx, _t) = test_ctx();
    let (session, _outbound, mut control) = test_session(ctx);

    // Nothing drains `_outbound`'s forwarder... the forwarder task copies
    // from the sub queue into outbound (cap 1024), so to overflow the sub
    // queue itself we must out-pace the forwarder with identical events.
    let queue = session.bind("sub-flood", Binding::Directory { manager_sub: 0 });
    let event = status_event(1, AgentStatus::Processing);
    for _ in 0..(SUBSCRIPTION_QUEUE_CAP * 4) {
        queue.push(event.clone());
    }

    // Identical consecutive events never trip exhaustion.
    assert!(control.try_recv().is_err());
}

#[tokio::test]
async fn overflow_of_distinct_events_reports_exhaustion() {
    let (ctx, _t) = test_ctx();
    let (session, outbound, mut control) = test_session(ctx);

    // Park the outbound receiver without draining so the forwarder stalls
    // and the sub queue fills with distinct events.
    let queue = session.bind("sub-burst", Binding::Directory { manager_sub: 0 });
    for seq in 0..((SUBSCRIPTION_QUEUE_CAP as u64) + OUTBOUND_CAP as u64 + 64) {
        queue.push(status_event(seq, AgentStatus::Processing));
    }

    match control.recv().await {
        Some(Control::Exhausted(id)) => assert_eq!(id, "sub-burst"),
        None => panic!("expected exhaustion control message"),
    }
    drop(outbound);
}

#[tokio::test]
async fn request_admission_caps_at_the_window_limit() {
    let (ctx, _t) = test_ctx();
    let (session, _outbound, _control) = test_session(ctx);

    for _ in 0..RATE_LIMIT_PER_SEC {
        assert!(session.admit_request());
    }
    assert!(!session.admit_request(), "burst above the window must be rejected");
    assert!(!session.admit_request());
}

#[tokio::test]
async fn unbind_releases_manager_subscription() {
    let (ctx, t) = test_ctx();
    let (session, _outbound, _control) = test_session(ctx);
    let id = t.create_default_agent().await;

    let queue = session.bind("sub-agent", Binding::Agent { agent_id: id, manager_sub: 0 });
    let manager_sub = {
        let queue = std::sync::Arc::clone(&queue);
        session
            .ctx
            .manager
            .subscribe_updates(&id, std::sync::Arc::new(move |u| {
                queue.push(Event::AgentUpdate { agent_id: id, update: u })
            }))
            .unwrap()
    };
    session.set_binding("sub-agent", Binding::Agent { agent_id: id, manager_sub });

    session.unbind("sub-agent");
    session.unbind("sub-agent"); // idempotent

    // After unbind the manager no longer holds the callback: a prompt
    // produces no frames for this subscription.
    t.adapter.push_turn(crate::acp::FakeTurn::text("quiet"));
    t.manager
        .send_prompt(&id, paseo_core::PromptContent::Text("x".to_string()), None, None)
        .await
        .unwrap();
    t.manager.wait_for_finish(&id, std::time::Duration::from_secs(2)).await.unwrap();
}
