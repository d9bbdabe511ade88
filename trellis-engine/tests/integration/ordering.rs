use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use trellis_core::{Identity, PeerId, RoomId, SignalKind, SignalRecord};
use trellis_engine::relay::InMemoryRelay;
use trellis_engine::session::{
    NegotiationState, PeerSession, Role, SessionCommand, SessionEvent, SessionEventKind,
};

use crate::utils::{MockBehavior, MockFactory, MockHub};
use crate::{init_tracing, wait_for_state};

fn signal(from: &PeerId, to: &PeerId, kind: SignalKind, payload: &str) -> SignalRecord {
    SignalRecord::new(from.clone(), to.clone(), kind, payload.to_owned())
}

/// Poll until the link's call log has grown to `want` entries; the session
/// drains its queue concurrently with the test body.
async fn drain_log(hub: &MockHub, owner: &PeerId, remote: &PeerId, want: usize) -> Vec<String> {
    for _ in 0..200 {
        let log = hub.log_for(owner, remote);
        if log.len() >= want {
            return log;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    hub.log_for(owner, remote)
}

fn spawn_responder(
    relay: &Arc<InMemoryRelay>,
    hub: &Arc<MockHub>,
    behavior: MockBehavior,
    room: &RoomId,
    local: &Identity,
    remote: &PeerId,
) -> (
    mpsc::UnboundedSender<SessionCommand>,
    mpsc::UnboundedReceiver<SessionEvent>,
) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (tx, _task) = PeerSession::spawn(
        local.clone(),
        remote.clone(),
        room.clone(),
        Role::Responder,
        0,
        relay.clone(),
        Arc::new(MockFactory::new(local.id.clone(), hub.clone()).with_behavior(behavior)),
        events_tx,
    );
    (tx, events_rx)
}

/// A burst of candidates queued behind a slow offer must still be applied
/// after it, in arrival order.
#[tokio::test(start_paused = true)]
async fn signals_apply_in_strict_arrival_order() {
    init_tracing();
    let relay = Arc::new(InMemoryRelay::new());
    let hub = MockHub::new();
    let room = RoomId::from("fifo");
    let local = Identity::new("5", "alice");
    let remote = PeerId::from("9");

    let behavior = MockBehavior {
        accept_delay: Duration::from_millis(200),
        ..Default::default()
    };
    let (tx, mut events) = spawn_responder(&relay, &hub, behavior, &room, &local, &remote);

    tx.send(SessionCommand::Signal(signal(
        &remote,
        &local.id,
        SignalKind::Offer,
        "offer-1",
    )))
    .unwrap();
    for c in ["c1", "c2", "c3"] {
        tx.send(SessionCommand::Signal(signal(
            &remote,
            &local.id,
            SignalKind::IceCandidate,
            c,
        )))
        .unwrap();
    }

    wait_for_state(&mut events, NegotiationState::Stable).await;
    let log = drain_log(&hub, &local.id, &remote, 4).await;
    assert_eq!(
        log,
        vec![
            "accept_offer:offer-1",
            "candidate:c1",
            "candidate:c2",
            "candidate:c3"
        ]
    );
}

/// A candidate that arrives before any remote description is dropped, not
/// buffered for later.
#[tokio::test(start_paused = true)]
async fn early_candidates_are_dropped_not_buffered() {
    init_tracing();
    let relay = Arc::new(InMemoryRelay::new());
    let hub = MockHub::new();
    let room = RoomId::from("early");
    let local = Identity::new("5", "alice");
    let remote = PeerId::from("9");

    let (tx, mut events) =
        spawn_responder(&relay, &hub, MockBehavior::default(), &room, &local, &remote);

    tx.send(SessionCommand::Signal(signal(
        &remote,
        &local.id,
        SignalKind::IceCandidate,
        "early",
    )))
    .unwrap();
    tx.send(SessionCommand::Signal(signal(
        &remote,
        &local.id,
        SignalKind::Offer,
        "offer-1",
    )))
    .unwrap();
    tx.send(SessionCommand::Signal(signal(
        &remote,
        &local.id,
        SignalKind::IceCandidate,
        "late",
    )))
    .unwrap();

    wait_for_state(&mut events, NegotiationState::Stable).await;
    let log = drain_log(&hub, &local.id, &remote, 2).await;
    assert_eq!(log, vec!["accept_offer:offer-1", "candidate:late"]);
}

/// An answer with no outstanding offer is dropped without advancing the
/// state machine or touching the link.
#[tokio::test(start_paused = true)]
async fn stale_answer_is_ignored() {
    init_tracing();
    let relay = Arc::new(InMemoryRelay::new());
    let hub = MockHub::new();
    let room = RoomId::from("stale");
    let local = Identity::new("5", "alice");
    let remote = PeerId::from("9");

    let (tx, mut events) =
        spawn_responder(&relay, &hub, MockBehavior::default(), &room, &local, &remote);

    tx.send(SessionCommand::Signal(signal(
        &remote,
        &local.id,
        SignalKind::Answer,
        "answer-0",
    )))
    .unwrap();
    tx.send(SessionCommand::Signal(signal(
        &remote,
        &local.id,
        SignalKind::Offer,
        "offer-1",
    )))
    .unwrap();

    let seen = wait_for_state(&mut events, NegotiationState::Stable).await;
    // First observable transition is the offer being answered, proving the
    // stray answer changed nothing.
    let first = seen.iter().find_map(|e| match e.kind {
        SessionEventKind::StateChanged(s) => Some(s),
        _ => None,
    });
    assert_eq!(first, Some(NegotiationState::Answering));
    assert!(
        hub.log_for(&local.id, &remote)
            .iter()
            .all(|line| !line.starts_with("apply_answer"))
    );
}
