use std::sync::Arc;

use tokio::sync::mpsc;
use trellis_core::{Identity, PeerId, RoomId};
use trellis_engine::relay::{InMemoryRelay, RelayEvent, RelayStore};
use trellis_engine::session::{
    NegotiationState, PeerSession, Role, SessionCommand, SessionEventKind,
};

use crate::utils::{MockFactory, MockHub};
use crate::{init_tracing, wait_for_state};

/// Stand-in for each side's engine: forwards relay signals to whichever
/// session they are addressed to.
fn route_signals(
    mut relay_rx: mpsc::UnboundedReceiver<RelayEvent>,
    a: (PeerId, mpsc::UnboundedSender<SessionCommand>),
    b: (PeerId, mpsc::UnboundedSender<SessionCommand>),
) {
    tokio::spawn(async move {
        while let Some(event) = relay_rx.recv().await {
            if let RelayEvent::SignalAdded { signal, .. } = event {
                if signal.to == a.0 {
                    let _ = a.1.send(SessionCommand::Signal(signal));
                } else if signal.to == b.0 {
                    let _ = b.1.send(SessionCommand::Signal(signal));
                }
            }
        }
    });
}

/// Both sides offer at once. The side with the lesser id must concede,
/// answer the surviving offer, and both must end up connected.
#[tokio::test]
async fn simultaneous_offers_converge_on_one_connection() {
    init_tracing();
    let relay = Arc::new(InMemoryRelay::new());
    let hub = MockHub::new();
    let room = RoomId::from("glare");

    let polite = Identity::new("5", "alice");
    let impolite = Identity::new("9", "bob");

    let relay_rx = relay.subscribe(&room).await.unwrap();
    let relay_store: Arc<dyn RelayStore> = relay.clone();

    let (a_events_tx, mut a_events) = mpsc::unbounded_channel();
    let (b_events_tx, mut b_events) = mpsc::unbounded_channel();

    // Both sessions are told to initiate, which is exactly the collision
    // a reconnect race produces.
    let (a_tx, _a_task) = PeerSession::spawn(
        polite.clone(),
        impolite.id.clone(),
        room.clone(),
        Role::Initiator,
        0,
        relay_store.clone(),
        Arc::new(MockFactory::new("5", hub.clone())),
        a_events_tx,
    );
    let (b_tx, _b_task) = PeerSession::spawn(
        impolite.clone(),
        polite.id.clone(),
        room.clone(),
        Role::Initiator,
        0,
        relay_store,
        Arc::new(MockFactory::new("9", hub.clone())),
        b_events_tx,
    );

    route_signals(
        relay_rx,
        (polite.id.clone(), a_tx.clone()),
        (impolite.id.clone(), b_tx.clone()),
    );
    a_tx.send(SessionCommand::Initiate).unwrap();
    b_tx.send(SessionCommand::Initiate).unwrap();

    let a_seen = wait_for_state(&mut a_events, NegotiationState::Connected).await;
    let b_seen = wait_for_state(&mut b_events, NegotiationState::Connected).await;

    // The polite side abandoned its own offer and reopened as responder;
    // the impolite side's single link survived untouched.
    assert_eq!(hub.attempts(&polite.id, &impolite.id), 2);
    assert_eq!(hub.attempts(&impolite.id, &polite.id), 1);

    assert!(a_seen.iter().any(|e| matches!(
        e.kind,
        SessionEventKind::StateChanged(NegotiationState::Answering)
    )));
    assert!(!b_seen.iter().any(|e| matches!(
        e.kind,
        SessionEventKind::StateChanged(NegotiationState::Answering)
    )));
}
