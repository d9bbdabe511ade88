use std::sync::Arc;

use bytes::Bytes;
use trellis_core::{ChatMessage, PeerId, RoomId};
use trellis_engine::relay::InMemoryRelay;
use trellis_engine::{EngineConfig, EngineEvent};

use crate::utils::{MockBehavior, MockHub};
use crate::{TestPeer, init_tracing, spawn_peer, wait_for};

async fn connected_pair(
    relay: &Arc<InMemoryRelay>,
    hub: &Arc<MockHub>,
    room: &RoomId,
) -> (TestPeer, TestPeer) {
    let mut a = spawn_peer(
        relay,
        hub,
        MockBehavior::default(),
        EngineConfig::default(),
        "5",
        "alice",
    );
    let mut b = spawn_peer(
        relay,
        hub,
        MockBehavior::default(),
        EngineConfig::default(),
        "9",
        "bob",
    );
    a.handle.join_room(room.clone(), a.identity.clone()).await;
    b.handle.join_room(room.clone(), b.identity.clone()).await;
    wait_for(&mut a.events, |e| {
        matches!(e, EngineEvent::PeerConnected { .. })
    })
    .await;
    wait_for(&mut b.events, |e| {
        matches!(e, EngineEvent::PeerConnected { .. })
    })
    .await;
    (a, b)
}

async fn next_chat(peer: &mut TestPeer) -> (ChatMessage, bool) {
    let event = wait_for(&mut peer.events, |e| {
        matches!(e, EngineEvent::ChatMessage { .. })
    })
    .await;
    match event {
        EngineEvent::ChatMessage { message, is_self } => (message, is_self),
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn broadcast_reaches_peers_and_echoes_locally() {
    init_tracing();
    let relay = Arc::new(InMemoryRelay::new());
    let hub = MockHub::new();
    let room = RoomId::from("chat");
    let (mut a, mut b) = connected_pair(&relay, &hub, &room).await;

    a.handle.send_message("hello mesh").await;

    let (echo, is_self) = next_chat(&mut a).await;
    assert!(is_self);
    assert_eq!(echo.text, "hello mesh");
    assert_eq!(echo.from, PeerId::from("5"));
    assert_eq!(echo.nickname, "alice");

    let (delivered, is_self) = next_chat(&mut b).await;
    assert!(!is_self);
    assert_eq!(delivered.id, echo.id);
    assert_eq!(delivered.text, "hello mesh");
}

/// The same message id delivered twice is surfaced once; later traffic is
/// unaffected.
#[tokio::test]
async fn duplicate_inbound_is_suppressed() {
    init_tracing();
    let relay = Arc::new(InMemoryRelay::new());
    let hub = MockHub::new();
    let room = RoomId::from("dedup");
    let (mut a, b) = connected_pair(&relay, &hub, &room).await;

    let dup = ChatMessage::new(&b.identity, "dup");
    let payload = Bytes::from(serde_json::to_vec(&dup).unwrap());
    let (aid, bid) = (PeerId::from("5"), PeerId::from("9"));
    hub.inject_message(&aid, &bid, payload.clone());
    hub.inject_message(&aid, &bid, payload);
    b.handle.send_message("after").await;

    let (first, is_self) = next_chat(&mut a).await;
    assert!(!is_self);
    assert_eq!(first.id, dup.id);
    // The duplicate was swallowed, so the very next message is the marker.
    let (second, _) = next_chat(&mut a).await;
    assert_eq!(second.text, "after");
}

/// Garbage on the wire costs that message only, never the channel.
#[tokio::test]
async fn malformed_payload_is_dropped_channel_survives() {
    init_tracing();
    let relay = Arc::new(InMemoryRelay::new());
    let hub = MockHub::new();
    let room = RoomId::from("garbage");
    let (mut a, b) = connected_pair(&relay, &hub, &room).await;

    let (aid, bid) = (PeerId::from("5"), PeerId::from("9"));
    hub.inject_message(&aid, &bid, Bytes::from_static(b"not json at all"));
    b.handle.send_message("still alive").await;

    // The drop is surfaced as a tagged diagnostic...
    let error = wait_for(&mut a.events, |e| matches!(e, EngineEvent::Error { .. })).await;
    let EngineEvent::Error { kind, .. } = error else {
        unreachable!();
    };
    assert_eq!(kind, "malformed-message");

    // ...and the channel keeps delivering.
    let (message, is_self) = next_chat(&mut a).await;
    assert!(!is_self);
    assert_eq!(message.text, "still alive");
}
