
mod glare;
mod messaging;
mod ordering;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::Level;

use trellis_core::Identity;
use trellis_engine::relay::InMemoryRelay;
use trellis_engine::session::{NegotiationState, SessionEvent, SessionEventKind};
use trellis_engine::{Engine, EngineConfig, EngineEvent, EngineHandle};

use crate::utils::{MockBehavior, MockFactory, MockHub};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub struct TestPeer {
    pub identity: Identity,
    pub handle: EngineHandle,
    pub events: mpsc::UnboundedReceiver<EngineEvent>,
}

/// One engine wired to the shared in-memory relay and mock transport hub.
pub fn spawn_peer(
    relay: &Arc<InMemoryRelay>,
    hub: &Arc<MockHub>,
    behavior: MockBehavior,
    config: EngineConfig,
    id: &str,
    nickname: &str,
) -> TestPeer {
    let identity = Identity::new(id, nickname);
    let transport = Arc::new(MockFactory::new(id, hub.clone()).with_behavior(behavior));
    let (handle, events) = Engine::spawn(config, relay.clone(), transport);
    TestPeer {
        identity,
        handle,
        events,
    }
}

pub async fn engine_event(rx: &mut mpsc::UnboundedReceiver<EngineEvent>) -> EngineEvent {
    // Generous ceiling: virtual-time tests auto-advance through it, and
    // the longest backoff gap under test is 16s.
    timeout(Duration::from_secs(30), rx.recv())
        .await
        .expect("timed out waiting for engine event")
        .expect("engine event stream closed")
}

/// Drain events until one matches; panics on timeout.
pub async fn wait_for(
    rx: &mut mpsc::UnboundedReceiver<EngineEvent>,
    mut want: impl FnMut(&EngineEvent) -> bool,
) -> EngineEvent {
    loop {
        let event = engine_event(rx).await;
        if want(&event) {
            return event;
        }
    }
}

pub async fn session_event(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    timeout(Duration::from_secs(30), rx.recv())
        .await
        .expect("timed out waiting for session event")
        .expect("session event stream closed")
}

/// Drain session events until the given negotiation state is reached,
/// returning everything seen along the way (the matching event included).
pub async fn wait_for_state(
    rx: &mut mpsc::UnboundedReceiver<SessionEvent>,
    state: NegotiationState,
) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    loop {
        let event = session_event(rx).await;
        let done = matches!(event.kind, SessionEventKind::StateChanged(s) if s == state);
        seen.push(event);
        if done {
            return seen;
        }
    }
}
