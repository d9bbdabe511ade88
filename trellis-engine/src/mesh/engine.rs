use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use trellis_core::{
    ChatMessage, Identity, MemberRecord, PeerId, RoomId, SignalKind, SignalRecord, now_millis,
};
use uuid::Uuid;

use crate::command::{EngineCommand, EngineStatus};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::event::EngineEvent;
use crate::mesh::handle::EngineHandle;
use crate::relay::{RelayEvent, RelayStore};
use crate::session::{
    NegotiationState, PeerSession, Role, SessionCommand, SessionEvent, SessionEventKind,
};
use crate::transport::TransportFactory;

/// Engine-side view of one peer session. The engine exclusively owns the
/// peer map; sessions never see each other.
struct PeerHandle {
    session_tx: mpsc::UnboundedSender<SessionCommand>,
    /// Matches the epoch baked into the session at creation; events and
    /// retry timers carrying another epoch are stale and ignored.
    epoch: u64,
    retry_count: u32,
    channel_open: bool,
}

/// State that exists only while the engine is a member of a room.
struct ActiveRoom {
    room_id: RoomId,
    self_record: MemberRecord,
    /// Remote members as observed through the relay.
    members: HashMap<PeerId, MemberRecord>,
    peers: HashMap<PeerId, PeerHandle>,
    relay_rx: mpsc::UnboundedReceiver<RelayEvent>,
    /// Message ids already delivered to the consumer. Unbounded by design;
    /// scoped to this membership and dropped on leave.
    seen_messages: HashSet<Uuid>,
}

/// Completion of a scheduled reconnect delay.
struct RetryTick {
    peer_id: PeerId,
    epoch: u64,
}

/// The mesh engine actor: room membership, the peer-session collection,
/// signal routing, reconnect supervision and chat broadcast all live here,
/// serialized on one task.
pub struct Engine {
    config: EngineConfig,
    relay: Arc<dyn RelayStore>,
    transport: Arc<dyn TransportFactory>,
    identity: Option<Identity>,
    room: Option<ActiveRoom>,
    next_epoch: u64,
    cmd_rx: mpsc::Receiver<EngineCommand>,
    session_tx: mpsc::UnboundedSender<SessionEvent>,
    session_rx: mpsc::UnboundedReceiver<SessionEvent>,
    timer_tx: mpsc::UnboundedSender<RetryTick>,
    timer_rx: mpsc::UnboundedReceiver<RetryTick>,
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        relay: Arc<dyn RelayStore>,
        transport: Arc<dyn TransportFactory>,
        cmd_rx: mpsc::Receiver<EngineCommand>,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Self {
        let (session_tx, session_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        Self {
            config,
            relay,
            transport,
            identity: None,
            room: None,
            next_epoch: 0,
            cmd_rx,
            session_tx,
            session_rx,
            timer_tx,
            timer_rx,
            events,
        }
    }

    /// Convenience constructor: wire the channels, spawn the actor, return
    /// the command handle and the event stream.
    pub fn spawn(
        config: EngineConfig,
        relay: Arc<dyn RelayStore>,
        transport: Arc<dyn TransportFactory>,
    ) -> (EngineHandle, mpsc::UnboundedReceiver<EngineEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(100);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let engine = Engine::new(config, relay, transport, cmd_rx, event_tx);
        tokio::spawn(engine.run());
        (EngineHandle::new(cmd_tx), event_rx)
    }

    pub async fn run(mut self) {
        info!("engine event loop started");
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        info!("command channel closed, shutting down");
                        self.leave_room().await;
                        break;
                    }
                },
                maybe = Self::next_relay_event(&mut self.room) => match maybe {
                    Some(event) => self.handle_relay_event(event).await,
                    None => {
                        warn!("relay event feed closed");
                        self.emit(EngineEvent::Error {
                            kind: "relay",
                            detail: "relay event feed closed".into(),
                        });
                        self.leave_room().await;
                    }
                },
                event = self.session_rx.recv() => {
                    if let Some(event) = event {
                        self.handle_session_event(event).await;
                    }
                },
                tick = self.timer_rx.recv() => {
                    if let Some(tick) = tick {
                        self.handle_retry(tick).await;
                    }
                },
            }
        }
        info!("engine event loop finished");
    }

    /// Pending forever while not in a room, so the select loop only
    /// watches the relay during an active membership.
    async fn next_relay_event(room: &mut Option<ActiveRoom>) -> Option<RelayEvent> {
        match room.as_mut() {
            Some(room) => room.relay_rx.recv().await,
            None => std::future::pending().await,
        }
    }

    async fn handle_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::JoinRoom { room_id, identity } => {
                self.join_room(room_id, identity).await;
            }
            EngineCommand::LeaveRoom => self.leave_room().await,
            EngineCommand::SendMessage { text } => self.broadcast(text).await,
            EngineCommand::GetStatus { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }

    // ------------------------------------------------------------------
    // Room membership
    // ------------------------------------------------------------------

    async fn join_room(&mut self, room_id: RoomId, identity: Identity) {
        // Capacity is verified before anything else: a refused join must
        // leave no trace in the relay and the current membership, if any,
        // stays intact.
        match self.relay.member_count(&room_id).await {
            Ok(count) if count >= self.config.max_members => {
                info!(room = %room_id, count, "join refused, room at capacity");
                self.emit(EngineEvent::RoomFull {
                    room_id,
                    capacity: self.config.max_members,
                });
                return;
            }
            Ok(_) => {}
            Err(e) => {
                self.surface_error(&e);
                return;
            }
        }

        // The old membership must be observably gone before the new one
        // starts negotiating, or signals would bleed between rooms.
        self.leave_room().await;

        // Subscribe before registering so no membership event is missed;
        // our own presence echo is filtered on receipt.
        let relay_rx = match self.relay.subscribe(&room_id).await {
            Ok(rx) => rx,
            Err(e) => {
                self.surface_error(&e);
                return;
            }
        };

        let self_record = MemberRecord {
            id: identity.id.clone(),
            nickname: identity.nickname.clone(),
            email: identity.email.clone(),
            joined_at: now_millis(),
        };
        if let Err(e) = self
            .relay
            .register_presence(&room_id, self_record.clone())
            .await
        {
            self.surface_error(&e);
            return;
        }

        info!(room = %room_id, id = %identity.id, "joined room");
        self.identity = Some(identity);
        self.room = Some(ActiveRoom {
            room_id: room_id.clone(),
            self_record,
            members: HashMap::new(),
            peers: HashMap::new(),
            relay_rx,
            seen_messages: HashSet::new(),
        });
        self.emit(EngineEvent::RoomJoined { room_id });
    }

    /// Idempotent. Closes every peer session and invalidates pending
    /// retry timers (their epochs no longer match anything).
    async fn leave_room(&mut self) {
        let Some(mut room) = self.room.take() else {
            return;
        };
        info!(room = %room.room_id, "leaving room");
        for (peer_id, handle) in room.peers.drain() {
            let _ = handle.session_tx.send(SessionCommand::Close);
            debug!(peer = %peer_id, "peer session closed");
        }
        if let Some(identity) = &self.identity {
            if let Err(e) = self
                .relay
                .remove_presence(&room.room_id, &identity.id)
                .await
            {
                self.surface_error(&e);
            }
        }
        self.emit(EngineEvent::RoomLeft {
            room_id: room.room_id,
        });
    }

    // ------------------------------------------------------------------
    // Relay events: membership changes and inbound signals
    // ------------------------------------------------------------------

    async fn handle_relay_event(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::MemberAdded(member) => self.on_member_joined(member),
            RelayEvent::MemberRemoved(peer_id) => self.on_member_left(peer_id),
            RelayEvent::SignalAdded { key, signal } => self.on_signal(key, signal).await,
        }
    }

    fn on_member_joined(&mut self, member: MemberRecord) {
        let Some(identity) = self.identity.clone() else {
            return;
        };
        if member.id == identity.id {
            return; // our own presence echo
        }
        let Some(room) = self.room.as_mut() else {
            return;
        };
        let peer_id = member.id.clone();
        let is_new_member = room.members.insert(peer_id.clone(), member.clone()).is_none();
        let has_session = room.peers.contains_key(&peer_id);
        if is_new_member {
            self.emit(EngineEvent::UserJoined { member });
        }
        if has_session {
            debug!(peer = %peer_id, "session already exists, membership event ignored");
            return;
        }
        let role = Role::of(&identity.id, &peer_id);
        self.create_session(peer_id, role, 0);
    }

    fn on_member_left(&mut self, peer_id: PeerId) {
        if self.identity.as_ref().is_some_and(|i| i.id == peer_id) {
            warn!("relay reports our own membership removed");
            return;
        }
        let Some(room) = self.room.as_mut() else {
            return;
        };
        let was_member = room.members.remove(&peer_id).is_some();
        if let Some(handle) = room.peers.remove(&peer_id) {
            let _ = handle.session_tx.send(SessionCommand::Close);
            debug!(peer = %peer_id, "peer session destroyed on member-left");
        }
        if was_member {
            self.emit(EngineEvent::UserLeft { peer_id });
        }
    }

    async fn on_signal(&mut self, key: String, signal: SignalRecord) {
        let Some(identity) = self.identity.clone() else {
            return;
        };
        if signal.to != identity.id {
            return; // addressed to someone else; leave it in the relay
        }
        let Some(room_id) = self.room.as_ref().map(|r| r.room_id.clone()) else {
            return;
        };
        // Consume-once: the intended recipient deletes the signal.
        if let Err(e) = self.relay.remove_signal(&room_id, &key).await {
            self.surface_error(&e);
        }

        let from = signal.from.clone();
        let has_session = self
            .room
            .as_ref()
            .is_some_and(|r| r.peers.contains_key(&from));
        if !has_session {
            if signal.kind == SignalKind::Offer {
                // The peer started negotiating before we observed its
                // membership event. Answer as the responder.
                debug!(peer = %from, "offer from unknown peer, creating responder session");
                self.create_session(from.clone(), Role::Responder, 0);
            } else {
                warn!(peer = %from, kind = ?signal.kind, "dropping unroutable signal");
                return;
            }
        }
        if let Some(room) = self.room.as_mut() {
            if let Some(handle) = room.peers.get(&from) {
                let _ = handle.session_tx.send(SessionCommand::Signal(signal));
            }
        }
    }

    // ------------------------------------------------------------------
    // Peer sessions
    // ------------------------------------------------------------------

    fn create_session(&mut self, peer_id: PeerId, role: Role, retry_count: u32) {
        let Some(identity) = self.identity.clone() else {
            return;
        };
        let epoch = self.next_epoch;
        self.next_epoch += 1;
        let Some(room) = self.room.as_mut() else {
            return;
        };
        let (session_tx, _task) = PeerSession::spawn(
            identity,
            peer_id.clone(),
            room.room_id.clone(),
            role,
            epoch,
            Arc::clone(&self.relay),
            Arc::clone(&self.transport),
            self.session_tx.clone(),
        );
        if role == Role::Initiator {
            let _ = session_tx.send(SessionCommand::Initiate);
        }
        debug!(peer = %peer_id, ?role, epoch, "peer session created");
        room.peers.insert(
            peer_id,
            PeerHandle {
                session_tx,
                epoch,
                retry_count,
                channel_open: false,
            },
        );
    }

    async fn handle_session_event(&mut self, event: SessionEvent) {
        let SessionEvent {
            peer_id,
            epoch,
            kind,
        } = event;
        {
            let Some(room) = self.room.as_mut() else {
                return;
            };
            let Some(handle) = room.peers.get_mut(&peer_id) else {
                debug!(peer = %peer_id, "event from departed session dropped");
                return;
            };
            if handle.epoch != epoch {
                debug!(peer = %peer_id, "event from stale session dropped");
                return;
            }
            match &kind {
                SessionEventKind::ChannelOpen => {
                    handle.channel_open = true;
                    // A successful connection forgives prior failures.
                    handle.retry_count = 0;
                }
                SessionEventKind::ChannelClosed => handle.channel_open = false,
                _ => {}
            }
        }
        match kind {
            SessionEventKind::StateChanged(state) => {
                if state == NegotiationState::Connected {
                    self.emit(EngineEvent::PeerConnected {
                        peer_id: peer_id.clone(),
                    });
                }
                self.emit(EngineEvent::PeerStateChange { peer_id, state });
            }
            SessionEventKind::LinkDown => self.supervise_reconnect(peer_id),
            SessionEventKind::Inbound(data) => self.on_inbound(peer_id, data),
            SessionEventKind::ChannelOpen | SessionEventKind::ChannelClosed => {}
        }
    }

    // ------------------------------------------------------------------
    // Reconnect supervision
    // ------------------------------------------------------------------

    fn supervise_reconnect(&mut self, peer_id: PeerId) {
        let max_retries = self.config.max_retries;
        let Some(room) = self.room.as_mut() else {
            return;
        };
        if !room.members.contains_key(&peer_id) {
            // The peer already left; no point chasing it.
            if let Some(handle) = room.peers.remove(&peer_id) {
                let _ = handle.session_tx.send(SessionCommand::Close);
            }
            return;
        }
        let Some(handle) = room.peers.get_mut(&peer_id) else {
            return;
        };
        if handle.retry_count >= max_retries {
            warn!(peer = %peer_id, retries = handle.retry_count, "retry budget exhausted, peer failed");
            if let Some(handle) = room.peers.remove(&peer_id) {
                let _ = handle.session_tx.send(SessionCommand::Close);
            }
            self.emit(EngineEvent::PeerStateChange {
                peer_id,
                state: NegotiationState::Failed,
            });
            return;
        }
        let delay = self.config.backoff_delay(handle.retry_count);
        handle.retry_count += 1;
        let epoch = handle.epoch;
        debug!(peer = %peer_id, ?delay, attempt = handle.retry_count, "reconnect scheduled");
        let timer_tx = self.timer_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = timer_tx.send(RetryTick { peer_id, epoch });
        });
    }

    async fn handle_retry(&mut self, tick: RetryTick) {
        let RetryTick { peer_id, epoch } = tick;
        // An already-fired timer cannot be cancelled, so liveness is
        // re-verified here instead.
        let Some(identity) = self.identity.clone() else {
            return;
        };
        let Some(room) = self.room.as_mut() else {
            debug!(peer = %peer_id, "stale retry: no active room");
            return;
        };
        if !room.members.contains_key(&peer_id) {
            debug!(peer = %peer_id, "stale retry: member gone");
            return;
        }
        let Some(handle) = room.peers.get(&peer_id) else {
            debug!(peer = %peer_id, "stale retry: session gone");
            return;
        };
        if handle.epoch != epoch {
            debug!(peer = %peer_id, "stale retry: session replaced");
            return;
        }
        let retry_count = handle.retry_count;
        if let Some(old) = room.peers.remove(&peer_id) {
            let _ = old.session_tx.send(SessionCommand::Close);
        }
        let role = Role::of(&identity.id, &peer_id);
        info!(peer = %peer_id, attempt = retry_count, "reconnecting peer");
        self.create_session(peer_id, role, retry_count);
    }

    // ------------------------------------------------------------------
    // Chat broadcast and delivery
    // ------------------------------------------------------------------

    async fn broadcast(&mut self, text: String) {
        let Some(identity) = self.identity.clone() else {
            warn!("SendMessage before any join, dropped");
            return;
        };
        let Some(room) = self.room.as_mut() else {
            warn!("SendMessage outside a room, dropped");
            return;
        };
        let message = ChatMessage::new(&identity, text);
        let payload = match serde_json::to_vec(&message) {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                warn!(error = %e, "failed to encode chat message");
                return;
            }
        };
        // Remember our own id so echoes bounced back by peers are not
        // delivered twice.
        room.seen_messages.insert(message.id);
        let mut sent = 0usize;
        let peer_ids: Vec<PeerId> = room.peers.keys().cloned().collect();
        for peer_id in peer_ids {
            if Self::send_to(room, &peer_id, payload.clone()) {
                sent += 1;
            }
        }
        debug!(id = %message.id, sent, "chat message broadcast");
        // The local echo shares the delivery path with remote messages.
        self.emit(EngineEvent::ChatMessage {
            message,
            is_self: true,
        });
    }

    /// Unicast over one peer's channel; false when the channel is not open.
    fn send_to(room: &ActiveRoom, peer_id: &PeerId, payload: Bytes) -> bool {
        let Some(handle) = room.peers.get(peer_id) else {
            return false;
        };
        if !handle.channel_open {
            return false;
        }
        handle
            .session_tx
            .send(SessionCommand::Send(payload))
            .is_ok()
    }

    fn on_inbound(&mut self, peer_id: PeerId, data: Bytes) {
        if self.room.is_none() {
            return;
        }
        let message: ChatMessage = match serde_json::from_slice(&data) {
            Ok(message) => message,
            Err(e) => {
                // Costs one message, never the channel.
                self.surface_error(&EngineError::MalformedMessage(format!(
                    "from {peer_id}: {e}"
                )));
                return;
            }
        };
        let Some(room) = self.room.as_mut() else {
            return;
        };
        if !room.seen_messages.insert(message.id) {
            debug!(id = %message.id, "duplicate message suppressed");
            return;
        }
        self.emit(EngineEvent::ChatMessage {
            message,
            is_self: false,
        });
    }

    // ------------------------------------------------------------------
    // Status and plumbing
    // ------------------------------------------------------------------

    fn status(&self) -> EngineStatus {
        let mut members = Vec::new();
        if let Some(room) = &self.room {
            members.push(room.self_record.clone());
            members.extend(room.members.values().cloned());
        }
        EngineStatus {
            room_id: self.room.as_ref().map(|r| r.room_id.clone()),
            identity: self.identity.clone(),
            members,
            connected: self.room.is_some(),
        }
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    fn surface_error(&self, error: &EngineError) {
        warn!(error = %error, "engine error");
        self.emit(EngineEvent::Error {
            kind: error.kind(),
            detail: error.to_string(),
        });
    }
}
