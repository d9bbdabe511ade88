use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use trellis_core::{Identity, PeerId, RoomId, SignalKind, SignalRecord};

use crate::error::{EngineError, Result};
use crate::relay::RelayStore;
use crate::session::state::{NegotiationState, Role, is_polite};
use crate::transport::{LinkState, PeerTransport, TransportEvent, TransportFactory};

/// Work items for one peer session. The session's mailbox is the signal
/// queue: commands are processed strictly in arrival order, one at a time.
#[derive(Debug)]
pub enum SessionCommand {
    /// Begin offer creation (Initiator side).
    Initiate,
    /// An inbound relay signal addressed to us from this peer.
    Signal(SignalRecord),
    /// Outbound chat payload for this peer's data channel.
    Send(Bytes),
    /// Tear the session down. The link is closed and the task exits.
    Close,
}

/// What a session reports back to the mesh engine.
#[derive(Debug)]
pub struct SessionEvent {
    pub peer_id: PeerId,
    /// Creation epoch of the emitting session. The engine discards events
    /// whose epoch does not match the live session for that peer.
    pub epoch: u64,
    pub kind: SessionEventKind,
}

#[derive(Debug)]
pub enum SessionEventKind {
    StateChanged(NegotiationState),
    ChannelOpen,
    ChannelClosed,
    /// Transport dropped outside of (re)negotiation; the reconnect
    /// supervisor decides whether to retry.
    LinkDown,
    /// Raw payload delivered over the data channel.
    Inbound(Bytes),
}

/// Per-peer negotiation actor.
///
/// Owns the negotiation state machine and the transport link for exactly
/// one remote peer. Sessions for different peers run independently; there
/// is no global negotiation lock.
pub struct PeerSession {
    local: Identity,
    remote: PeerId,
    room: RoomId,
    role: Role,
    polite: bool,
    epoch: u64,
    state: NegotiationState,
    link: Option<Box<dyn PeerTransport>>,
    have_remote_description: bool,
    channel_open: bool,
    relay: Arc<dyn RelayStore>,
    transport: Arc<dyn TransportFactory>,
    cmd_rx: mpsc::UnboundedReceiver<SessionCommand>,
    link_rx: mpsc::Receiver<TransportEvent>,
    link_tx: mpsc::Sender<TransportEvent>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl PeerSession {
    /// Create the session actor and its command queue. The queue is the
    /// per-peer signal FIFO: an answer can never be evaluated before the
    /// offer that produced it.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        local: Identity,
        remote: PeerId,
        room: RoomId,
        role: Role,
        epoch: u64,
        relay: Arc<dyn RelayStore>,
        transport: Arc<dyn TransportFactory>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> (mpsc::UnboundedSender<SessionCommand>, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (link_tx, link_rx) = mpsc::channel(64);
        let polite = is_polite(&local.id, &remote);
        let session = Self {
            local,
            remote,
            room,
            role,
            polite,
            epoch,
            state: NegotiationState::Idle,
            link: None,
            have_remote_description: false,
            channel_open: false,
            relay,
            transport,
            cmd_rx,
            link_rx,
            link_tx,
            events,
        };
        let task = tokio::spawn(session.run());
        (cmd_tx, task)
    }

    async fn run(mut self) {
        debug!(peer = %self.remote, role = ?self.role, polite = self.polite, "peer session started");
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    None | Some(SessionCommand::Close) => {
                        self.shutdown().await;
                        break;
                    }
                    Some(cmd) => {
                        // One signal failing must not stop the queue from
                        // draining the rest.
                        let negotiation = matches!(
                            &cmd,
                            SessionCommand::Initiate
                                | SessionCommand::Signal(SignalRecord {
                                    kind: SignalKind::Offer | SignalKind::Answer,
                                    ..
                                })
                        );
                        if let Err(e) = self.handle_command(cmd).await {
                            warn!(peer = %self.remote, error = %e, "signal processing error");
                            if negotiation {
                                self.fail_negotiation().await;
                            }
                        }
                    }
                },
                evt = self.link_rx.recv() => {
                    if let Some(evt) = evt {
                        self.handle_transport_event(evt).await;
                    }
                }
            }
        }
        debug!(peer = %self.remote, "peer session finished");
    }

    async fn handle_command(&mut self, cmd: SessionCommand) -> Result<()> {
        match cmd {
            SessionCommand::Initiate => self.start_offer().await,
            SessionCommand::Signal(signal) => match signal.kind {
                SignalKind::Offer => self.handle_offer(signal.payload).await,
                SignalKind::Answer => self.handle_answer(signal.payload).await,
                SignalKind::IceCandidate => self.handle_candidate(signal.payload).await,
            },
            SessionCommand::Send(data) => self.handle_send(data).await,
            // Close is intercepted in run() before dispatch.
            SessionCommand::Close => Ok(()),
        }
    }

    /// Initiator path: fresh link, local data channel and offer.
    async fn start_offer(&mut self) -> Result<()> {
        self.reset_link().await;
        let link = self.open_link().await?;
        let offer = link.create_offer().await?;
        self.link = Some(link);
        self.publish(SignalKind::Offer, offer).await?;
        self.set_state(NegotiationState::Offering);
        Ok(())
    }

    /// Remote offer, including the glare case where we have an offer of our
    /// own in flight.
    async fn handle_offer(&mut self, sdp: String) -> Result<()> {
        if self.state == NegotiationState::Offering {
            if !self.polite {
                // Impolite side of a collision: our own offer proceeds and
                // the peer is expected to concede.
                debug!(peer = %self.remote, "glare: ignoring remote offer");
                return Ok(());
            }
            debug!(peer = %self.remote, "glare: rolling back local offer");
        }

        // Accepting an offer always starts from a clean link: either we are
        // the plain responder (no link yet), the polite side conceding its
        // own offer, or the peer is renegotiating after a restart.
        self.reset_link().await;
        self.set_state(NegotiationState::Answering);

        let link = self.open_link().await?;
        let answer = link.accept_offer(sdp).await?;
        self.link = Some(link);
        self.have_remote_description = true;
        self.publish(SignalKind::Answer, answer).await?;
        self.set_state(NegotiationState::Stable);
        Ok(())
    }

    async fn handle_answer(&mut self, sdp: String) -> Result<()> {
        if self.state != NegotiationState::Offering {
            warn!(peer = %self.remote, state = ?self.state, "dropping stale answer");
            return Ok(());
        }
        let Some(link) = self.link.as_ref() else {
            return Err(EngineError::Negotiation("answer with no link".into()));
        };
        link.apply_answer(sdp).await?;
        self.have_remote_description = true;
        self.set_state(NegotiationState::Stable);
        Ok(())
    }

    async fn handle_candidate(&mut self, candidate: String) -> Result<()> {
        // Candidates arriving before the remote description are dropped,
        // not buffered. Under extreme reordering this can cost
        // connectivity; the reconnect supervisor papers over it.
        if !self.have_remote_description {
            warn!(peer = %self.remote, "dropping ICE candidate received before remote description");
            return Ok(());
        }
        let Some(link) = self.link.as_ref() else {
            warn!(peer = %self.remote, "dropping ICE candidate with no link");
            return Ok(());
        };
        link.add_remote_candidate(candidate).await
    }

    async fn handle_send(&mut self, data: Bytes) -> Result<()> {
        if !self.channel_open {
            debug!(peer = %self.remote, "dropping outbound payload, channel not open");
            return Ok(());
        }
        let Some(link) = self.link.as_ref() else {
            return Ok(());
        };
        link.send(data).await
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::ConnectionState(_, LinkState::Connected) => {
                self.set_state(NegotiationState::Connected);
            }
            TransportEvent::ConnectionState(_, LinkState::Disconnected | LinkState::Failed) => {
                if self.state.is_negotiating() {
                    debug!(peer = %self.remote, "link dropped mid-negotiation, signaling continues");
                } else if self.state != NegotiationState::Disconnected && !self.state.is_terminal()
                {
                    self.set_state(NegotiationState::Disconnected);
                    self.emit(SessionEventKind::LinkDown);
                }
            }
            TransportEvent::ConnectionState(_, _) => {}
            TransportEvent::ChannelOpen(_) => {
                self.channel_open = true;
                self.emit(SessionEventKind::ChannelOpen);
            }
            TransportEvent::ChannelClosed(_) => {
                self.channel_open = false;
                self.emit(SessionEventKind::ChannelClosed);
            }
            TransportEvent::Message(_, data) => {
                self.emit(SessionEventKind::Inbound(data));
            }
            TransportEvent::CandidateGenerated(_, candidate) => {
                if let Err(e) = self.publish(SignalKind::IceCandidate, candidate).await {
                    warn!(peer = %self.remote, error = %e, "failed to publish ICE candidate");
                }
            }
        }
    }

    async fn open_link(&self) -> Result<Box<dyn PeerTransport>> {
        self.transport
            .open_link(self.remote.clone(), self.link_tx.clone())
            .await
    }

    /// A failed offer/answer step leaves no usable link behind. Report it
    /// as a drop so the reconnect supervisor can schedule a fresh attempt
    /// instead of the session parking forever.
    async fn fail_negotiation(&mut self) {
        self.reset_link().await;
        if self.state != NegotiationState::Disconnected && !self.state.is_terminal() {
            self.set_state(NegotiationState::Disconnected);
            self.emit(SessionEventKind::LinkDown);
        }
    }

    /// Drop the current link, if any, and forget everything negotiated on it.
    async fn reset_link(&mut self) {
        if let Some(link) = self.link.take() {
            let _ = link.close().await;
        }
        self.have_remote_description = false;
        if self.channel_open {
            self.channel_open = false;
            self.emit(SessionEventKind::ChannelClosed);
        }
    }

    async fn publish(&self, kind: SignalKind, payload: String) -> Result<()> {
        let signal = SignalRecord::new(self.local.id.clone(), self.remote.clone(), kind, payload);
        self.relay.publish_signal(&self.room, signal).await?;
        Ok(())
    }

    fn set_state(&mut self, state: NegotiationState) {
        if self.state == state {
            return;
        }
        debug!(peer = %self.remote, from = ?self.state, to = ?state, "negotiation state");
        self.state = state;
        self.emit(SessionEventKind::StateChanged(state));
    }

    fn emit(&self, kind: SessionEventKind) {
        let _ = self.events.send(SessionEvent {
            peer_id: self.remote.clone(),
            epoch: self.epoch,
            kind,
        });
    }

    async fn shutdown(&mut self) {
        if let Some(link) = self.link.take() {
            let _ = link.close().await;
        }
        self.set_state(NegotiationState::Closed);
    }
}
