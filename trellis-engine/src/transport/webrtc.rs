use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info};
use trellis_core::PeerId;
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

use crate::error::{EngineError, Result};
use crate::transport::connector::{PeerTransport, TransportFactory};
use crate::transport::event::{LinkState, TransportEvent};

const CHANNEL_LABEL: &str = "chat";

type ChannelSlot = Arc<Mutex<Option<Arc<RTCDataChannel>>>>;

/// Production [`TransportFactory`] backed by the `webrtc` crate.
pub struct WebRtcFactory {
    ice_servers: Vec<String>,
}

impl WebRtcFactory {
    pub fn new(ice_servers: Vec<String>) -> Self {
        Self { ice_servers }
    }
}

#[async_trait]
impl TransportFactory for WebRtcFactory {
    async fn open_link(
        &self,
        peer_id: PeerId,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn PeerTransport>> {
        let link = WebRtcLink::new(peer_id, self.ice_servers.clone(), events).await?;
        Ok(Box::new(link))
    }
}

/// One RTCPeerConnection plus its single data channel.
struct WebRtcLink {
    peer_id: PeerId,
    peer_connection: Arc<RTCPeerConnection>,
    channel: ChannelSlot,
    events: mpsc::Sender<TransportEvent>,
}

impl WebRtcLink {
    async fn new(
        peer_id: PeerId,
        ice_servers: Vec<String>,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Self> {
        let mut media = MediaEngine::default();
        media.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media)?;

        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: ice_servers,
                ..Default::default()
            }],
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await?);
        let channel: ChannelSlot = Arc::new(Mutex::new(None));

        // Aggregate connection state, forwarded verbatim; the session
        // decides what a Disconnected/Failed means for its lifecycle.
        let state_tx = events.clone();
        let state_peer = peer_id.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let tx = state_tx.clone();
                let peer = state_peer.clone();
                Box::pin(async move {
                    info!(%peer, state = ?s, "peer connection state changed");
                    let mapped = match s {
                        RTCPeerConnectionState::Connecting => LinkState::Connecting,
                        RTCPeerConnectionState::Connected => LinkState::Connected,
                        RTCPeerConnectionState::Disconnected => LinkState::Disconnected,
                        RTCPeerConnectionState::Failed => LinkState::Failed,
                        RTCPeerConnectionState::Closed => LinkState::Closed,
                        _ => LinkState::New,
                    };
                    let _ = tx.send(TransportEvent::ConnectionState(peer, mapped)).await;
                })
            },
        ));

        // Trickle ICE: hand locally gathered candidates to the session so
        // it can publish them through the relay.
        let ice_tx = events.clone();
        let ice_peer = peer_id.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();
            let peer = ice_peer.clone();
            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(json) = candidate.to_json() else {
                    return;
                };
                let Ok(serialized) = serde_json::to_string(&json) else {
                    return;
                };
                let _ = tx
                    .send(TransportEvent::CandidateGenerated(peer, serialized))
                    .await;
            })
        }));

        // Responder path: the initiator creates the channel, we receive it.
        let dc_tx = events.clone();
        let dc_peer = peer_id.clone();
        let dc_slot = channel.clone();
        peer_connection.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            let tx = dc_tx.clone();
            let peer = dc_peer.clone();
            let slot = dc_slot.clone();
            Box::pin(async move {
                debug!(%peer, label = dc.label(), "incoming data channel");
                wire_channel(peer, dc, &slot, &tx);
            })
        }));

        Ok(Self {
            peer_id,
            peer_connection,
            channel,
            events,
        })
    }
}

/// Install open/close/message handlers and remember the channel for sends.
fn wire_channel(
    peer_id: PeerId,
    dc: Arc<RTCDataChannel>,
    slot: &ChannelSlot,
    events: &mpsc::Sender<TransportEvent>,
) {
    *slot.lock().expect("channel slot poisoned") = Some(dc.clone());

    let open_tx = events.clone();
    let open_peer = peer_id.clone();
    dc.on_open(Box::new(move || {
        let tx = open_tx.clone();
        let peer = open_peer.clone();
        Box::pin(async move {
            info!(%peer, "data channel open");
            let _ = tx.send(TransportEvent::ChannelOpen(peer)).await;
        })
    }));

    let close_tx = events.clone();
    let close_peer = peer_id.clone();
    dc.on_close(Box::new(move || {
        let tx = close_tx.clone();
        let peer = close_peer.clone();
        Box::pin(async move {
            let _ = tx.send(TransportEvent::ChannelClosed(peer)).await;
        })
    }));

    let msg_tx = events.clone();
    let msg_peer = peer_id;
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let tx = msg_tx.clone();
        let peer = msg_peer.clone();
        Box::pin(async move {
            let bytes = Bytes::from(msg.data.to_vec());
            let _ = tx.send(TransportEvent::Message(peer, bytes)).await;
        })
    }));
}

#[async_trait]
impl PeerTransport for WebRtcLink {
    async fn create_offer(&self) -> Result<String> {
        let dc = self
            .peer_connection
            .create_data_channel(CHANNEL_LABEL, None)
            .await?;
        wire_channel(self.peer_id.clone(), dc, &self.channel, &self.events);

        let offer = self.peer_connection.create_offer(None).await?;
        self.peer_connection
            .set_local_description(offer.clone())
            .await?;
        Ok(offer.sdp)
    }

    async fn accept_offer(&self, sdp: String) -> Result<String> {
        let remote = RTCSessionDescription::offer(sdp)?;
        self.peer_connection.set_remote_description(remote).await?;

        let answer = self.peer_connection.create_answer(None).await?;
        self.peer_connection
            .set_local_description(answer.clone())
            .await?;
        Ok(answer.sdp)
    }

    async fn apply_answer(&self, sdp: String) -> Result<()> {
        let remote = RTCSessionDescription::answer(sdp)?;
        self.peer_connection.set_remote_description(remote).await?;
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: String) -> Result<()> {
        let init: RTCIceCandidateInit = serde_json::from_str(&candidate)
            .map_err(|e| EngineError::Negotiation(format!("bad ICE candidate: {e}")))?;
        self.peer_connection.add_ice_candidate(init).await?;
        Ok(())
    }

    async fn send(&self, data: Bytes) -> Result<()> {
        let dc = self
            .channel
            .lock()
            .expect("channel slot poisoned")
            .clone()
            .ok_or_else(|| EngineError::Transport("data channel not open".into()))?;
        dc.send(&data).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.peer_connection.close().await?;
        Ok(())
    }
}
