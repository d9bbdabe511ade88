use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use trellis_core::PeerId;

use crate::error::Result;
use crate::transport::event::TransportEvent;

/// One point-to-point connection toward a single remote peer.
///
/// A link is single-use: a session that needs to renegotiate from scratch
/// closes the link and asks the factory for a new one.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Initiator path: create the data channel and a local offer, apply it
    /// as the local description, return the offer SDP.
    async fn create_offer(&self) -> Result<String>;

    /// Responder path: apply the remote offer, create an answer, apply it
    /// as the local description, return the answer SDP.
    async fn accept_offer(&self, sdp: String) -> Result<String>;

    /// Apply the remote answer to our outstanding offer.
    async fn apply_answer(&self, sdp: String) -> Result<()>;

    async fn add_remote_candidate(&self, candidate: String) -> Result<()>;

    /// Send over the data channel. Fails if the channel is not open.
    async fn send(&self, data: Bytes) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Creates peer links. Injected into the engine so tests can substitute a
/// scriptable transport.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Open a fresh link toward `peer_id`. Link-level events are delivered
    /// on `events` for the lifetime of the link.
    async fn open_link(
        &self,
        peer_id: PeerId,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn PeerTransport>>;
}
