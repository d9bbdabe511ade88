use bytes::Bytes;
use trellis_core::PeerId;

/// Aggregate connection state of one peer link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Events a peer link feeds back into its session's event channel.
#[derive(Debug)]
pub enum TransportEvent {
    ConnectionState(PeerId, LinkState),
    ChannelOpen(PeerId),
    ChannelClosed(PeerId),
    Message(PeerId, Bytes),
    /// Locally gathered ICE candidate, serialized, ready to be signalled.
    CandidateGenerated(PeerId, String),
}
