mod connector;
mod event;
mod webrtc;

pub use connector::{PeerTransport, TransportFactory};
pub use event::{LinkState, TransportEvent};
pub use webrtc::WebRtcFactory;
