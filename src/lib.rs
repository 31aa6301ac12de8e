//! Client-side WebRTC dialer: drives one offer/answer round against a remote
//! peer through a single-shot HTTP signaling exchange.
//!
//! The pieces, leaf first: [`handle::ConnectionHandle`] wraps the peer
//! connection engine, [`negotiate::negotiate`] runs the strictly ordered
//! negotiation chain, [`signaling::HttpSignaling`] performs the one POST
//! round-trip, and [`session::SessionController`] owns start/stop and the
//! optional data side channel. State changes fan out to an
//! [`observer::ObservabilitySink`] for display; the core never waits on it.

pub mod config;
pub mod error;
pub mod handle;
pub mod negotiate;
pub mod observer;
pub mod session;
pub mod signaling;

pub use config::SessionConfig;
pub use error::{EngineError, NegotiateError, SessionError, SignalingError};
pub use handle::{
    ChannelState, ConnectionHandle, IceConnectionState, IceGatheringState, PeerHandle,
    SideChannel, SignalingState,
};
pub use negotiate::negotiate;
pub use observer::{LogSink, NullSink, ObservabilitySink};
pub use session::{PreOfferHook, SessionController};
pub use signaling::{HttpSignaling, SdpKind, SessionDescription, SignalingTransport};
