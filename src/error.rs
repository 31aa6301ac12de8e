use reqwest::StatusCode;
use thiserror::Error;

/// Opaque failure surfaced by the peer-connection engine. The engine's own
/// error type never crosses the trait seam; callers only see the rendered
/// message.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct EngineError(String);

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub(crate) fn to_engine_error<E: std::fmt::Display>(err: E) -> EngineError {
    EngineError::new(err.to_string())
}

/// Failure of the single signaling round-trip. One attempt only; there is no
/// retry path that would care about which variant it got.
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("signaling request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("signaling endpoint returned {0}")]
    Status(StatusCode),
    #[error("malformed signaling response: {0}")]
    Decode(#[source] serde_json::Error),
}

/// A failed step of the negotiation chain. Each variant names the step that
/// rejected; every later step never ran.
#[derive(Debug, Error)]
pub enum NegotiateError {
    #[error("offer creation rejected: {0}")]
    OfferCreation(#[source] EngineError),
    #[error("local description rejected: {0}")]
    LocalDescription(#[source] EngineError),
    #[error("signaling exchange failed: {0}")]
    Signaling(#[from] SignalingError),
    #[error("remote description rejected: {0}")]
    RemoteDescription(#[source] EngineError),
}

/// Session startup failure: the two setup steps that precede the negotiation
/// chain, plus the chain itself.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("side channel setup failed: {0}")]
    SideChannel(#[source] EngineError),
    #[error("pre-offer hook failed: {0}")]
    PreOffer(#[source] EngineError),
    #[error(transparent)]
    Negotiate(#[from] NegotiateError),
}
