use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::SignalingError;

/// Which side of the offer/answer exchange a description belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
    Pranswer,
}

impl fmt::Display for SdpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdpKind::Offer => write!(f, "offer"),
            SdpKind::Answer => write!(f, "answer"),
            SdpKind::Pranswer => write!(f, "pranswer"),
        }
    }
}

/// Immutable offer/answer payload. Produced once per negotiation round and
/// replaced wholesale, never mutated. The wire field names are fixed by the
/// signaling contract: `sdp` and `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
    #[serde(rename = "type")]
    pub kind: SdpKind,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            kind: SdpKind::Offer,
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            kind: SdpKind::Answer,
        }
    }

    pub fn pranswer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            kind: SdpKind::Pranswer,
        }
    }
}

/// Request/response channel to the remote peer: one local description goes
/// out, one remote description comes back.
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    async fn exchange(
        &self,
        local: &SessionDescription,
    ) -> Result<SessionDescription, SignalingError>;
}

/// Single-shot HTTP signaling: POST the local description as JSON to one
/// endpoint and decode the peer's description from the response body. No
/// retry, no backoff; any non-success status or undecodable body surfaces as
/// a [`SignalingError`].
pub struct HttpSignaling {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpSignaling {
    pub fn new(endpoint: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl SignalingTransport for HttpSignaling {
    async fn exchange(
        &self,
        local: &SessionDescription,
    ) -> Result<SessionDescription, SignalingError> {
        debug!(
            target = "rtc_dialer::signaling",
            endpoint = %self.endpoint,
            kind = %local.kind,
            sdp_len = local.sdp.len(),
            "posting local description"
        );
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(local)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SignalingError::Status(status));
        }
        let body = response.bytes().await?;
        let remote: SessionDescription =
            serde_json::from_slice(&body).map_err(SignalingError::Decode)?;
        debug!(
            target = "rtc_dialer::signaling",
            kind = %remote.kind,
            sdp_len = remote.sdp.len(),
            "received remote description"
        );
        Ok(remote)
    }
}
