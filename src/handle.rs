use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;
use webrtc::api::APIBuilder;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_gathering_state::RTCIceGatheringState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;

use crate::error::{EngineError, to_engine_error};
use crate::observer::ObservabilitySink;
use crate::signaling::{SdpKind, SessionDescription};

/// Candidate-discovery progress of the underlying connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceGatheringState {
    New,
    Gathering,
    Complete,
}

impl fmt::Display for IceGatheringState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IceGatheringState::New => write!(f, "new"),
            IceGatheringState::Gathering => write!(f, "gathering"),
            IceGatheringState::Complete => write!(f, "complete"),
        }
    }
}

/// Transport connectivity of the underlying connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Failed,
    Disconnected,
    Closed,
}

impl fmt::Display for IceConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IceConnectionState::New => "new",
            IceConnectionState::Checking => "checking",
            IceConnectionState::Connected => "connected",
            IceConnectionState::Completed => "completed",
            IceConnectionState::Failed => "failed",
            IceConnectionState::Disconnected => "disconnected",
            IceConnectionState::Closed => "closed",
        };
        write!(f, "{name}")
    }
}

/// Progress through the offer/answer exchange, independent of connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    HaveLocalPranswer,
    HaveRemotePranswer,
    Closed,
}

impl fmt::Display for SignalingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalingState::Stable => "stable",
            SignalingState::HaveLocalOffer => "have-local-offer",
            SignalingState::HaveRemoteOffer => "have-remote-offer",
            SignalingState::HaveLocalPranswer => "have-local-pranswer",
            SignalingState::HaveRemotePranswer => "have-remote-pranswer",
            SignalingState::Closed => "closed",
        };
        write!(f, "{name}")
    }
}

/// Lifecycle of a data side channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
}

impl From<RTCIceGatheringState> for IceGatheringState {
    fn from(state: RTCIceGatheringState) -> Self {
        match state {
            RTCIceGatheringState::Gathering => IceGatheringState::Gathering,
            RTCIceGatheringState::Complete => IceGatheringState::Complete,
            RTCIceGatheringState::New | RTCIceGatheringState::Unspecified => IceGatheringState::New,
        }
    }
}

impl From<RTCIceGathererState> for IceGatheringState {
    fn from(state: RTCIceGathererState) -> Self {
        match state {
            RTCIceGathererState::Gathering => IceGatheringState::Gathering,
            RTCIceGathererState::Complete => IceGatheringState::Complete,
            RTCIceGathererState::New
            | RTCIceGathererState::Closed
            | RTCIceGathererState::Unspecified => IceGatheringState::New,
        }
    }
}

impl From<RTCIceConnectionState> for IceConnectionState {
    fn from(state: RTCIceConnectionState) -> Self {
        match state {
            RTCIceConnectionState::Checking => IceConnectionState::Checking,
            RTCIceConnectionState::Connected => IceConnectionState::Connected,
            RTCIceConnectionState::Completed => IceConnectionState::Completed,
            RTCIceConnectionState::Failed => IceConnectionState::Failed,
            RTCIceConnectionState::Disconnected => IceConnectionState::Disconnected,
            RTCIceConnectionState::Closed => IceConnectionState::Closed,
            RTCIceConnectionState::New | RTCIceConnectionState::Unspecified => {
                IceConnectionState::New
            }
        }
    }
}

impl From<RTCSignalingState> for SignalingState {
    fn from(state: RTCSignalingState) -> Self {
        match state {
            RTCSignalingState::HaveLocalOffer => SignalingState::HaveLocalOffer,
            RTCSignalingState::HaveRemoteOffer => SignalingState::HaveRemoteOffer,
            RTCSignalingState::HaveLocalPranswer => SignalingState::HaveLocalPranswer,
            RTCSignalingState::HaveRemotePranswer => SignalingState::HaveRemotePranswer,
            RTCSignalingState::Closed => SignalingState::Closed,
            RTCSignalingState::Stable | RTCSignalingState::Unspecified => SignalingState::Stable,
        }
    }
}

/// Engine operations the negotiation chain drives. `ConnectionHandle` is the
/// production implementation; tests drive the chain with scripted handles.
#[async_trait]
pub trait PeerHandle: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, EngineError>;
    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), EngineError>;
    async fn local_description(&self) -> Option<SessionDescription>;
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), EngineError>;
    fn gathering_state(&self) -> IceGatheringState;
    /// Subscribe to gathering transitions. Dropping the receiver is the
    /// unsubscribe.
    fn subscribe_gathering(&self) -> watch::Receiver<IceGatheringState>;
}

/// Data side channel opened on a connection. State transitions arrive on a
/// watch stream; message/open/close display events go to the sink directly.
#[async_trait]
pub trait SideChannel: Send + Sync {
    fn label(&self) -> &str;
    fn state(&self) -> ChannelState;
    fn subscribe_state(&self) -> watch::Receiver<ChannelState>;
    async fn send_text(&self, text: &str) -> Result<(), EngineError>;
    async fn close(&self) -> Result<(), EngineError>;
}

/// Thin wrapper around one `RTCPeerConnection`, owned for the lifetime of a
/// session. Description legality per signaling state is the engine's job; the
/// wrapper only translates values and fans state changes out to the watch
/// stream and the sink.
pub struct ConnectionHandle {
    pc: Arc<RTCPeerConnection>,
    gathering_tx: Arc<watch::Sender<IceGatheringState>>,
    sink: Arc<dyn ObservabilitySink>,
}

impl ConnectionHandle {
    pub async fn new(
        ice_servers: &[String],
        sink: Arc<dyn ObservabilitySink>,
    ) -> Result<Self, EngineError> {
        let api = APIBuilder::new().build();
        let config = RTCConfiguration {
            ice_servers: if ice_servers.is_empty() {
                Vec::new()
            } else {
                vec![RTCIceServer {
                    urls: ice_servers.to_vec(),
                    ..Default::default()
                }]
            },
            ..Default::default()
        };
        let pc = Arc::new(
            api.new_peer_connection(config)
                .await
                .map_err(to_engine_error)?,
        );

        let gathering_tx = Arc::new(watch::channel(pc.ice_gathering_state().into()).0);

        let tx = gathering_tx.clone();
        let gathering_sink = sink.clone();
        pc.on_ice_gathering_state_change(Box::new(move |state: RTCIceGathererState| {
            let mapped = IceGatheringState::from(state);
            let _ = tx.send_replace(mapped);
            gathering_sink.on_gathering_state_change(mapped);
            Box::pin(async {})
        }));

        let connection_sink = sink.clone();
        pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
            connection_sink.on_connection_state_change(state.into());
            Box::pin(async {})
        }));

        let signaling_sink = sink.clone();
        pc.on_signaling_state_change(Box::new(move |state: RTCSignalingState| {
            signaling_sink.on_signaling_state_change(state.into());
            Box::pin(async {})
        }));

        let track_sink = sink.clone();
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            track_sink.on_incoming_track(&track.kind().to_string());
            Box::pin(async {})
        }));

        Ok(Self {
            pc,
            gathering_tx,
            sink,
        })
    }

    pub fn signaling_state(&self) -> SignalingState {
        self.pc.signaling_state().into()
    }

    pub fn connection_state(&self) -> IceConnectionState {
        self.pc.ice_connection_state().into()
    }

    /// Open a data side channel on this connection. Open/close/message events
    /// are forwarded to the sink; the returned channel exposes state as a
    /// watch stream for lifecycle-driven loops.
    pub async fn open_side_channel(
        &self,
        label: &str,
    ) -> Result<Arc<dyn SideChannel>, EngineError> {
        let dc = self
            .pc
            .create_data_channel(label, None)
            .await
            .map_err(to_engine_error)?;

        let state_tx = Arc::new(watch::channel(ChannelState::Connecting).0);

        let open_tx = state_tx.clone();
        let open_sink = self.sink.clone();
        dc.on_open(Box::new(move || {
            let _ = open_tx.send_replace(ChannelState::Open);
            open_sink.on_channel_open();
            Box::pin(async {})
        }));

        let close_tx = state_tx.clone();
        let close_sink = self.sink.clone();
        dc.on_close(Box::new(move || {
            let _ = close_tx.send_replace(ChannelState::Closed);
            close_sink.on_channel_close();
            Box::pin(async {})
        }));

        let message_sink = self.sink.clone();
        dc.on_message(Box::new(move |message: DataChannelMessage| {
            if let Ok(text) = String::from_utf8(message.data.to_vec()) {
                message_sink.on_channel_message(&text);
            }
            Box::pin(async {})
        }));

        debug!(target = "rtc_dialer::handle", label, "side channel created");
        Ok(Arc::new(RtcSideChannel {
            dc,
            label: label.to_string(),
            state_tx,
        }))
    }

    /// Close the underlying connection. Pending negotiation steps on this
    /// handle are not synchronously aborted; the engine rejects them on its
    /// own schedule.
    pub async fn close(&self) -> Result<(), EngineError> {
        self.pc.close().await.map_err(to_engine_error)
    }
}

#[async_trait]
impl PeerHandle for ConnectionHandle {
    async fn create_offer(&self) -> Result<SessionDescription, EngineError> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(to_engine_error)?;
        description_from_engine(offer)
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), EngineError> {
        let desc = description_to_engine(&desc)?;
        self.pc
            .set_local_description(desc)
            .await
            .map_err(to_engine_error)
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        let desc = self.pc.local_description().await?;
        description_from_engine(desc).ok()
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), EngineError> {
        let desc = description_to_engine(&desc)?;
        self.pc
            .set_remote_description(desc)
            .await
            .map_err(to_engine_error)
    }

    fn gathering_state(&self) -> IceGatheringState {
        self.pc.ice_gathering_state().into()
    }

    fn subscribe_gathering(&self) -> watch::Receiver<IceGatheringState> {
        self.gathering_tx.subscribe()
    }
}

struct RtcSideChannel {
    dc: Arc<RTCDataChannel>,
    label: String,
    state_tx: Arc<watch::Sender<ChannelState>>,
}

#[async_trait]
impl SideChannel for RtcSideChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn state(&self) -> ChannelState {
        *self.state_tx.borrow()
    }

    fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.state_tx.subscribe()
    }

    async fn send_text(&self, text: &str) -> Result<(), EngineError> {
        self.dc
            .send_text(text)
            .await
            .map(|_| ())
            .map_err(to_engine_error)
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.dc.close().await.map_err(to_engine_error)
    }
}

fn description_from_engine(desc: RTCSessionDescription) -> Result<SessionDescription, EngineError> {
    let kind = match desc.sdp_type {
        RTCSdpType::Offer => SdpKind::Offer,
        RTCSdpType::Answer => SdpKind::Answer,
        RTCSdpType::Pranswer => SdpKind::Pranswer,
        other => {
            return Err(EngineError::new(format!("unsupported sdp type {other}")));
        }
    };
    Ok(SessionDescription {
        sdp: desc.sdp,
        kind,
    })
}

fn description_to_engine(desc: &SessionDescription) -> Result<RTCSessionDescription, EngineError> {
    match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(desc.sdp.clone()),
        SdpKind::Answer => RTCSessionDescription::answer(desc.sdp.clone()),
        SdpKind::Pranswer => RTCSessionDescription::pranswer(desc.sdp.clone()),
    }
    .map_err(to_engine_error)
}
