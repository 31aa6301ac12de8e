use tracing::info;

use crate::handle::{IceConnectionState, IceGatheringState, SignalingState};

/// Collaborator receiving state-change notifications for display. The core
/// calls these synchronously and never waits on their completion, so
/// implementations must return quickly.
pub trait ObservabilitySink: Send + Sync {
    fn on_gathering_state_change(&self, _state: IceGatheringState) {}
    fn on_connection_state_change(&self, _state: IceConnectionState) {}
    fn on_signaling_state_change(&self, _state: SignalingState) {}
    fn on_incoming_track(&self, _kind: &str) {}
    fn on_channel_open(&self) {}
    fn on_channel_close(&self) {}
    fn on_channel_message(&self, _text: &str) {}
}

/// Sink that drops every notification.
pub struct NullSink;

impl ObservabilitySink for NullSink {}

/// Sink that mirrors every notification to the log, one line per event.
pub struct LogSink;

impl ObservabilitySink for LogSink {
    fn on_gathering_state_change(&self, state: IceGatheringState) {
        info!(target = "rtc_dialer::observer", %state, "ice gathering state");
    }

    fn on_connection_state_change(&self, state: IceConnectionState) {
        info!(target = "rtc_dialer::observer", %state, "ice connection state");
    }

    fn on_signaling_state_change(&self, state: SignalingState) {
        info!(target = "rtc_dialer::observer", %state, "signaling state");
    }

    fn on_incoming_track(&self, kind: &str) {
        info!(target = "rtc_dialer::observer", kind, "incoming track");
    }

    fn on_channel_open(&self) {
        info!(target = "rtc_dialer::observer", "side channel open");
    }

    fn on_channel_close(&self) {
        info!(target = "rtc_dialer::observer", "side channel closed");
    }

    fn on_channel_message(&self, text: &str) {
        info!(target = "rtc_dialer::observer", text, "side channel message");
    }
}
