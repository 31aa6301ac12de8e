use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{EngineError, SessionError};
use crate::handle::{ChannelState, ConnectionHandle, SideChannel};
use crate::negotiate::negotiate;
use crate::observer::ObservabilitySink;
use crate::signaling::{HttpSignaling, SessionDescription, SignalingTransport};

/// Hook invoked with the handle right before offer creation. This is the
/// injection point for attaching local tracks once media capture exists; the
/// controller itself never touches media.
pub type PreOfferHook = Box<
    dyn for<'a> Fn(&'a ConnectionHandle) -> BoxFuture<'a, Result<(), EngineError>> + Send + Sync,
>;

/// Start/stop coordinator for one dialing session. Owns the connection
/// handle, the optional side channel, and the ping loop driving it; the
/// negotiation chain only borrows the handle.
pub struct SessionController {
    config: SessionConfig,
    handle: Arc<ConnectionHandle>,
    signaling: Arc<dyn SignalingTransport>,
    side_channel: Option<Arc<dyn SideChannel>>,
    ping_task: Option<JoinHandle<()>>,
    pre_offer: Option<PreOfferHook>,
}

impl SessionController {
    pub async fn new(
        config: SessionConfig,
        sink: Arc<dyn ObservabilitySink>,
    ) -> Result<Self, EngineError> {
        let handle = Arc::new(ConnectionHandle::new(&config.ice_servers, sink).await?);
        let signaling = Arc::new(HttpSignaling::new(config.signaling_url.clone()));
        Ok(Self {
            config,
            handle,
            signaling,
            side_channel: None,
            ping_task: None,
            pre_offer: None,
        })
    }

    /// Replace the HTTP transport, e.g. with a scripted one in tests.
    pub fn with_signaling(mut self, signaling: Arc<dyn SignalingTransport>) -> Self {
        self.signaling = signaling;
        self
    }

    pub fn with_pre_offer_hook(mut self, hook: PreOfferHook) -> Self {
        self.pre_offer = Some(hook);
        self
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Open the optional side channel, run the pre-offer hook, and drive one
    /// negotiation round. Returns the committed remote description.
    pub async fn start(&mut self) -> Result<SessionDescription, SessionError> {
        if self.config.use_side_channel {
            let channel = self
                .handle
                .open_side_channel(&self.config.side_channel_label)
                .await
                .map_err(SessionError::SideChannel)?;
            let task = spawn_ping_loop(channel.clone(), self.config.side_channel_interval);
            self.side_channel = Some(channel);
            self.ping_task = Some(task);
        }

        if let Some(hook) = &self.pre_offer {
            hook(&self.handle).await.map_err(SessionError::PreOffer)?;
        }

        let remote = negotiate(self.handle.as_ref(), self.signaling.as_ref()).await?;
        info!(
            target = "rtc_dialer::session",
            kind = %remote.kind,
            "remote description applied"
        );
        Ok(remote)
    }

    /// Tear the session down: cancel the ping loop, close the side channel,
    /// then close the handle after the configured grace delay so in-flight
    /// close signaling can flush. The delay is best effort, not a
    /// synchronization guarantee.
    pub async fn stop(&mut self) {
        if let Some(task) = self.ping_task.take() {
            task.abort();
        }
        if let Some(channel) = self.side_channel.take() {
            debug!(target = "rtc_dialer::session", label = channel.label(), "closing side channel");
            if let Err(err) = channel.close().await {
                warn!(target = "rtc_dialer::session", error = %err, "side channel close failed");
            }
        }
        sleep(self.config.close_grace).await;
        if let Err(err) = self.handle.close().await {
            warn!(target = "rtc_dialer::session", error = %err, "connection close failed");
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(task) = self.ping_task.take() {
            task.abort();
        }
    }
}

/// Send "ping" over the channel once per period while it stays open. The
/// loop waits for the channel to open, then stops on close, send failure, or
/// abort. The peer's replies reach the sink through the channel's message
/// handler, not through this loop.
pub(crate) fn spawn_ping_loop(channel: Arc<dyn SideChannel>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut states = channel.subscribe_state();
        loop {
            let state = *states.borrow_and_update();
            match state {
                ChannelState::Open => break,
                ChannelState::Closed => return,
                ChannelState::Connecting => {
                    if states.changed().await.is_err() {
                        return;
                    }
                }
            }
        }

        let mut ticker = interval(period);
        // The interval's first tick fires immediately; the first ping should
        // come one full period after open.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!(target = "rtc_dialer::session", "side channel ping");
                    if let Err(err) = channel.send_text("ping").await {
                        warn!(
                            target = "rtc_dialer::session",
                            error = %err,
                            "ping send failed; stopping loop"
                        );
                        return;
                    }
                }
                changed = states.changed() => {
                    if changed.is_err()
                        || *states.borrow_and_update() == ChannelState::Closed
                    {
                        return;
                    }
                }
            }
        }
    })
}
