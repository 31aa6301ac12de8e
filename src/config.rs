use std::time::Duration;

use url::Url;

pub const DEFAULT_SIDE_CHANNEL_LABEL: &str = "chat";
pub const DEFAULT_SIDE_CHANNEL_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Per-session settings. One config builds one [`SessionController`]; the
/// connection itself carries no policy beyond what is listed here.
///
/// [`SessionController`]: crate::session::SessionController
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Endpoint that answers offers with a single POST round-trip.
    pub signaling_url: Url,
    /// STUN/TURN URLs handed to the engine. Empty means host candidates only.
    pub ice_servers: Vec<String>,
    /// Whether to open the data side channel and run the ping loop.
    pub use_side_channel: bool,
    pub side_channel_label: String,
    pub side_channel_interval: Duration,
    /// Delay between closing the side channel and closing the connection,
    /// letting in-flight close signaling flush. Best effort only.
    pub close_grace: Duration,
}

impl SessionConfig {
    pub fn new(signaling_url: Url) -> Self {
        Self {
            signaling_url,
            ice_servers: Vec::new(),
            use_side_channel: true,
            side_channel_label: DEFAULT_SIDE_CHANNEL_LABEL.to_string(),
            side_channel_interval: DEFAULT_SIDE_CHANNEL_INTERVAL,
            close_grace: DEFAULT_CLOSE_GRACE,
        }
    }

    pub fn with_side_channel(mut self, enabled: bool) -> Self {
        self.use_side_channel = enabled;
        self
    }

    pub fn with_side_channel_label(mut self, label: impl Into<String>) -> Self {
        self.side_channel_label = label.into();
        self
    }

    pub fn with_side_channel_interval(mut self, interval: Duration) -> Self {
        self.side_channel_interval = interval;
        self
    }

    pub fn with_close_grace(mut self, grace: Duration) -> Self {
        self.close_grace = grace;
        self
    }

    pub fn with_ice_servers(mut self, servers: Vec<String>) -> Self {
        self.ice_servers = servers;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> SessionConfig {
        SessionConfig::new(Url::parse("http://127.0.0.1:3000/offer").unwrap())
    }

    #[test]
    fn defaults_match_reference_setup() {
        let config = base();
        assert!(config.use_side_channel);
        assert_eq!(config.side_channel_label, "chat");
        assert_eq!(config.side_channel_interval, Duration::from_millis(1000));
        assert_eq!(config.close_grace, Duration::from_millis(500));
        assert!(config.ice_servers.is_empty());
    }

    #[test]
    fn builders_override_defaults() {
        let config = base()
            .with_side_channel(false)
            .with_side_channel_interval(Duration::from_millis(250))
            .with_close_grace(Duration::ZERO)
            .with_ice_servers(vec!["stun:stun.l.google.com:19302".into()]);
        assert!(!config.use_side_channel);
        assert_eq!(config.side_channel_interval, Duration::from_millis(250));
        assert_eq!(config.close_grace, Duration::ZERO);
        assert_eq!(config.ice_servers.len(), 1);
    }
}
