use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use rtc_dialer::{EngineError, LogSink, SessionConfig, SessionController, SessionError};

/// Dial a remote peer through an HTTP offer/answer endpoint.
#[derive(Debug, Parser)]
#[command(name = "rtc-dialer", version)]
struct Cli {
    /// Signaling endpoint that answers posted offers
    #[arg(
        long,
        env = "RTC_DIALER_OFFER_URL",
        default_value = "http://127.0.0.1:3000/offer"
    )]
    offer_url: String,

    /// Skip the data side channel and its periodic ping loop
    #[arg(long)]
    no_side_channel: bool,

    /// Milliseconds between side-channel pings
    #[arg(long, default_value_t = 1000)]
    ping_interval_ms: u64,

    /// Milliseconds to wait before closing the connection on shutdown
    #[arg(long, default_value_t = 500)]
    close_grace_ms: u64,

    /// STUN/TURN server URL (repeatable)
    #[arg(long = "ice-server")]
    ice_servers: Vec<String>,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("invalid signaling url: {0}")]
    Url(#[from] url::ParseError),
    #[error("connection setup failed: {0}")]
    Setup(#[from] EngineError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = SessionConfig::new(Url::parse(&cli.offer_url)?)
        .with_side_channel(!cli.no_side_channel)
        .with_side_channel_interval(Duration::from_millis(cli.ping_interval_ms))
        .with_close_grace(Duration::from_millis(cli.close_grace_ms))
        .with_ice_servers(cli.ice_servers);

    let mut controller = SessionController::new(config, Arc::new(LogSink)).await?;
    let remote = controller.start().await?;
    info!(
        target = "rtc_dialer",
        kind = %remote.kind,
        "session established; ctrl-c to stop"
    );

    let _ = tokio::signal::ctrl_c().await;
    controller.stop().await;
    info!(target = "rtc_dialer", "session stopped");
    Ok(())
}
