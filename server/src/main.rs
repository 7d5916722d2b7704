mod catalog;
mod config;
mod fulfillment;
mod session;
mod upstream;

use anyhow::Context;
use catalog::DeviceCatalog;
use config::ServerConfig;
use fulfillment::FulfillmentApp;
use lanbridge_shared::report::run_push_listener;
use lanbridge_shared::{timing, BroadcastLink, CommandDispatcher, StateReporter, Transceiver};
use session::PlatformSession;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use upstream::UpstreamLink;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = ServerConfig::load()?;
    info!("Fulfillment server starting");
    info!("  Devices: {}", config.device_addr);
    info!("  Upstream: {}", config.upstream_addr);

    let catalog = DeviceCatalog::load(&config.catalog_path)?;
    if catalog.is_empty() {
        warn!("No devices to announce on SYNC");
    } else {
        info!("  Catalog: {} devices", catalog.len());
    }

    let transceiver = Transceiver::bind(&config.transceiver())
        .await
        .with_context(|| format!("Failed to bind reply socket {}", config.reply_addr))?;
    info!("Listening for device replies on {}", transceiver.local_addr());

    let link = Arc::new(BroadcastLink::new(transceiver.clone(), config.device_addr));
    let sink = Arc::new(UpstreamLink::new(
        config.upstream_addr,
        Duration::from_millis(config.upstream_connect_timeout_ms),
        Duration::from_millis(timing::REPORT_ACK_TIMEOUT_MS),
    ));
    let reporter = Arc::new(StateReporter::new(sink, config.agent_user_id.clone()));

    // Unsolicited state pushes
    let push_socket = UdpSocket::bind(config.report_addr)
        .await
        .with_context(|| format!("Failed to bind state push socket {}", config.report_addr))?;
    info!("Listening for state pushes on {}", config.report_addr);
    tokio::spawn(run_push_listener(push_socket, reporter.clone()));

    let app = Arc::new(FulfillmentApp::new(
        CommandDispatcher::new(link),
        reporter,
        catalog,
    ));

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind platform listener {}", config.listen_addr))?;
    info!("Server listening on {}", config.listen_addr);

    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("Accept failed: {}", e);
                continue;
            }
        };

        let session = PlatformSession::new(stream, addr);
        let app = app.clone();
        tokio::spawn(session.run(app));
    }
}
