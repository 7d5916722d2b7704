mod config;
mod connection;
mod device_manager;
mod intent;

use config::AgentConfig;
use connection::{ConnectionEvent, ConnectionManager, FrameSender};
use device_manager::UdpDeviceManager;
use intent::LocalExecutionApp;
use serde_json::Value;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = AgentConfig::load()?;

    info!("Hub agent starting");
    info!("  Host: {}", config.host_addr);
    info!("  Devices: {}:{}", config.device_addr, config.device_port);

    let manager = Arc::new(UdpDeviceManager::new(
        config.device_addr,
        config.request_timeout(),
    ));
    let app = Arc::new(LocalExecutionApp::new(manager, config.device_port));

    let mut conn = ConnectionManager::new(config.connection());
    let sender = conn.sender();

    // Main event loop
    loop {
        match conn.recv().await {
            Some(ConnectionEvent::Connected { addr }) => {
                info!("Connected to host {}", addr);
            }
            Some(ConnectionEvent::Disconnected { reason }) => {
                warn!("Disconnected: {}", reason);
            }
            Some(ConnectionEvent::ConnectionFailed { reason }) => {
                error!("Connection failed: {}", reason);
            }
            Some(ConnectionEvent::Received(request)) => {
                let app = app.clone();
                let sender = sender.clone();
                tokio::spawn(async move {
                    handle_host_request(&app, &sender, request).await;
                });
            }
            None => {
                error!("Connection manager closed");
                break;
            }
        }
    }

    Ok(())
}

/// Handle one request from the host and queue the response
async fn handle_host_request(app: &LocalExecutionApp, sender: &FrameSender, request: Value) {
    let sent = match app.handle_value(request).await {
        Ok(response) => sender.send(&response).await,
        Err(rejection) => {
            warn!(
                request_id = %rejection.request_id,
                error_code = %rejection.error_code,
                debug = %rejection.debug_string,
                "Request rejected"
            );
            sender.send(&rejection.to_response()).await
        }
    };

    if let Err(e) = sent {
        error!("Failed to send response: {}", e);
    }
}
