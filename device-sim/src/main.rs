mod config;
mod device;

use config::SimConfig;
use device::Soundbar;
use std::net::SocketAddr;
use tokio::net::UdpSocket;

use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = SimConfig::load()?;

    let socket = UdpSocket::bind(config.listen_addr).await?;
    info!("Device simulator starting");
    info!("  Device: {}", config.device_id);
    info!("  Listening: {}", socket.local_addr()?);
    info!("  Reports to: {}", config.report_addr);

    let soundbar = Soundbar::new(config.identity(), config.track_count);
    serve(socket, soundbar, config.report_addr).await;

    Ok(())
}

/// Answer datagrams until the socket fails
async fn serve(socket: UdpSocket, mut soundbar: Soundbar, report_addr: SocketAddr) {
    let mut buf = vec![0u8; 65_536];

    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                warn!(error = %e, "Receive failed");
                continue;
            }
        };

        let reaction = match soundbar.handle_datagram(&buf[..len]) {
            Ok(reaction) => reaction,
            Err(e) => {
                warn!(%from, error = %e, "Ignoring datagram");
                continue;
            }
        };
        debug!(%from, state = ?soundbar.state(), "Handled datagram");

        if let Some(reply) = reaction.reply {
            send(&socket, &reply, from).await;
        }
        if let Some(push) = reaction.push {
            send(&socket, &push, report_addr).await;
        }
    }
}

async fn send<T: serde::Serialize>(socket: &UdpSocket, message: &T, to: SocketAddr) {
    match serde_json::to_vec(message) {
        Ok(datagram) => {
            if let Err(e) = socket.send_to(&datagram, to).await {
                warn!(%to, error = %e, "Send failed");
            }
        }
        Err(e) => warn!(error = %e, "Failed to encode datagram"),
    }
}
