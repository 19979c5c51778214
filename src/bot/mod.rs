pub mod discord;

use crate::config::Config;
use anyhow::Result;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Minimal HTTP responder for container liveness probes: any request gets a
/// 200 with "OK".
async fn serve_health(listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((mut stream, _)) => {
                let mut buf = [0u8; 512];
                let _ = stream.read(&mut buf).await;
                let _ = stream
                    .write_all(
                        b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nOK",
                    )
                    .await;
            }
            Err(e) => {
                warn!("Health endpoint accept failed: {}", e);
            }
        }
    }
}

pub async fn run(config: Config) -> Result<()> {
    match TcpListener::bind(("0.0.0.0", config.health_port)).await {
        Ok(listener) => {
            info!("Health endpoint listening on port {}", config.health_port);
            tokio::spawn(serve_health(listener));
        }
        Err(e) => {
            warn!(
                "Health endpoint unavailable on port {}: {}",
                config.health_port, e
            );
        }
    }

    discord::run(config).await
}
