//! Minimal IRC daemon: plain TCP on 6667 and WebSocket on 8080.
//!
//! `IRCD_TCP` and `IRCD_WS` override the listen addresses, `IRCD_NAME` the
//! server name. Log verbosity follows `RUST_LOG` (default `info`).

use std::net::SocketAddr;

use ircforge::prelude::*;
use tracing_subscriber::EnvFilter;

fn addr_from_env(var: &str, default: &str) -> Result<SocketAddr, std::net::AddrParseError> {
    std::env::var(var)
        .unwrap_or_else(|_| default.to_owned())
        .parse()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig {
        server_name: std::env::var("IRCD_NAME").unwrap_or_else(|_| "irc.local".into()),
        ..ServerConfig::default()
    };

    let server = IrcServer::builder()
        .config(config)
        .bind_tcp(addr_from_env("IRCD_TCP", "0.0.0.0:6667")?)
        .bind_websocket(addr_from_env("IRCD_WS", "0.0.0.0:8080")?)
        .build()
        .await?;

    tracing::info!("ircd listening, press Ctrl-C to stop");
    server.run().await?;
    Ok(())
}
