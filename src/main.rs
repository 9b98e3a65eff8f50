//! Socket relay — one process, two broadcast transports.
//!
//! Starts a raw WebSocket relay and a Socket.IO relay on two distinct ports.
//! Every message received on either listener is broadcast to all clients of
//! that listener, prefixed with a label identifying the transport.
//!
//! # Usage
//!
//! ```bash
//! # Default ports: WebSocket on 8080, Socket.IO on 3000
//! cargo run
//!
//! # Custom addresses
//! cargo run -- --native-bind 127.0.0.1:9001 --socketio-bind 127.0.0.1:9002
//! ```

use std::sync::Arc;

use clap::Parser;
use socket_relay::config::{RelayCliArgs, RelayConfig};
use socket_relay::registry::ConnectionRegistry;
use socket_relay::{native, socketio};

#[tokio::main]
async fn main() {
    let cli = RelayCliArgs::parse();

    let config = match RelayConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    // Each transport gets its own registry: the two relays are independent,
    // messages never cross between them.
    let native_registry = Arc::new(ConnectionRegistry::new());
    let socketio_registry = Arc::new(ConnectionRegistry::new());

    let (native_addr, native_handle) =
        match native::start_server(&config.native_bind, native_registry).await {
            Ok(started) => started,
            Err(e) => {
                tracing::error!(error = %e, "failed to start native websocket server");
                std::process::exit(1);
            }
        };
    tracing::info!(addr = %native_addr, "native websocket server listening");

    let (socketio_addr, socketio_handle) =
        match socketio::start_server(&config.socketio_bind, socketio_registry).await {
            Ok(started) => started,
            Err(e) => {
                tracing::error!(error = %e, "failed to start socket.io server");
                std::process::exit(1);
            }
        };
    tracing::info!(addr = %socketio_addr, "socket.io server listening");

    let (native_result, socketio_result) = tokio::join!(native_handle, socketio_handle);
    if let Err(e) = native_result {
        tracing::error!(error = %e, "native server task failed");
    }
    if let Err(e) = socketio_result {
        tracing::error!(error = %e, "socket.io server task failed");
    }
}
