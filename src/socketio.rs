//! Event-based transport: a Socket.IO server.
//!
//! Sessions are tracked by the Socket.IO layer itself; on top of that, each
//! session is mirrored into the shared [`ConnectionRegistry`] so both
//! transports broadcast through the same [`Relay`] fan-out instead of two
//! copies of the loop. The recognized event is `chat message` with a string
//! payload, re-emitted to every session (the sender included) prefixed with
//! `[Socket.IO] `. CORS is wide open: this listener exists for local demos.

use std::net::SocketAddr;
use std::sync::Arc;

use socketioxide::SocketIo;
use socketioxide::extract::{Data, SocketRef};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;

use crate::registry::ConnectionRegistry;
use crate::relay::{Relay, RelayPolicy};

/// Event name carrying chat text, inbound and outbound.
pub const CHAT_EVENT: &str = "chat message";

/// Starts the Socket.IO relay on the given address and returns the bound
/// address and a join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
    registry: Arc<ConnectionRegistry>,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), Box<dyn std::error::Error + Send + Sync>> {
    let relay = Arc::new(Relay::new(Arc::clone(&registry), RelayPolicy::SOCKET_IO));

    let (layer, io) = SocketIo::new_layer();
    io.ns("/", move |socket: SocketRef| {
        let registry = Arc::clone(&registry);
        let relay = Arc::clone(&relay);
        async move { on_connect(socket, registry, relay).await }
    });

    let app = axum::Router::new()
        .layer(layer)
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "socket.io server error");
        }
    });

    Ok((bound_addr, handle))
}

/// Wires up one new session: registers it, starts its outbound forwarder,
/// and installs the event and disconnect handlers.
async fn on_connect(socket: SocketRef, registry: Arc<ConnectionRegistry>, relay: Arc<Relay>) {
    let session_id = socket.id.to_string();
    tracing::info!(session_id = %session_id, "session connected");

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    registry.register(&session_id, tx).await;

    // Forwarder: drains the outbound channel into the session as CHAT_EVENT
    // emits. Ends when the channel closes (unregistered) or the emit fails
    // (session gone).
    let forward_socket = socket.clone();
    let forward_id = session_id.clone();
    tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if forward_socket.emit(CHAT_EVENT, &text).is_err() {
                tracing::debug!(session_id = %forward_id, "emit to closed session");
                break;
            }
        }
    });

    let event_relay = Arc::clone(&relay);
    let event_session = session_id.clone();
    socket.on(CHAT_EVENT, move |Data::<String>(text)| {
        let relay = Arc::clone(&event_relay);
        let session_id = event_session.clone();
        async move {
            tracing::debug!(session_id = %session_id, len = text.len(), "relaying event");
            relay.broadcast(Some(&session_id), &text).await;
        }
    });

    socket.on_disconnect(move |socket: SocketRef| {
        let registry = Arc::clone(&registry);
        async move {
            registry.unregister(&socket.id.to_string()).await;
            tracing::info!(session_id = %socket.id, "session disconnected");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio_tungstenite::tungstenite;

    type ClientSocket =
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

    async fn start_test_server() -> (
        SocketAddr,
        Arc<ConnectionRegistry>,
        tokio::task::JoinHandle<()>,
    ) {
        let registry = Arc::new(ConnectionRegistry::new());
        let (addr, handle) = start_server("127.0.0.1:0", Arc::clone(&registry))
            .await
            .unwrap();
        (addr, registry, handle)
    }

    async fn recv_text(ws: &mut ClientSocket) -> String {
        match ws.next().await {
            Some(Ok(tungstenite::Message::Text(text))) => text.to_string(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    /// Opens a session over the Engine.IO WebSocket transport: expects the
    /// open packet (`0{...}`), then performs the namespace connect (`40`).
    async fn connect_session(addr: SocketAddr) -> ClientSocket {
        let url = format!("ws://{addr}/socket.io/?EIO=4&transport=websocket");
        let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

        let open = recv_text(&mut ws).await;
        assert!(open.starts_with('0'), "expected open packet, got {open}");

        ws.send(tungstenite::Message::Text("40".into()))
            .await
            .unwrap();
        let ack = recv_text(&mut ws).await;
        assert!(ack.starts_with("40"), "expected namespace ack, got {ack}");

        ws
    }

    /// Reads until an event packet (`42...`) arrives, answering Engine.IO
    /// pings along the way.
    async fn recv_event(ws: &mut ClientSocket) -> String {
        loop {
            let text = recv_text(ws).await;
            if text.starts_with("42") {
                return text;
            }
            if text == "2" {
                ws.send(tungstenite::Message::Text("3".into()))
                    .await
                    .unwrap();
            }
        }
    }

    async fn wait_for_connections(registry: &ConnectionRegistry, n: usize) {
        for _ in 0..100 {
            if registry.len().await == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {n} registered sessions, got {}", registry.len().await);
    }

    #[tokio::test]
    async fn chat_event_is_broadcast_to_all_sessions_with_label() {
        let (addr, registry, _handle) = start_test_server().await;

        let mut ws_a = connect_session(addr).await;
        let mut ws_b = connect_session(addr).await;
        wait_for_connections(&registry, 2).await;

        ws_a.send(tungstenite::Message::Text(
            r#"42["chat message","hello"]"#.into(),
        ))
        .await
        .unwrap();

        let expected = r#"42["chat message","[Socket.IO] hello"]"#;
        assert_eq!(recv_event(&mut ws_a).await, expected);
        assert_eq!(recv_event(&mut ws_b).await, expected);
    }

    #[tokio::test]
    async fn closed_session_is_unregistered_and_skipped() {
        let (addr, registry, _handle) = start_test_server().await;

        let mut ws_a = connect_session(addr).await;
        let mut ws_b = connect_session(addr).await;
        wait_for_connections(&registry, 2).await;

        ws_b.close(None).await.unwrap();
        wait_for_connections(&registry, 1).await;

        ws_a.send(tungstenite::Message::Text(
            r#"42["chat message","hi"]"#.into(),
        ))
        .await
        .unwrap();

        assert_eq!(
            recv_event(&mut ws_a).await,
            r#"42["chat message","[Socket.IO] hi"]"#
        );
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn polling_handshake_accepts_any_origin() {
        let (addr, _registry, _handle) = start_test_server().await;

        let resp = reqwest::Client::new()
            .get(format!("http://{addr}/socket.io/?EIO=4&transport=polling"))
            .header("Origin", "http://example.com")
            .send()
            .await
            .unwrap();

        assert!(resp.status().is_success());
        assert!(resp.headers().contains_key("access-control-allow-origin"));
        let body = resp.text().await.unwrap();
        assert!(body.starts_with('0'), "expected open packet, got {body}");
    }
}
