//! Raw framed transport: an axum WebSocket server.
//!
//! Each client is one WebSocket connection on `/`. Every inbound text frame
//! is broadcast to all registered connections (the sender included) prefixed
//! with `[Native] `. Per connection: assign an id, register, run a writer
//! task draining the outbound channel and a reader loop feeding the relay;
//! whichever side ends first tears the other down, then the connection is
//! unregistered regardless of the close cause.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::registry::ConnectionRegistry;
use crate::relay::{Relay, RelayPolicy};

/// Shared state for the raw WebSocket server.
struct NativeState {
    registry: Arc<ConnectionRegistry>,
    relay: Relay,
    /// Source of connection ids; monotonic, never reused.
    next_id: AtomicU64,
}

/// Starts the raw WebSocket relay on the given address and returns the bound
/// address and a join handle.
///
/// The registry is owned by the caller so tests (and the process entry point)
/// can observe connection membership.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
    registry: Arc<ConnectionRegistry>,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), Box<dyn std::error::Error + Send + Sync>> {
    let state = Arc::new(NativeState {
        relay: Relay::new(Arc::clone(&registry), RelayPolicy::NATIVE),
        registry,
        next_id: AtomicU64::new(1),
    });

    let app = axum::Router::new()
        .route("/", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "native websocket server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<NativeState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handles one upgraded WebSocket connection from registration to close.
async fn handle_socket(socket: WebSocket, state: Arc<NativeState>) {
    let id = state.next_id.fetch_add(1, Ordering::Relaxed).to_string();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Register before reading any frame so the connection is a broadcast
    // target for its entire open lifetime.
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    state.registry.register(&id, tx).await;
    tracing::info!(connection_id = %id, "client connected");

    // Writer task: drains the outbound channel into the socket.
    let writer_id = id.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                tracing::debug!(connection_id = %writer_id, "websocket write failed");
                break;
            }
        }
    });

    // Reader loop: each text frame is relayed verbatim; anything that is not
    // a text or close frame is ignored.
    let reader_id = id.clone();
    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => {
                    tracing::debug!(
                        connection_id = %reader_id,
                        len = text.len(),
                        "relaying frame"
                    );
                    reader_state
                        .relay
                        .broadcast(Some(&reader_id), text.as_str())
                        .await;
                }
                Message::Close(_) => {
                    tracing::debug!(connection_id = %reader_id, "received close frame");
                    break;
                }
                _ => {
                    // Binary, ping, pong frames.
                }
            }
        }
    });

    // Wait for either task to finish, then abort the other.
    tokio::select! {
        _ = &mut read_task => write_task.abort(),
        _ = &mut write_task => read_task.abort(),
    }

    // Unregister on any exit path: client close, protocol error, or network
    // failure all look the same to the registry.
    state.registry.unregister(&id).await;
    tracing::info!(connection_id = %id, "client disconnected");
}
