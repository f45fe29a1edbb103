//! WebSocket relay between a companion and a wearable.
//!
//! Stands in for the platform message layer: every binary frame a peer
//! sends is forwarded to every other connected peer. Frames are checked to
//! be sync messages but otherwise passed through untouched, so the relay
//! never needs to understand preferences.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use facesync_core::SyncMessage;

/// Frames buffered per peer before a slow reader starts losing them.
const FRAME_BUFFER: usize = 64;

/// A frame published by one peer.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Connection id of the sender
    pub from: u64,
    pub data: Vec<u8>,
}

/// Fans frames out to all connected peers.
pub struct RelayHub {
    frames: broadcast::Sender<Frame>,
    next_peer: AtomicU64,
}

impl RelayHub {
    /// Creates a new relay hub.
    pub fn new() -> Self {
        let (frames, _) = broadcast::channel(FRAME_BUFFER);
        Self {
            frames,
            next_peer: AtomicU64::new(1),
        }
    }

    /// Registers a peer, returning its id and its frame feed.
    pub fn join(&self) -> (u64, broadcast::Receiver<Frame>) {
        let id = self.next_peer.fetch_add(1, Ordering::Relaxed);
        (id, self.frames.subscribe())
    }

    /// Number of peers currently connected.
    pub fn peers(&self) -> usize {
        self.frames.receiver_count()
    }

    /// Forwards a frame from peer `from`.
    ///
    /// Frames that are not sync messages are dropped. Returns whether the
    /// frame was forwarded.
    pub fn publish(&self, from: u64, data: Vec<u8>) -> bool {
        let message = match SyncMessage::decode(&data) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Dropping malformed frame from peer {}: {}", from, e);
                return false;
            }
        };

        tracing::debug!(
            "Relaying {} from peer {} to {} peer(s)",
            message.path,
            from,
            self.peers().saturating_sub(1)
        );

        // Ignore send errors (no subscribers)
        let _ = self.frames.send(Frame { from, data });
        true
    }
}

impl Default for RelayHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    peers: usize,
}

/// Health check endpoint
async fn health(State(hub): State<Arc<RelayHub>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        peers: hub.peers(),
    })
}

async fn relay_ws(ws: WebSocketUpgrade, State(hub): State<Arc<RelayHub>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: Arc<RelayHub>) {
    let (id, mut frames) = hub.join();
    let (mut sender, mut receiver) = socket.split();
    tracing::info!("Peer {} connected ({} total)", id, hub.peers());

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Binary(data))) => {
                    hub.publish(id, data.to_vec());
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {
                    // Ignore other message types; pings are answered by axum
                }
                Some(Err(e)) => {
                    tracing::warn!("Peer {} read error: {}", id, e);
                    break;
                }
            },
            outgoing = frames.recv() => match outgoing {
                Ok(frame) if frame.from == id => {}
                Ok(frame) => {
                    if let Err(e) = sender.send(Message::Binary(frame.data.into())).await {
                        tracing::warn!("Peer {} write error: {}", id, e);
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Peer {} lagged, {} frame(s) lost", id, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    // The feed must be released before counting, or this peer is included.
    drop(frames);
    tracing::info!("Peer {} disconnected ({} remaining)", id, hub.peers());
}

/// Builds the relay router.
///
/// - `GET /health`: health check
/// - `GET /relay`: WebSocket endpoint for devices
pub fn router(hub: Arc<RelayHub>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/relay", get(relay_ws))
        .with_state(hub)
        .layer(TraceLayer::new_for_http())
}

/// Serves the relay on an already bound listener.
pub async fn serve_on(listener: TcpListener, hub: Arc<RelayHub>) -> std::io::Result<()> {
    axum::serve(listener, router(hub)).await
}

/// Binds `addr` and serves the relay until the process ends.
pub async fn serve(addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Relay listening on {}", listener.local_addr()?);
    serve_on(listener, Arc::new(RelayHub::new())).await
}
