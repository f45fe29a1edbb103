//! WebSocket transport from a device process to the relay.
//!
//! [`connect`] returns a [`RelayConnection`]: its [`WsChannel`] is handed to
//! the device as the outbound [`SyncChannel`], and inbound messages are read
//! with [`RelayConnection::recv`] and passed to the device's
//! `handle_message`.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use facesync_core::{ChannelError, SyncChannel, SyncMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Errors that can occur talking to the relay.
#[derive(Debug)]
pub enum TransportError {
    /// Failed to connect to the relay
    ConnectionError(String),
    /// The connection was already gone when closing
    Closed,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::ConnectionError(e) => write!(f, "Connection error: {}", e),
            TransportError::Closed => write!(f, "Relay connection already closed"),
        }
    }
}

impl std::error::Error for TransportError {}

enum Outbound {
    Frame(Vec<u8>),
    Close(oneshot::Sender<()>),
}

/// Outbound half of a relay connection.
///
/// Sending never blocks: frames are queued for the writer task. Once the
/// connection is gone every send fails with [`ChannelError::Unavailable`].
#[derive(Debug, Clone)]
pub struct WsChannel {
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl SyncChannel for WsChannel {
    fn send(&self, message: SyncMessage) -> Result<(), ChannelError> {
        let data = message
            .encode()
            .map_err(|e| ChannelError::Encode(e.to_string()))?;
        self.outbound
            .send(Outbound::Frame(data))
            .map_err(|_| ChannelError::Unavailable("relay connection closed".to_string()))
    }
}

impl std::fmt::Debug for Outbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outbound::Frame(data) => write!(f, "Frame({} bytes)", data.len()),
            Outbound::Close(_) => write!(f, "Close"),
        }
    }
}

/// A live connection to the relay.
pub struct RelayConnection {
    channel: Arc<WsChannel>,
    inbound: mpsc::UnboundedReceiver<SyncMessage>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl RelayConnection {
    /// The outbound channel to give to a device.
    pub fn channel(&self) -> Arc<WsChannel> {
        Arc::clone(&self.channel)
    }

    /// Next message from the other device.
    ///
    /// Returns None once the relay has closed the connection.
    pub async fn recv(&mut self) -> Option<SyncMessage> {
        self.inbound.recv().await
    }

    /// Flushes every queued message and closes the connection.
    pub async fn close(self) -> Result<(), TransportError> {
        let (done, flushed) = oneshot::channel();
        let result = match self.channel.outbound.send(Outbound::Close(done)) {
            Ok(()) => flushed.await.map_err(|_| TransportError::Closed),
            Err(_) => Err(TransportError::Closed),
        };
        self.reader.abort();
        let _ = self.writer.await;
        result
    }
}

impl std::fmt::Debug for RelayConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConnection")
            .field("channel", &self.channel)
            .finish()
    }
}

/// Builds the relay WebSocket URL from a configured base URL.
pub fn build_ws_url(base: &str) -> String {
    // Convert http(s) to ws(s) if needed
    let base_url = if base.starts_with("http://") {
        base.replacen("http://", "ws://", 1)
    } else if base.starts_with("https://") {
        base.replacen("https://", "wss://", 1)
    } else if !base.starts_with("ws://") && !base.starts_with("wss://") {
        format!("ws://{}", base)
    } else {
        base.to_string()
    };

    format!("{}/relay", base_url.trim_end_matches('/'))
}

/// Connects to the relay at `base_url`.
pub async fn connect(base_url: &str) -> Result<RelayConnection, TransportError> {
    let ws_url = build_ws_url(base_url);

    let (ws_stream, _) = connect_async(&ws_url)
        .await
        .map_err(|e| TransportError::ConnectionError(format!("{}: {}", ws_url, e)))?;
    tracing::debug!("Connected to relay at {}", ws_url);

    let (sink, stream) = ws_stream.split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

    Ok(RelayConnection {
        channel: Arc::new(WsChannel {
            outbound: outbound_tx,
        }),
        inbound: inbound_rx,
        writer: tokio::spawn(write_loop(sink, outbound_rx)),
        reader: tokio::spawn(read_loop(stream, inbound_tx)),
    })
}

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Frame(data) => {
                if let Err(e) = sink.send(Message::Binary(data.into())).await {
                    tracing::warn!("Relay write failed: {}", e);
                    break;
                }
            }
            Outbound::Close(done) => {
                let _ = sink.send(Message::Close(None)).await;
                let _ = done.send(());
                break;
            }
        }
    }
}

async fn read_loop(mut stream: SplitStream<WsStream>, inbound: mpsc::UnboundedSender<SyncMessage>) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Binary(data)) => match SyncMessage::decode(&data) {
                Ok(message) => {
                    if inbound.send(message).is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!("Ignoring malformed frame: {}", e),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {
                // Ignore other message types
            }
            Err(e) => {
                tracing::warn!("Relay read failed: {}", e);
                break;
            }
        }
    }
    tracing::debug!("Relay connection closed");
}
