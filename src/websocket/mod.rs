//! Async WebSocket client for the Bitfinex WebSocket V2 API.
//!
//! This module is organized by concern:
//! - [`connection`] - Connection lifecycle and the read loop
//! - [`subscription`] - Subscribe/unsubscribe operations
//! - [`registry`] - Channel id bookkeeping
//! - [`handler`] - Incoming frame classification and routing
//! - [`emitter`] - Listener fan-out of decoded events

mod connection;
mod emitter;
mod handler;
mod registry;
mod subscription;

use futures_util::StreamExt;
use futures_util::stream::{SplitSink, SplitStream};
use tokio::net::TcpStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::info;
use tungstenite::Message;

use crate::{BitfeedError, Result};

pub use connection::{ConnectionState, FeedClient};
pub use emitter::EventEmitter;
pub use handler::MessageDispatcher;
pub use registry::{BindingState, ChannelBinding, ChannelRegistry};
pub use subscription::{CandleParams, SubscriptionRequest};

/// Write half of a Bitfinex WebSocket connection.
pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Read half of a Bitfinex WebSocket connection.
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Establishes a WebSocket connection to the given URL.
///
/// # Errors
///
/// Returns [`BitfeedError::Connection`] if the TCP connect, TLS handshake or
/// WebSocket upgrade fails.
pub async fn connect(url: &str) -> Result<(WsWriter, WsReader)> {
    let (ws_stream, _) = connect_async(url)
        .await
        .map_err(BitfeedError::Connection)?;
    info!("WebSocket handshake completed");

    Ok(ws_stream.split())
}
