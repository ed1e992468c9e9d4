//! Shared test utilities and constants.

#![allow(dead_code)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tungstenite::Message;

/// Bitfinex WebSocket V2 public endpoint URL.
pub const BITFINEX_WS_URL: &str = "wss://api.bitfinex.com/ws/2";

/// Bitfinex REST V2 public endpoint URL.
pub const BITFINEX_REST_URL: &str = "https://api-pub.bitfinex.com/v2";

/// Upper bound for any single wait in local tests.
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Server side of a mock exchange connection.
pub type ServerSocket = WebSocketStream<TcpStream>;

/// Binds a WebSocket server on an ephemeral local port and accepts exactly
/// one client. Returns the `ws://` URL and the pending server socket.
pub async fn mock_exchange() -> (String, JoinHandle<ServerSocket>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind mock exchange");
    let addr = listener.local_addr().expect("no local address");

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept failed");
        tokio_tungstenite::accept_async(stream)
            .await
            .expect("websocket handshake failed")
    });

    (format!("ws://{addr}"), server)
}

/// Waits for the next text frame from the client and parses it as JSON.
pub async fn next_json(ws: &mut ServerSocket) -> serde_json::Value {
    loop {
        let msg = tokio::time::timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for client frame")
            .expect("client stream ended")
            .expect("client stream errored");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("client sent invalid JSON");
        }
    }
}

/// Sends a text frame to the client.
pub async fn send_text(ws: &mut ServerSocket, text: &str) {
    ws.send(Message::Text(text.to_string().into()))
        .await
        .expect("failed to send to client");
}
