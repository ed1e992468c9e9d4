//! WebSocket connection lifecycle management.
//!
//! [`FeedClient`] owns the socket: `start` connects and spawns the read loop,
//! `stop` sends a normal-closure frame and cancels the loop. The read loop
//! owns the read half exclusively and processes frames one at a time, so
//! listeners see events in the order frames arrived. Subscribe/unsubscribe
//! share only the write half (behind an async mutex) and the
//! [`ChannelRegistry`] with it.

use std::sync::{Arc, Mutex, PoisonError};

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tungstenite::Message as WsMessage;
use tungstenite::protocol::CloseFrame;
use tungstenite::protocol::frame::coding::CloseCode;

use super::emitter::EventEmitter;
use super::handler::MessageDispatcher;
use super::registry::ChannelRegistry;
use super::{WsReader, WsWriter, connect};
use crate::models::{Candle, MarketEvent, Trade};
use crate::{BitfeedError, Result};

/// Lifecycle of the client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Handle to the spawned read loop.
struct ReaderTask {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Streaming client for Bitfinex public trades and candles.
///
/// All methods take `&self`; wrap the client in an [`Arc`] to subscribe
/// from several tasks.
pub struct FeedClient {
    url: String,
    state: Arc<Mutex<ConnectionState>>,
    writer: Arc<tokio::sync::Mutex<Option<WsWriter>>>,
    pub(super) registry: Arc<ChannelRegistry>,
    emitter: Arc<EventEmitter>,
    reader: tokio::sync::Mutex<Option<ReaderTask>>,
}

impl FeedClient {
    /// Creates a disconnected client for the given WebSocket URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            writer: Arc::new(tokio::sync::Mutex::new(None)),
            registry: Arc::new(ChannelRegistry::new()),
            emitter: Arc::new(EventEmitter::new()),
            reader: tokio::sync::Mutex::new(None),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *lock_state(&self.state)
    }

    /// The channel bindings of this connection.
    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Registers a listener for buy-side trades.
    pub fn on_buy_trade<F>(&self, listener: F)
    where
        F: Fn(&Trade) + Send + Sync + 'static,
    {
        self.emitter.on_buy_trade(listener);
    }

    /// Registers a listener for sell-side trades.
    pub fn on_sell_trade<F>(&self, listener: F)
    where
        F: Fn(&Trade) + Send + Sync + 'static,
    {
        self.emitter.on_sell_trade(listener);
    }

    /// Registers a listener for candles.
    pub fn on_candle<F>(&self, listener: F)
    where
        F: Fn(&Candle) + Send + Sync + 'static,
    {
        self.emitter.on_candle(listener);
    }

    /// Returns a bounded queue of every decoded event.
    ///
    /// See [`EventEmitter::channel`].
    ///
    /// # Errors
    ///
    /// Returns [`BitfeedError::InvalidArgument`] for a zero capacity.
    pub fn events(&self, capacity: usize) -> Result<tokio::sync::mpsc::Receiver<MarketEvent>> {
        self.emitter.channel(capacity)
    }

    /// Connects to the exchange and spawns the read loop.
    ///
    /// Allowed from `Disconnected` and `Closed`; a closed client starts over
    /// with an empty registry.
    ///
    /// # Errors
    ///
    /// Returns [`BitfeedError::AlreadyStarted`] if the client is not
    /// disconnected, or [`BitfeedError::Connection`] if the transport cannot
    /// be established, in which case the state returns to `Disconnected`.
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = lock_state(&self.state);
            match *state {
                ConnectionState::Disconnected | ConnectionState::Closed => {
                    *state = ConnectionState::Connecting;
                }
                other => return Err(BitfeedError::AlreadyStarted { state: other }),
            }
        }

        info!(url = %self.url, "Connecting to WebSocket");
        let (write, read) = match connect(&self.url).await {
            Ok(pair) => pair,
            Err(e) => {
                error!(url = %self.url, "Connection failed: {e}");
                set_state(&self.state, ConnectionState::Disconnected);
                return Err(e);
            }
        };

        self.registry.clear();
        *self.writer.lock().await = Some(write);
        set_state(&self.state, ConnectionState::Open);

        let (shutdown, shutdown_rx) = oneshot::channel();
        let dispatcher = MessageDispatcher::new(Arc::clone(&self.registry), Arc::clone(&self.emitter));
        let handle = tokio::spawn(read_loop(
            read,
            dispatcher,
            shutdown_rx,
            Arc::clone(&self.state),
            Arc::clone(&self.writer),
            Arc::clone(&self.registry),
        ));
        *self.reader.lock().await = Some(ReaderTask { shutdown, handle });

        info!("WebSocket connected");
        Ok(())
    }

    /// Closes the connection and drops every channel binding.
    ///
    /// Sends a normal-closure frame, cancels the read loop and waits for it
    /// to finish. Calling `stop` on a client that is not open is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`BitfeedError::NotConnected`] while a `start` is still
    /// connecting, or [`BitfeedError::Connection`] if the close frame could
    /// not be sent. The client ends up `Closed` either way.
    pub async fn stop(&self) -> Result<()> {
        {
            let mut state = lock_state(&self.state);
            match *state {
                ConnectionState::Open => *state = ConnectionState::Closing,
                ConnectionState::Connecting => {
                    return Err(BitfeedError::NotConnected { state: *state });
                }
                other => {
                    debug!(state = ?other, "Stop ignored, connection not open");
                    return Ok(());
                }
            }
        }

        let writer = self.writer.lock().await.take();
        let close_result = match writer {
            Some(mut write) => {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "client stop".into(),
                };
                match write.send(WsMessage::Close(Some(frame))).await {
                    Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                        Ok(())
                    }
                    other => other,
                }
            }
            None => Ok(()),
        };

        if let Some(task) = self.reader.lock().await.take() {
            // The loop may already have exited on its own.
            let _ = task.shutdown.send(());
            if let Err(e) = task.handle.await {
                warn!(error = %e, "Read loop task failed");
            }
        }

        self.registry.clear();
        set_state(&self.state, ConnectionState::Closed);
        info!("WebSocket connection closed");

        close_result.map_err(BitfeedError::Connection)
    }

    /// Fails with [`BitfeedError::NotConnected`] unless the socket is open.
    pub(super) fn ensure_open(&self) -> Result<()> {
        match self.state() {
            ConnectionState::Open => Ok(()),
            state => Err(BitfeedError::NotConnected { state }),
        }
    }

    /// Serializes `request` and sends it as a text frame.
    pub(super) async fn send<T: Serialize>(&self, request: &T) -> Result<()> {
        let json = serde_json::to_string(request)?;
        let mut guard = self.writer.lock().await;
        let write = guard.as_mut().ok_or(BitfeedError::NotConnected {
            state: self.state(),
        })?;

        debug!("Sending request: {}", json);
        write.send(WsMessage::Text(json.into())).await?;
        Ok(())
    }
}

/// Reads frames until cancelled or the transport ends.
///
/// Decode errors only drop the offending frame. If the transport ends while
/// the connection is still open, the client moves to `Closed` and forgets
/// all bindings.
async fn read_loop(
    mut read: WsReader,
    dispatcher: MessageDispatcher,
    mut shutdown: oneshot::Receiver<()>,
    state: Arc<Mutex<ConnectionState>>,
    writer: Arc<tokio::sync::Mutex<Option<WsWriter>>>,
    registry: Arc<ChannelRegistry>,
) {
    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        if let Err(e) = dispatcher.dispatch(&text) {
                            warn!(error = %e, "Dropped inbound frame");
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        info!(?frame, "Server closed connection");
                        break;
                    }
                    Some(Ok(_)) => {} // Binary/Ping/Pong frames
                    Some(Err(e)) => {
                        warn!("WebSocket error: {e}");
                        break;
                    }
                    None => {
                        warn!("WebSocket stream ended");
                        break;
                    }
                }
            }

            _ = &mut shutdown => {
                debug!("Read loop cancelled");
                return;
            }
        }
    }

    let was_open = {
        let mut state = lock_state(&state);
        if *state == ConnectionState::Open {
            *state = ConnectionState::Closed;
            true
        } else {
            false
        }
    };
    if was_open {
        writer.lock().await.take();
        registry.clear();
        info!("Connection closed by peer, bindings dropped");
    }
}

fn lock_state(state: &Mutex<ConnectionState>) -> std::sync::MutexGuard<'_, ConnectionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn set_state(state: &Mutex<ConnectionState>, next: ConnectionState) {
    let mut guard = lock_state(state);
    debug!(from = ?*guard, to = ?next, "Connection state change");
    *guard = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StreamKind;

    #[tokio::test]
    async fn failed_unsubscribe_keeps_binding() {
        let client = FeedClient::new("ws://127.0.0.1:1");
        // Open without a writer, so every send fails.
        set_state(&client.state, ConnectionState::Open);
        client.registry.record_pending("tBTCUSD", StreamKind::Trades).unwrap();
        client.registry.confirm("tBTCUSD", StreamKind::Trades, 17);

        let err = client.unsubscribe_trades("tBTCUSD").await.unwrap_err();

        assert!(matches!(err, BitfeedError::NotConnected { .. }));
        assert_eq!(
            client.registry.resolve(17),
            Some(("tBTCUSD".to_string(), StreamKind::Trades))
        );
    }

    #[tokio::test]
    async fn failed_subscribe_discards_pending() {
        let client = FeedClient::new("ws://127.0.0.1:1");
        set_state(&client.state, ConnectionState::Open);

        assert!(client.subscribe_trades("tBTCUSD").await.is_err());
        assert!(client.registry.is_empty());
    }
}
