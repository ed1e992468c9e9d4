//! Shared models for Bitfinex WebSocket V2 messages.
//!
//! Contains stream kinds, outbound subscribe/unsubscribe requests, inbound
//! control events and the decoded market events handed to listeners.

pub mod candle;
pub mod trade;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use candle::Candle;
pub use trade::{Trade, TradeSide};

/// Public data streams this client can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Trades,
    /// OHLCV candlestick data.
    Candles,
}

impl StreamKind {
    /// Returns the wire-format channel name expected by the Bitfinex API.
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Trades => "trades",
            StreamKind::Candles => "candles",
        }
    }

    /// Parses a wire-format channel name.
    pub fn from_wire(channel: &str) -> Option<Self> {
        match channel {
            "trades" => Some(StreamKind::Trades),
            "candles" => Some(StreamKind::Candles),
            _ => None,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `subscribe` request sent to the Bitfinex WebSocket API.
///
/// Trade streams are addressed by `symbol`, candle streams by `key`.
#[derive(Debug, Serialize)]
pub struct SubscribeRequest {
    pub event: String,
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl SubscribeRequest {
    /// Subscribe request for the trades stream of `symbol`.
    pub fn trades(symbol: &str) -> Self {
        Self {
            event: "subscribe".to_string(),
            channel: StreamKind::Trades.as_str().to_string(),
            symbol: Some(symbol.to_string()),
            key: None,
        }
    }

    /// Subscribe request for the candle stream identified by `key`
    /// (`trade:<PERIOD>:<SYMBOL>`).
    pub fn candles(key: String) -> Self {
        Self {
            event: "subscribe".to_string(),
            channel: StreamKind::Candles.as_str().to_string(),
            symbol: None,
            key: Some(key),
        }
    }
}

/// An `unsubscribe` request sent to the Bitfinex WebSocket API.
#[derive(Debug, Serialize)]
pub struct UnsubscribeRequest {
    pub event: String,
    #[serde(rename = "chanId")]
    pub chan_id: u64,
}

impl UnsubscribeRequest {
    pub fn new(chan_id: u64) -> Self {
        Self {
            event: "unsubscribe".to_string(),
            chan_id,
        }
    }
}

/// A keyed-object control frame received from the server.
///
/// The fields present depend on the event type (`info`, `subscribed`,
/// `unsubscribed`, `error`, ...). A missing `event` reads as empty.
#[derive(Debug, Deserialize)]
pub struct ControlEvent {
    #[serde(default)]
    pub event: String,
    #[serde(rename = "chanId")]
    pub chan_id: Option<u64>,
    pub channel: Option<String>,
    /// Echoed on trade subscriptions.
    pub symbol: Option<String>,
    /// Echoed on candle subscriptions (`trade:<PERIOD>:<SYMBOL>`).
    pub key: Option<String>,
    /// Trading pair without the `t` prefix, echoed on trade subscriptions.
    pub pair: Option<String>,
    pub status: Option<String>,
    pub msg: Option<String>,
    pub code: Option<i64>,
}

/// A decoded market event, as delivered through a bounded event queue.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    BuyTrade(Trade),
    SellTrade(Trade),
    Candle(Candle),
}
