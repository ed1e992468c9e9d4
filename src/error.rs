//! Crate-level error types.
//!
//! [`BitfeedError`] unifies every error source (configuration, transport,
//! subscription bookkeeping, frame decoding) behind a single enum so callers
//! can match on the variant they care about while still using `?`.

use crate::models::StreamKind;
use crate::websocket::ConnectionState;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BitfeedError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum BitfeedError {
    /// Configuration values are missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The WebSocket transport could not be established or closed cleanly.
    #[error("connection error: {0}")]
    Connection(#[source] tungstenite::Error),

    /// `start` was called while a connection is already live.
    #[error("client already started (state: {state:?})")]
    AlreadyStarted { state: ConnectionState },

    /// A subscription operation was attempted while the socket is not open.
    #[error("not connected (state: {state:?})")]
    NotConnected { state: ConnectionState },

    /// A binding for this symbol and stream already exists.
    #[error("already subscribed to {kind} for {symbol}")]
    DuplicateSubscription { symbol: String, kind: StreamKind },

    /// No binding exists for this symbol and stream.
    #[error("no {kind} subscription for {symbol}")]
    UnknownSubscription { symbol: String, kind: StreamKind },

    /// A single inbound frame or REST row could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The candle period has no exchange code.
    #[error("unsupported candle period: {0}s")]
    UnsupportedPeriod(i64),

    /// An argument failed validation before any network call.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A WebSocket send or receive failed on an established connection.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An HTTP request to the REST API failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
