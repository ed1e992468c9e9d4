//! Bitfinex public market data client.
//!
//! Streams live trades and candles over the Bitfinex WebSocket V2 API and
//! fetches historical snapshots (trades, candles, tickers) over REST.

pub mod config;
pub mod error;
pub mod models;
pub mod period;
pub mod rest;
pub mod websocket;

pub use error::{BitfeedError, Result};
