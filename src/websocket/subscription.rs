//! Channel subscription and unsubscription operations.

use chrono::{DateTime, Utc};
use tracing::info;

use super::connection::FeedClient;
use crate::models::{StreamKind, SubscribeRequest, UnsubscribeRequest};
use crate::period::{candle_key, period_code};
use crate::{BitfeedError, Result};

/// Candle stream parameters.
///
/// The WebSocket stream only uses the period; `limit` and the time range
/// apply to historical queries through [`RestClient::candles`](crate::rest::RestClient::candles).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandleParams {
    pub period_secs: i64,
    pub limit: Option<u32>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl CandleParams {
    pub fn new(period_secs: i64) -> Self {
        Self {
            period_secs,
            limit: None,
            start: None,
            end: None,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_range(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.start = start;
        self.end = end;
        self
    }
}

/// A subscription to build an outbound subscribe message from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    pub symbol: String,
    pub kind: StreamKind,
    /// Required for [`StreamKind::Candles`].
    pub candle: Option<CandleParams>,
}

impl SubscriptionRequest {
    pub fn trades(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            kind: StreamKind::Trades,
            candle: None,
        }
    }

    pub fn candles(symbol: impl Into<String>, params: CandleParams) -> Self {
        Self {
            symbol: symbol.into(),
            kind: StreamKind::Candles,
            candle: Some(params),
        }
    }

    /// Validates the request and builds the wire message.
    ///
    /// # Errors
    ///
    /// Returns [`BitfeedError::InvalidArgument`] for an empty symbol or a
    /// candle request without parameters, and the period mapper's errors for
    /// an invalid candle period.
    pub fn to_message(&self) -> Result<SubscribeRequest> {
        if self.symbol.trim().is_empty() {
            return Err(BitfeedError::InvalidArgument("symbol must not be empty".into()));
        }

        match self.kind {
            StreamKind::Trades => Ok(SubscribeRequest::trades(&self.symbol)),
            StreamKind::Candles => {
                let params = self.candle.as_ref().ok_or_else(|| {
                    BitfeedError::InvalidArgument("candle subscription requires a period".into())
                })?;
                let code = period_code(params.period_secs)?;
                Ok(SubscribeRequest::candles(candle_key(code, &self.symbol)))
            }
        }
    }
}

impl FeedClient {
    /// Sends a subscribe request and records a Pending binding for it.
    ///
    /// The binding is confirmed by the read loop once the exchange answers
    /// with a `subscribed` event carrying the channel id.
    ///
    /// # Errors
    ///
    /// Validation errors are returned before anything is sent. Otherwise
    /// returns [`BitfeedError::NotConnected`] unless the connection is open,
    /// [`BitfeedError::DuplicateSubscription`] if the stream is already
    /// subscribed, or a WebSocket error if sending fails (the Pending binding
    /// is rolled back).
    pub async fn subscribe(&self, request: SubscriptionRequest) -> Result<()> {
        let message = request.to_message()?;
        self.ensure_open()?;
        self.registry.record_pending(&request.symbol, request.kind)?;

        if let Err(e) = self.send(&message).await {
            self.registry.discard_pending(&request.symbol, request.kind);
            return Err(e);
        }

        info!(
            channel = request.kind.as_str(),
            symbol = request.symbol,
            key = ?message.key,
            "Subscribe request sent"
        );
        Ok(())
    }

    /// Subscribes to executed trades of `symbol`.
    ///
    /// # Errors
    ///
    /// See [`FeedClient::subscribe`].
    pub async fn subscribe_trades(&self, symbol: &str) -> Result<()> {
        self.subscribe(SubscriptionRequest::trades(symbol)).await
    }

    /// Subscribes to candles of `symbol` with the given parameters.
    ///
    /// # Errors
    ///
    /// See [`FeedClient::subscribe`].
    pub async fn subscribe_candles(&self, symbol: &str, params: CandleParams) -> Result<()> {
        self.subscribe(SubscriptionRequest::candles(symbol, params)).await
    }

    /// Removes the binding for `(symbol, kind)` and, if the exchange already
    /// assigned a channel id, sends an unsubscribe request for it.
    ///
    /// # Errors
    ///
    /// Returns [`BitfeedError::NotConnected`] unless the connection is open,
    /// [`BitfeedError::UnknownSubscription`] if there is no such binding, or a
    /// WebSocket error if sending fails (the binding is put back).
    pub async fn unsubscribe(&self, symbol: &str, kind: StreamKind) -> Result<()> {
        self.ensure_open()?;
        let binding = self.registry.remove(symbol, kind)?;

        match binding.chan_id() {
            Some(chan_id) => {
                if let Err(e) = self.send(&UnsubscribeRequest::new(chan_id)).await {
                    // The exchange still streams the channel.
                    self.registry.restore(binding);
                    return Err(e);
                }
                info!(chan_id, symbol, channel = kind.as_str(), "Unsubscribe request sent");
            }
            None => {
                // Frames for the late confirmation will resolve to no binding.
                info!(symbol, channel = kind.as_str(), "Dropped unconfirmed subscription");
            }
        }

        Ok(())
    }

    /// Unsubscribes from trades of `symbol`.
    ///
    /// # Errors
    ///
    /// See [`FeedClient::unsubscribe`].
    pub async fn unsubscribe_trades(&self, symbol: &str) -> Result<()> {
        self.unsubscribe(symbol, StreamKind::Trades).await
    }

    /// Unsubscribes from candles of `symbol`.
    ///
    /// # Errors
    ///
    /// See [`FeedClient::unsubscribe`].
    pub async fn unsubscribe_candles(&self, symbol: &str) -> Result<()> {
        self.unsubscribe(symbol, StreamKind::Candles).await
    }
}
