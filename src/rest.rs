//! Historical market data over the Bitfinex REST V2 API.
//!
//! Responses use the same positional rows as the WebSocket stream, so trades
//! and candles are decoded with [`Trade::decode`] and [`Candle::decode`].

use std::collections::HashMap;

use reqwest::Url;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::models::{Candle, Trade};
use crate::period::{candle_key, period_code};
use crate::websocket::CandleParams;
use crate::{BitfeedError, Result};

/// Stateless client for the public history endpoints.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
}

impl RestClient {
    /// Creates a client for `base_url` (e.g. `https://api-pub.bitfinex.com/v2`).
    ///
    /// # Errors
    ///
    /// Returns [`BitfeedError::Config`] if the URL cannot be parsed or cannot
    /// carry path segments.
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Like [`RestClient::new`] with a preconfigured HTTP client.
    ///
    /// # Errors
    ///
    /// See [`RestClient::new`].
    pub fn with_client(http: reqwest::Client, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| BitfeedError::Config(format!("invalid REST base URL {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(BitfeedError::Config(format!(
                "REST base URL {base_url} cannot carry a path"
            )));
        }

        Ok(Self { http, base_url })
    }

    /// Fetches the most recent `limit` trades of `symbol`.
    ///
    /// # Errors
    ///
    /// Returns [`BitfeedError::InvalidArgument`] for a zero limit, an HTTP
    /// error if the request fails, or [`BitfeedError::Decode`] if any row is
    /// malformed.
    pub async fn trades(&self, symbol: &str, limit: u32) -> Result<Vec<Trade>> {
        if limit == 0 {
            return Err(BitfeedError::InvalidArgument("limit must be positive".into()));
        }

        let url = build_url(
            &self.base_url,
            &["trades", symbol, "hist"],
            &[("limit", Some(limit.to_string()))],
        )?;
        let body = self.get_json(url).await?;
        decode_rows(&body, |row| Trade::decode(symbol, row))
    }

    /// Fetches candles of `symbol` for the period, limit and time range in
    /// `params`.
    ///
    /// # Errors
    ///
    /// Period errors are returned before any request is made. Otherwise an
    /// HTTP error if the request fails, or [`BitfeedError::Decode`] if any
    /// row is malformed.
    pub async fn candles(&self, symbol: &str, params: &CandleParams) -> Result<Vec<Candle>> {
        let code = period_code(params.period_secs)?;
        let key = candle_key(code, symbol);

        let url = build_url(
            &self.base_url,
            &["candles", key.as_str(), "hist"],
            &[
                ("limit", params.limit.map(|l| l.to_string())),
                ("start", params.start.map(|t| t.timestamp_millis().to_string())),
                ("end", params.end.map(|t| t.timestamp_millis().to_string())),
            ],
        )?;
        let body = self.get_json(url).await?;
        decode_rows(&body, |row| Candle::decode(symbol, row))
    }

    /// Fetches the last price of each symbol.
    ///
    /// # Errors
    ///
    /// Returns [`BitfeedError::InvalidArgument`] for an empty symbol list, an
    /// HTTP error if the request fails, or [`BitfeedError::Decode`] if the
    /// response is malformed.
    pub async fn tickers(&self, symbols: &[&str]) -> Result<HashMap<String, Decimal>> {
        if symbols.is_empty() {
            return Err(BitfeedError::InvalidArgument(
                "at least one symbol is required".into(),
            ));
        }

        let url = build_url(
            &self.base_url,
            &["tickers"],
            &[("symbols", Some(symbols.join(",")))],
        )?;
        let body = self.get_json(url).await?;
        parse_tickers(&body)
    }

    async fn get_json(&self, url: Url) -> Result<Value> {
        debug!(%url, "GET");
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

/// Appends path segments and the present query parameters to `base`.
///
/// Parameters whose value is `None` or empty are omitted. A trailing slash
/// on `base` is ignored.
///
/// # Errors
///
/// Returns [`BitfeedError::InvalidArgument`] for an empty path segment, or
/// [`BitfeedError::Config`] if `base` cannot carry a path.
pub fn build_url(base: &Url, segments: &[&str], params: &[(&str, Option<String>)]) -> Result<Url> {
    let mut url = base.clone();
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|()| BitfeedError::Config(format!("{base} cannot carry a path")))?;
        path.pop_if_empty();
        for segment in segments {
            let segment = segment.trim_matches('/');
            if segment.trim().is_empty() {
                return Err(BitfeedError::InvalidArgument(
                    "path segment must not be empty".into(),
                ));
            }
            path.push(segment);
        }
    }

    let present: Vec<(&str, &str)> = params
        .iter()
        .filter_map(|(name, value)| {
            value
                .as_deref()
                .filter(|v| !v.trim().is_empty())
                .map(|v| (*name, v))
        })
        .collect();
    if !present.is_empty() {
        url.query_pairs_mut().extend_pairs(present);
    }

    Ok(url)
}

fn decode_rows<T>(body: &Value, decode: impl Fn(&Value) -> Result<T>) -> Result<Vec<T>> {
    body.as_array()
        .ok_or_else(|| BitfeedError::Decode(format!("expected an array of rows, got {body}")))?
        .iter()
        .map(decode)
        .collect()
}

/// Maps each ticker row `[SYMBOL, PRICE, ...]` to its price. Rows that are
/// not arrays of at least two elements are skipped.
fn parse_tickers(body: &Value) -> Result<HashMap<String, Decimal>> {
    let rows = body
        .as_array()
        .ok_or_else(|| BitfeedError::Decode(format!("expected an array of tickers, got {body}")))?;

    let mut prices = HashMap::with_capacity(rows.len());
    for row in rows {
        let Some(row) = row.as_array().filter(|r| r.len() >= 2) else {
            continue;
        };
        let symbol = row[0]
            .as_str()
            .ok_or_else(|| BitfeedError::Decode(format!("ticker symbol is not a string: {}", row[0])))?;
        let price = <Decimal as Deserialize>::deserialize(&row[1])
            .map_err(|e| BitfeedError::Decode(format!("ticker price for {symbol}: {e}")))?;
        prices.insert(symbol.to_string(), price);
    }

    Ok(prices)
}
