//! OHLCV candlestick models and the positional candle decoder.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{BitfeedError, Result};

/// A single OHLCV candlestick bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candle {
    pub symbol: String,
    /// Start of this candle's time window.
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Wire row `[MTS, OPEN, CLOSE, HIGH, LOW, VOLUME]`. Note that close comes
/// before high and low.
#[derive(Debug, Deserialize)]
struct CandleRow(i64, Decimal, Decimal, Decimal, Decimal, Decimal);

impl Candle {
    /// Number of elements in a single candle row.
    pub const ROW_LEN: usize = 6;

    /// Decodes a positional candle row and attributes it to `symbol`.
    ///
    /// # Errors
    ///
    /// Returns [`BitfeedError::Decode`] if the row does not have exactly six
    /// elements, a field is not numeric, or the timestamp is out of range.
    pub fn decode(symbol: &str, row: &serde_json::Value) -> Result<Self> {
        let CandleRow(mts, open, close, high, low, volume) = CandleRow::deserialize(row)
            .map_err(|e| BitfeedError::Decode(format!("candle row {row}: {e}")))?;

        let open_time = DateTime::from_timestamp_millis(mts)
            .ok_or_else(|| BitfeedError::Decode(format!("candle timestamp out of range: {mts}")))?;

        Ok(Self {
            symbol: symbol.to_string(),
            open_time,
            open,
            high,
            low,
            close,
            volume,
        })
    }
}
