//! Candle period codes.
//!
//! Bitfinex identifies candle timeframes with short codes (`"1m"`, `"1D"`,
//! ...) embedded in the candle key `trade:<PERIOD>:<SYMBOL>`.

use crate::{BitfeedError, Result};

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

/// Supported timeframes as (seconds, exchange code).
const PERIODS: [(i64, &str); 12] = [
    (MINUTE, "1m"),
    (5 * MINUTE, "5m"),
    (15 * MINUTE, "15m"),
    (30 * MINUTE, "30m"),
    (HOUR, "1h"),
    (3 * HOUR, "3h"),
    (6 * HOUR, "6h"),
    (12 * HOUR, "12h"),
    (DAY, "1D"),
    (7 * DAY, "1W"),
    (14 * DAY, "14D"),
    // The exchange treats a month as 30 days.
    (30 * DAY, "1M"),
];

/// Maps a candle duration in seconds to its exchange period code.
///
/// # Errors
///
/// Returns [`BitfeedError::InvalidArgument`] for zero or negative durations
/// and [`BitfeedError::UnsupportedPeriod`] for positive durations with no
/// exchange code.
pub fn period_code(seconds: i64) -> Result<&'static str> {
    if seconds <= 0 {
        return Err(BitfeedError::InvalidArgument(format!(
            "candle period must be positive, got {seconds}s"
        )));
    }

    PERIODS
        .iter()
        .find(|(secs, _)| *secs == seconds)
        .map(|(_, code)| *code)
        .ok_or(BitfeedError::UnsupportedPeriod(seconds))
}

/// Builds the candle key `trade:<PERIOD>:<SYMBOL>` used by both the
/// WebSocket subscribe message and the REST candles endpoint.
pub fn candle_key(code: &str, symbol: &str) -> String {
    format!("trade:{code}:{symbol}")
}

/// Extracts the symbol from a candle key, if it has the expected shape.
pub(crate) fn symbol_from_candle_key(key: &str) -> Option<&str> {
    let mut parts = key.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(_), Some(symbol)) if !symbol.is_empty() => Some(symbol),
        _ => None,
    }
}
