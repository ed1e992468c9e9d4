//! Trade stream models and the positional trade decoder.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{BitfeedError, Result};

/// Taker side of an executed trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    /// Bitfinex signs the amount: positive for buys, negative (or zero) for sells.
    pub fn from_signed_amount(amount: Decimal) -> Self {
        if amount > Decimal::ZERO {
            TradeSide::Buy
        } else {
            TradeSide::Sell
        }
    }
}

/// A single executed trade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Absolute traded amount; the sign lives in [`Trade::side`].
    pub amount: Decimal,
    pub price: Decimal,
    pub side: TradeSide,
    pub symbol: String,
}

/// Leading fields `[ID, MTS, AMOUNT, PRICE]` of a trade row, shared by
/// snapshot entries, `te`/`tu` updates and the REST trades endpoint. Funding
/// rows (`fte`/`ftu`, `f` symbols) carry `[ID, MTS, AMOUNT, RATE, PERIOD]`;
/// the rate is read as the price and trailing fields are ignored.
#[derive(Debug, Deserialize)]
struct TradeRow(u64, i64, Decimal, Decimal);

impl Trade {
    /// Minimum number of elements in a trade row.
    pub const MIN_ROW_LEN: usize = 4;

    /// Decodes a positional trade row and attributes it to `symbol`.
    ///
    /// # Errors
    ///
    /// Returns [`BitfeedError::Decode`] if the row is not an array of at least
    /// four elements, a leading field has the wrong type, or the timestamp is
    /// out of range.
    pub fn decode(symbol: &str, row: &Value) -> Result<Self> {
        let fields = row
            .as_array()
            .filter(|fields| fields.len() >= Self::MIN_ROW_LEN)
            .ok_or_else(|| BitfeedError::Decode(format!("trade row {row}: expected at least 4 fields")))?;
        let leading = Value::Array(fields[..Self::MIN_ROW_LEN].to_vec());
        let TradeRow(id, mts, signed_amount, price) = TradeRow::deserialize(&leading)
            .map_err(|e| BitfeedError::Decode(format!("trade row {row}: {e}")))?;

        let timestamp = DateTime::from_timestamp_millis(mts)
            .ok_or_else(|| BitfeedError::Decode(format!("trade timestamp out of range: {mts}")))?;

        Ok(Self {
            id: id.to_string(),
            timestamp,
            amount: signed_amount.abs(),
            price,
            side: TradeSide::from_signed_amount(signed_amount),
            symbol: symbol.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn positive_amount_is_buy() {
        let trade = Trade::decode("tBTCUSD", &json!([1, 1699999999000_i64, 0.5, 30000])).unwrap();

        assert_eq!(trade.id, "1");
        assert_eq!(trade.side, TradeSide::Buy);
        assert_eq!(trade.amount, dec!(0.5));
        assert_eq!(trade.price, dec!(30000));
        assert_eq!(trade.symbol, "tBTCUSD");
        assert_eq!(trade.timestamp.timestamp_millis(), 1699999999000);
    }

    #[test]
    fn negative_amount_is_sell_with_sign_stripped() {
        let trade =
            Trade::decode("tETHUSD", &json!([42, 1699999999123_i64, -1.25, 2000.5])).unwrap();

        assert_eq!(trade.side, TradeSide::Sell);
        assert_eq!(trade.amount, dec!(1.25));
        assert_eq!(trade.price, dec!(2000.5));
    }

    #[test]
    fn zero_amount_is_sell() {
        let trade = Trade::decode("tBTCUSD", &json!([7, 1699999999000_i64, 0, 30000])).unwrap();
        assert_eq!(trade.side, TradeSide::Sell);
        assert_eq!(trade.amount, Decimal::ZERO);
    }

    #[test]
    fn small_amounts_keep_precision() {
        let trade =
            Trade::decode("tBTCUSD", &json!([7, 1699999999000_i64, 0.00000001, 30000.1])).unwrap();
        assert_eq!(trade.amount, dec!(0.00000001));
        assert_eq!(trade.price, dec!(30000.1));
    }

    #[test]
    fn rejects_short_rows() {
        assert!(matches!(
            Trade::decode("tBTCUSD", &json!([1, 1699999999000_i64, 0.5])),
            Err(BitfeedError::Decode(_))
        ));
        assert!(matches!(
            Trade::decode("tBTCUSD", &json!([])),
            Err(BitfeedError::Decode(_))
        ));
    }

    #[test]
    fn funding_row_uses_rate_and_ignores_period() {
        let trade =
            Trade::decode("fUSD", &json!([636854, 1699999999000_i64, 100.5, 0.0002, 2])).unwrap();

        assert_eq!(trade.id, "636854");
        assert_eq!(trade.side, TradeSide::Buy);
        assert_eq!(trade.amount, dec!(100.5));
        assert_eq!(trade.price, dec!(0.0002));
        assert_eq!(trade.symbol, "fUSD");
    }

    #[test]
    fn rejects_non_numeric_fields() {
        assert!(matches!(
            Trade::decode("tBTCUSD", &json!([1, "yesterday", 0.5, 30000])),
            Err(BitfeedError::Decode(_))
        ));
        assert!(matches!(
            Trade::decode("tBTCUSD", &json!({"id": 1})),
            Err(BitfeedError::Decode(_))
        ));
    }
}
