//! Incoming WebSocket frame classification and routing.
//!
//! Keyed-object frames are control events (subscription lifecycle, info,
//! errors). Array frames carry market data and start with the channel id,
//! which is resolved through the [`ChannelRegistry`] to the owning symbol and
//! stream before decoding.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, trace, warn};

use super::emitter::EventEmitter;
use super::registry::{BindingState, ChannelRegistry};
use crate::models::{Candle, ControlEvent, StreamKind, Trade};
use crate::period::symbol_from_candle_key;
use crate::{BitfeedError, Result};

/// Trade update codes: executed/updated, for exchange and funding trades.
const TRADE_UPDATE_CODES: [&str; 4] = ["te", "tu", "fte", "ftu"];

/// Payload marker of a channel heartbeat frame `[chanId, "hb"]`.
const HEARTBEAT: &str = "hb";

/// Routes raw inbound frames to the registry and the event emitter.
pub struct MessageDispatcher {
    registry: Arc<ChannelRegistry>,
    emitter: Arc<EventEmitter>,
}

impl MessageDispatcher {
    pub fn new(registry: Arc<ChannelRegistry>, emitter: Arc<EventEmitter>) -> Self {
        Self { registry, emitter }
    }

    /// Classifies and handles one text frame.
    ///
    /// Unknown channel ids, heartbeats and unrecognized control events are
    /// dropped without error.
    ///
    /// # Errors
    ///
    /// Returns [`BitfeedError::Decode`] if the frame is not valid JSON or its
    /// shape does not match the stream it belongs to. The error concerns this
    /// frame only.
    pub fn dispatch(&self, text: &str) -> Result<()> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| BitfeedError::Decode(format!("invalid JSON frame: {e}")))?;

        match value {
            Value::Array(frame) => self.handle_data_frame(&frame),
            Value::Object(_) => self.handle_control_frame(value),
            other => {
                debug!(frame = %other, "Ignoring scalar frame");
                Ok(())
            }
        }
    }

    fn handle_control_frame(&self, value: Value) -> Result<()> {
        let event: ControlEvent = serde_json::from_value(value)
            .map_err(|e| BitfeedError::Decode(format!("control frame: {e}")))?;

        match event.event.as_str() {
            "subscribe" | "unsubscribe" => {
                debug!(event = event.event, "Ignoring request echo");
            }
            "subscribed" => self.handle_subscribed(&event),
            "unsubscribed" => {
                info!(chan_id = ?event.chan_id, status = ?event.status, "Unsubscribed from channel");
            }
            "info" => {
                debug!(code = ?event.code, msg = ?event.msg, "Server info");
            }
            "error" => self.handle_error(&event),
            other => {
                debug!(event = other, "Ignoring control event");
            }
        }

        Ok(())
    }

    fn handle_subscribed(&self, event: &ControlEvent) {
        let kind = event.channel.as_deref().and_then(StreamKind::from_wire);
        let (Some(chan_id), Some(kind)) = (event.chan_id, kind) else {
            debug!(channel = ?event.channel, chan_id = ?event.chan_id, "Ignoring subscription to unsupported channel");
            return;
        };

        let Some(symbol) = self.owning_symbol(kind, event) else {
            warn!(chan_id, %kind, "Cannot attribute subscription confirmation to a pending subscription");
            return;
        };

        if self.registry.confirm(&symbol, kind, chan_id) {
            info!(chan_id, symbol, %kind, "Subscription confirmed");
        }
    }

    /// Picks the Pending binding a confirmation refers to: the echoed
    /// symbol/key or trading pair when one of them is Pending, otherwise the
    /// only Pending binding of that kind.
    ///
    /// The exchange may normalize the echo (`BTCUSD` comes back as
    /// `tBTCUSD`), so an echo without a Pending match is not conclusive.
    fn owning_symbol(&self, kind: StreamKind, event: &ControlEvent) -> Option<String> {
        let echoes = [echoed_symbol(kind, event), event.pair.clone()];
        for symbol in echoes.into_iter().flatten() {
            if self
                .registry
                .binding(&symbol, kind)
                .is_some_and(|b| b.state == BindingState::Pending)
            {
                return Some(symbol);
            }
            debug!(symbol, %kind, "Echo matches no pending binding");
        }

        self.registry.sole_pending(kind)
    }

    fn handle_error(&self, event: &ControlEvent) {
        warn!(code = ?event.code, msg = ?event.msg, channel = ?event.channel, "Exchange error event");

        let Some(kind) = event.channel.as_deref().and_then(StreamKind::from_wire) else {
            return;
        };
        let echoes = [echoed_symbol(kind, event), event.pair.clone()];
        if let Some(symbol) = echoes
            .into_iter()
            .flatten()
            .find(|symbol| self.registry.discard_pending(symbol, kind))
        {
            info!(symbol, %kind, "Discarded rejected subscription");
        }
    }

    fn handle_data_frame(&self, frame: &[Value]) -> Result<()> {
        let chan_id = frame
            .first()
            .and_then(Value::as_u64)
            .ok_or_else(|| BitfeedError::Decode("data frame without channel id".into()))?;

        if frame.get(1).and_then(Value::as_str) == Some(HEARTBEAT) {
            trace!(chan_id, "Heartbeat");
            return Ok(());
        }

        // Trailing frames after an unsubscribe land here.
        let Some((symbol, kind)) = self.registry.resolve(chan_id) else {
            debug!(chan_id, "Dropping frame for unknown channel");
            return Ok(());
        };

        match kind {
            StreamKind::Trades => self.handle_trades(chan_id, &symbol, frame),
            StreamKind::Candles => self.handle_candles(chan_id, &symbol, frame),
        }
    }

    fn handle_trades(&self, chan_id: u64, symbol: &str, frame: &[Value]) -> Result<()> {
        if frame.len() > 2 {
            let code = frame[1].as_str().ok_or_else(|| {
                BitfeedError::Decode(format!("trade update without message code on channel {chan_id}"))
            })?;
            if !TRADE_UPDATE_CODES.contains(&code) {
                debug!(chan_id, code, "Ignoring trade message code");
                return Ok(());
            }

            let trade = Trade::decode(symbol, &frame[2])?;
            self.emitter.emit_trade(&trade);
            return Ok(());
        }

        let rows = frame.get(1).and_then(Value::as_array).ok_or_else(|| {
            BitfeedError::Decode(format!("trade snapshot is not an array on channel {chan_id}"))
        })?;
        debug!(chan_id, symbol, rows = rows.len(), "Trade snapshot");
        for row in rows {
            match Trade::decode(symbol, row) {
                Ok(trade) => self.emitter.emit_trade(&trade),
                Err(e) => warn!(chan_id, symbol, error = %e, "Skipping malformed trade row"),
            }
        }

        Ok(())
    }

    fn handle_candles(&self, chan_id: u64, symbol: &str, frame: &[Value]) -> Result<()> {
        let payload = frame.get(1).and_then(Value::as_array).ok_or_else(|| {
            BitfeedError::Decode(format!("candle payload is not an array on channel {chan_id}"))
        })?;

        let is_snapshot = payload.is_empty()
            || payload.len() > Candle::ROW_LEN
            || payload.first().is_some_and(Value::is_array);

        if !is_snapshot {
            let candle = Candle::decode(symbol, &frame[1])?;
            self.emitter.emit_candle(&candle);
            return Ok(());
        }

        debug!(chan_id, symbol, rows = payload.len(), "Candle snapshot");
        for row in payload {
            match Candle::decode(symbol, row) {
                Ok(candle) => self.emitter.emit_candle(&candle),
                Err(e) => warn!(chan_id, symbol, error = %e, "Skipping malformed candle row"),
            }
        }

        Ok(())
    }
}

/// The symbol echoed by a control event: `symbol` for trades, the candle
/// `key` for candles.
fn echoed_symbol(kind: StreamKind, event: &ControlEvent) -> Option<String> {
    match kind {
        StreamKind::Trades => event.symbol.clone(),
        StreamKind::Candles => event
            .key
            .as_deref()
            .and_then(symbol_from_candle_key)
            .map(String::from),
    }
}
