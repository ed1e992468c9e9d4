//! Listener registration and synchronous fan-out of decoded events.
//!
//! Listeners run inline on the read loop, in frame arrival order. A listener
//! that blocks stalls processing of every following frame; consumers doing
//! real work should take a bounded queue from [`EventEmitter::channel`]
//! instead.

use std::sync::{PoisonError, RwLock};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use crate::models::{Candle, MarketEvent, Trade, TradeSide};
use crate::{BitfeedError, Result};

type TradeListener = Box<dyn Fn(&Trade) + Send + Sync>;
type CandleListener = Box<dyn Fn(&Candle) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    buy: Vec<TradeListener>,
    sell: Vec<TradeListener>,
    candle: Vec<CandleListener>,
    /// Bounded queues handed out by [`EventEmitter::channel`].
    forwarders: Vec<mpsc::Sender<MarketEvent>>,
}

/// Multicasts decoded trades (split by side) and candles to listeners.
///
/// Registering a listener from inside a listener deadlocks.
#[derive(Default)]
pub struct EventEmitter {
    listeners: RwLock<Listeners>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for buy-side trades.
    pub fn on_buy_trade<F>(&self, listener: F)
    where
        F: Fn(&Trade) + Send + Sync + 'static,
    {
        self.write().buy.push(Box::new(listener));
    }

    /// Registers a listener for sell-side trades.
    pub fn on_sell_trade<F>(&self, listener: F)
    where
        F: Fn(&Trade) + Send + Sync + 'static,
    {
        self.write().sell.push(Box::new(listener));
    }

    /// Registers a listener for candles.
    pub fn on_candle<F>(&self, listener: F)
    where
        F: Fn(&Candle) + Send + Sync + 'static,
    {
        self.write().candle.push(Box::new(listener));
    }

    /// Returns a bounded queue receiving every event from now on.
    ///
    /// When the queue is full the event is dropped and a warning is logged,
    /// so a slow consumer never blocks the read loop. Forwarders of queues
    /// whose receiver has been dropped are removed here.
    ///
    /// # Errors
    ///
    /// Returns [`BitfeedError::InvalidArgument`] for a zero capacity.
    pub fn channel(&self, capacity: usize) -> Result<mpsc::Receiver<MarketEvent>> {
        if capacity == 0 {
            return Err(BitfeedError::InvalidArgument(
                "event queue capacity must be positive".into(),
            ));
        }
        let (tx, rx) = mpsc::channel(capacity);

        let mut listeners = self.write();
        listeners.forwarders.retain(|forwarder| !forwarder.is_closed());
        listeners.forwarders.push(tx);

        Ok(rx)
    }

    /// Delivers a trade to the listeners for its side.
    pub fn emit_trade(&self, trade: &Trade) {
        let listeners = self.read();
        let targets = match trade.side {
            TradeSide::Buy => &listeners.buy,
            TradeSide::Sell => &listeners.sell,
        };
        for listener in targets {
            listener(trade);
        }
        for tx in &listeners.forwarders {
            let event = match trade.side {
                TradeSide::Buy => MarketEvent::BuyTrade(trade.clone()),
                TradeSide::Sell => MarketEvent::SellTrade(trade.clone()),
            };
            forward(tx, event);
        }
    }

    /// Delivers a candle to every candle listener.
    pub fn emit_candle(&self, candle: &Candle) {
        let listeners = self.read();
        for listener in &listeners.candle {
            listener(candle);
        }
        for tx in &listeners.forwarders {
            forward(tx, MarketEvent::Candle(candle.clone()));
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Listeners> {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Listeners> {
        self.listeners.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn forward(tx: &mpsc::Sender<MarketEvent>, event: MarketEvent) {
    match tx.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => {
            warn!(?event, "Event queue full, dropping event");
        }
        // Receiver dropped; nothing left to deliver to.
        Err(TrySendError::Closed(_)) => {}
    }
}
