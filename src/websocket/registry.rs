//! Channel bookkeeping between subscriptions and exchange channel ids.
//!
//! [`ChannelRegistry`] is the single source of truth for routing data frames:
//! a binding is recorded as Pending when a subscribe request goes out and is
//! confirmed with the exchange-assigned channel id when the matching
//! `subscribed` event arrives. Every operation runs under one lock, so the
//! caller side (subscribe/unsubscribe) and the read loop (confirm/resolve)
//! never observe a half-updated table.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::models::StreamKind;
use crate::{BitfeedError, Result};

/// Lifecycle of a channel binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    /// Subscribe sent, no channel id assigned yet.
    Pending,
    /// Channel id assigned by the exchange.
    Confirmed(u64),
}

/// A subscription to one stream of one symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelBinding {
    pub symbol: String,
    pub kind: StreamKind,
    pub state: BindingState,
}

impl ChannelBinding {
    /// The exchange channel id, once confirmed.
    pub fn chan_id(&self) -> Option<u64> {
        match self.state {
            BindingState::Confirmed(id) => Some(id),
            BindingState::Pending => None,
        }
    }
}

type BindingKey = (String, StreamKind);

#[derive(Debug, Default)]
struct Table {
    bindings: HashMap<BindingKey, ChannelBinding>,
    by_chan_id: HashMap<u64, BindingKey>,
}

/// Thread-safe bidirectional map between `(symbol, kind)` and channel id.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    table: Mutex<Table>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        // Every operation leaves the table consistent before it can panic.
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts a Pending binding for `(symbol, kind)`.
    ///
    /// # Errors
    ///
    /// Returns [`BitfeedError::DuplicateSubscription`] if a Pending or
    /// Confirmed binding already exists.
    pub fn record_pending(&self, symbol: &str, kind: StreamKind) -> Result<()> {
        let mut table = self.lock();
        let key = (symbol.to_string(), kind);
        if table.bindings.contains_key(&key) {
            return Err(BitfeedError::DuplicateSubscription {
                symbol: symbol.to_string(),
                kind,
            });
        }

        table.bindings.insert(
            key,
            ChannelBinding {
                symbol: symbol.to_string(),
                kind,
                state: BindingState::Pending,
            },
        );
        Ok(())
    }

    /// Confirms the Pending binding for `(symbol, kind)` with `chan_id`.
    ///
    /// Returns `true` if a binding was confirmed. Out-of-order or duplicate
    /// confirmations are logged and leave the table untouched.
    pub fn confirm(&self, symbol: &str, kind: StreamKind, chan_id: u64) -> bool {
        let mut guard = self.lock();
        let table = &mut *guard;

        if let Some(owner) = table.by_chan_id.get(&chan_id) {
            warn!(chan_id, owner = ?owner, symbol, %kind, "Channel id already bound");
            return false;
        }

        let key = (symbol.to_string(), kind);
        match table.bindings.get_mut(&key) {
            Some(binding) if binding.state == BindingState::Pending => {
                binding.state = BindingState::Confirmed(chan_id);
                table.by_chan_id.insert(chan_id, key);
                true
            }
            _ => {
                debug!(chan_id, symbol, %kind, "No pending binding to confirm");
                false
            }
        }
    }

    /// Returns the symbol of the only Pending binding of `kind`, if exactly
    /// one is outstanding.
    pub fn sole_pending(&self, kind: StreamKind) -> Option<String> {
        let table = self.lock();
        let mut pending = table
            .bindings
            .values()
            .filter(|b| b.kind == kind && b.state == BindingState::Pending);

        match (pending.next(), pending.next()) {
            (Some(binding), None) => Some(binding.symbol.clone()),
            _ => None,
        }
    }

    /// Resolves a channel id to its `(symbol, kind)`, or `None` if unbound.
    pub fn resolve(&self, chan_id: u64) -> Option<(String, StreamKind)> {
        self.lock().by_chan_id.get(&chan_id).cloned()
    }

    /// Returns a copy of the binding for `(symbol, kind)`.
    pub fn binding(&self, symbol: &str, kind: StreamKind) -> Option<ChannelBinding> {
        self.lock()
            .bindings
            .get(&(symbol.to_string(), kind))
            .cloned()
    }

    /// Removes the binding for `(symbol, kind)` and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`BitfeedError::UnknownSubscription`] if no binding exists; the
    /// table is left unchanged.
    pub fn remove(&self, symbol: &str, kind: StreamKind) -> Result<ChannelBinding> {
        let mut table = self.lock();
        let binding = table
            .bindings
            .remove(&(symbol.to_string(), kind))
            .ok_or_else(|| BitfeedError::UnknownSubscription {
                symbol: symbol.to_string(),
                kind,
            })?;

        if let Some(chan_id) = binding.chan_id() {
            table.by_chan_id.remove(&chan_id);
        }
        Ok(binding)
    }

    /// Puts back a binding returned by [`ChannelRegistry::remove`].
    ///
    /// Returns `false` and leaves the table untouched if the `(symbol, kind)`
    /// slot or the channel id has been taken in the meantime.
    pub fn restore(&self, binding: ChannelBinding) -> bool {
        let mut guard = self.lock();
        let table = &mut *guard;
        let key = (binding.symbol.clone(), binding.kind);
        let chan_taken = binding
            .chan_id()
            .is_some_and(|chan_id| table.by_chan_id.contains_key(&chan_id));
        if table.bindings.contains_key(&key) || chan_taken {
            debug!(symbol = binding.symbol, kind = %binding.kind, "Binding slot taken, not restored");
            return false;
        }

        if let Some(chan_id) = binding.chan_id() {
            table.by_chan_id.insert(chan_id, key.clone());
        }
        table.bindings.insert(key, binding);
        true
    }

    /// Drops the binding for `(symbol, kind)` only if it is still Pending.
    ///
    /// Used when the exchange rejects a subscribe request.
    pub fn discard_pending(&self, symbol: &str, kind: StreamKind) -> bool {
        let mut guard = self.lock();
        let table = &mut *guard;
        let key = (symbol.to_string(), kind);
        match table.bindings.get(&key) {
            Some(binding) if binding.state == BindingState::Pending => {
                table.bindings.remove(&key);
                true
            }
            _ => false,
        }
    }

    /// Drops every binding. Called when the connection closes.
    pub fn clear(&self) {
        let mut table = self.lock();
        table.bindings.clear();
        table.by_chan_id.clear();
    }

    /// Number of bindings, Pending and Confirmed.
    pub fn len(&self) -> usize {
        self.lock().bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
