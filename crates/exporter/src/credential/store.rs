// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory token store: one authoritative record, replaced atomically.

use parking_lot::RwLock;
use tokio::sync::watch;

use crate::credential::TokenRecord;

struct Slot {
    record: Option<TokenRecord>,
    /// Last generation handed out. Starts at 0, so live records are >= 1.
    generation: u64,
}

impl Slot {
    fn holds(&self, generation: u64) -> bool {
        self.record.as_ref().is_some_and(|r| r.generation == generation)
    }
}

/// Holds the current [`TokenRecord`].
///
/// Every mutation bumps the generation and publishes it on a watch channel
/// while the write lock is held, so observers see changes in store order.
/// The lock is never held across an `.await`.
pub struct TokenStore {
    slot: RwLock<Slot>,
    changes: watch::Sender<u64>,
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self { slot: RwLock::new(Slot { record: None, generation: 0 }), changes }
    }

    pub fn get(&self) -> Option<TokenRecord> {
        self.slot.read().record.clone()
    }

    /// Replace the current record. Returns the generation assigned to it.
    pub fn set(&self, mut record: TokenRecord) -> u64 {
        let mut slot = self.slot.write();
        slot.generation += 1;
        record.generation = slot.generation;
        slot.record = Some(record);
        self.changes.send_replace(slot.generation);
        slot.generation
    }

    pub fn clear(&self) {
        let mut slot = self.slot.write();
        slot.generation += 1;
        slot.record = None;
        self.changes.send_replace(slot.generation);
    }

    /// Replace the record only if `expected` is still the current generation.
    ///
    /// On mismatch the newer record (or `None` if the store was cleared) is
    /// returned and nothing changes.
    pub fn replace_if(
        &self,
        expected: u64,
        mut record: TokenRecord,
    ) -> Result<TokenRecord, Option<TokenRecord>> {
        let mut slot = self.slot.write();
        if !slot.holds(expected) {
            return Err(slot.record.clone());
        }
        slot.generation += 1;
        record.generation = slot.generation;
        slot.record = Some(record.clone());
        self.changes.send_replace(slot.generation);
        Ok(record)
    }

    /// Clear the store only if `expected` is still the current generation.
    pub fn clear_if(&self, expected: u64) -> bool {
        let mut slot = self.slot.write();
        if !slot.holds(expected) {
            return false;
        }
        slot.generation += 1;
        slot.record = None;
        self.changes.send_replace(slot.generation);
        true
    }

    /// Subscribe to store changes. The value is the latest generation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
