//! Root-slot bookkeeping shared by the mark-sweep and generational backends.
//!
//! The C original (`examples/original_source/src/gc/mark_sweep.c` and
//! `generational.c`) duplicates an open-addressed hash table mapping slot
//! address → index, purely so `add_root`/`remove_root` are O(1) instead of
//! an O(n) linear scan. We get the same complexity from [`rustc_hash::FxHashMap`]
//! instead of hand-rolling probing, and keep the dense array + swap-remove
//! behaviour the C source relies on (removing a slot swaps the last
//! registered slot into the freed array position rather than shifting).

use rustc_hash::FxHashMap;

use crate::object::RootSlot;

fn slot_key(slot: RootSlot) -> usize {
    slot as usize
}

/// A deduplicated, order-unstable set of root slots.
///
/// Registration and removal are both O(1) amortised; iteration order is the
/// dense-array order, which is unspecified and may change after a removal
/// (the last slot is swapped into the freed index).
#[derive(Default)]
pub struct RootTable {
    slots: Vec<RootSlot>,
    index: FxHashMap<usize, usize>,
}

impl RootTable {
    /// Create an empty root table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `slot`. A null slot is silently ignored (spec: "Silent
    /// no-op if slot is null"). Re-registering an already-registered slot
    /// is idempotent.
    pub fn add(&mut self, slot: RootSlot) {
        if slot.is_null() {
            return;
        }
        let key = slot_key(slot);
        if self.index.contains_key(&key) {
            return;
        }
        let idx = self.slots.len();
        self.slots.push(slot);
        self.index.insert(key, idx);
    }

    /// Unregister `slot`. A no-op if `slot` is null or was never
    /// registered.
    pub fn remove(&mut self, slot: RootSlot) {
        if slot.is_null() {
            return;
        }
        let key = slot_key(slot);
        let Some(idx) = self.index.remove(&key) else {
            return;
        };
        let last_idx = self.slots.len() - 1;
        if idx != last_idx {
            let moved = self.slots[last_idx];
            self.slots[idx] = moved;
            self.index.insert(slot_key(moved), idx);
        }
        self.slots.pop();
    }

    /// Number of registered slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether any slot is registered.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterate over every registered slot.
    pub fn iter(&self) -> impl Iterator<Item = RootSlot> + '_ {
        self.slots.iter().copied()
    }
}
