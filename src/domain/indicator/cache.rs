//! Incremental memoization store for derived indicators.
//!
//! Each slot is either [`Slot::Uncomputed`] or [`Slot::Computed`]. A computed
//! value may itself be `Num::NaN` (a legitimately missing value, e.g. during
//! warm-up); that never reads as "not computed yet".
//!
//! A request for index `i` first grows the store, then scans backwards to the
//! nearest computed slot (or index 0) and forward-fills from there. Recursive
//! formulas such as an EMA therefore always find `value(i - 1)` already
//! stored, and `calculate` runs at most once per index.
//!
//! The lock is released while `calculate` runs so a formula may re-enter its
//! own indicator. The store is single-writer: concurrent calls on one
//! instance stay memory-safe but may compute a slot twice, so parallel callers
//! should use separate indicator instances.

use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone)]
enum Slot<T> {
    Uncomputed,
    Computed(T),
}

#[derive(Debug)]
pub struct CachedValues<T> {
    slots: Mutex<Vec<Slot<T>>>,
}

impl<T: Clone> Default for CachedValues<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> CachedValues<T> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Slot<T>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the value at `index`, computing it and any uncomputed
    /// predecessors back to the nearest computed slot.
    ///
    /// Callers are expected to have bounds-checked `index` against the series.
    pub fn get_or_compute<F>(&self, index: usize, calculate: F) -> T
    where
        F: Fn(usize) -> T,
    {
        let start = {
            let mut slots = self.lock();
            if slots.len() <= index {
                slots.resize_with(index + 1, || Slot::Uncomputed);
            }
            if let Slot::Computed(value) = &slots[index] {
                return value.clone();
            }
            let mut start = index;
            while start > 0 && matches!(slots[start - 1], Slot::Uncomputed) {
                start -= 1;
            }
            start
        };

        if start < index {
            tracing::trace!(from = start, to = index, "filling indicator cache");
        }
        for j in start..index {
            self.fill(j, &calculate);
        }
        self.fill(index, &calculate)
    }

    fn fill<F>(&self, index: usize, calculate: &F) -> T
    where
        F: Fn(usize) -> T,
    {
        if let Slot::Computed(value) = &self.lock()[index] {
            return value.clone();
        }
        let value = calculate(index);
        let mut slots = self.lock();
        match &slots[index] {
            // a re-entrant call got here first; keep the stored value
            Slot::Computed(existing) => existing.clone(),
            Slot::Uncomputed => {
                slots[index] = Slot::Computed(value.clone());
                value
            }
        }
    }

    pub fn is_computed(&self, index: usize) -> bool {
        matches!(self.lock().get(index), Some(Slot::Computed(_)))
    }

    /// Number of slots currently holding a value.
    pub fn computed_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|slot| matches!(slot, Slot::Computed(_)))
            .count()
    }
}
