//! Bounds-checked slot arenas shared by the switch and coder registries.

use crate::{Error, Result};
use parking_lot::Mutex;

/// Minimum interval between two accepted edges on one slot.
pub const DEBOUNCE_US: u64 = 1_000;

/// Returned by a successful registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotHandle {
    index: usize,
}

impl SlotHandle {
    pub(crate) fn new(index: usize) -> Self {
        Self { index }
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Fixed-capacity arena of independently locked slots.
pub(crate) struct SlotArena<T> {
    slots: Box<[Mutex<T>]>,
}

impl<T: Default> SlotArena<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| Mutex::new(T::default())).collect(),
        }
    }
}

impl<T> SlotArena<T> {
    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Slot for a hardware-sourced call; out-of-range indices are ignored.
    #[inline]
    pub(crate) fn get(&self, index: usize) -> Option<&Mutex<T>> {
        self.slots.get(index)
    }

    /// Slot for a registration/query call; out-of-range indices are errors.
    #[inline]
    pub(crate) fn checked(&self, index: usize) -> Result<&Mutex<T>> {
        self.slots.get(index).ok_or(Error::SlotOutOfRange {
            index,
            capacity: self.slots.len(),
        })
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (usize, &Mutex<T>)> {
        self.slots.iter().enumerate()
    }
}
