// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Fixed-capacity context pools.
//!
//! Sinks keep their per-operation state in a context drawn from a [`Pool`]
//! rather than from an allocator, so the amount of memory an update can
//! consume is fixed at build time. Acquiring a context from a full pool
//! fails with [`OutOfMemory`] instead of blocking or growing.

use core::cell::RefCell;
use core::fmt;

/// An error indicating that a [`Pool`] has no free contexts left.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutOfMemory;

/// A pool of `N` reusable slots holding values of type `T`.
///
/// A slot is handed out as a [`Lease`], which returns the slot to the pool
/// when it is released or dropped. Pools are meant to be shared by
/// reference: acquiring a slot only needs `&self`.
pub struct Pool<T, const N: usize> {
    slots: [RefCell<Option<T>>; N],
}

impl<T, const N: usize> Pool<T, N> {
    /// Creates a new pool with all slots free.
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| RefCell::new(None)),
        }
    }

    /// Returns the total number of slots in this pool.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Returns the number of slots currently leased out.
    pub fn in_use(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.try_borrow().map(|s| s.is_some()).unwrap_or(true))
            .count()
    }

    /// Places `value` into the first free slot and leases it out.
    ///
    /// Returns `OutOfMemory` if every slot is already leased.
    pub fn acquire(&self, value: T) -> Result<Lease<'_, T>, OutOfMemory> {
        for slot in &self.slots {
            let mut cell = match slot.try_borrow_mut() {
                Ok(cell) => cell,
                Err(_) => continue,
            };
            if cell.is_none() {
                *cell = Some(value);
                return Ok(Lease { slot: Some(slot) });
            }
        }
        Err(OutOfMemory)
    }
}

impl<T, const N: usize> Default for Pool<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// A slot leased out of a [`Pool`].
///
/// Once released, a lease no longer refers to any slot, and every accessor
/// returns `None`.
pub struct Lease<'pool, T> {
    slot: Option<&'pool RefCell<Option<T>>>,
}

impl<T> Lease<'_, T> {
    /// Runs `f` on the leased value.
    ///
    /// Returns `None` if this lease has been released.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let slot = self.slot?;
        let mut cell = slot.borrow_mut();
        cell.as_mut().map(f)
    }

    /// Returns whether this lease has already been released.
    pub fn is_released(&self) -> bool {
        self.slot.is_none()
    }

    /// Returns the slot to its pool, yielding the value it held.
    ///
    /// Returns `None` if this lease has already been released.
    pub fn release(&mut self) -> Option<T> {
        self.slot.take().and_then(|slot| slot.borrow_mut().take())
    }
}

impl<T: fmt::Debug> fmt::Debug for Lease<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let slot = match self.slot {
            Some(slot) => slot,
            None => return f.write_str("Lease(<released>)"),
        };
        match slot.try_borrow() {
            Ok(value) => f.debug_tuple("Lease").field(&*value).finish(),
            Err(_) => f.write_str("Lease(<borrowed>)"),
        }
    }
}

impl<T> Drop for Lease<'_, T> {
    fn drop(&mut self) {
        self.release();
    }
}
