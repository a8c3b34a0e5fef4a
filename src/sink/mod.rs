// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Stream sinks.
//!
//! A *sink* is somewhere payload bytes can be streamed to: a RAM staging
//! area, a range of MRAM, memory behind another processor, a DFU cache slot,
//! or a running digest. Every sink implements [`StreamSink`], and the
//! [`Selector`] picks the right one for a component ID.
//!
//! Sinks keep their cursor in a context leased from one of the pools in
//! [`Contexts`]. The pools are small and fixed in size: acquiring a sink
//! while every context of its kind is in use fails with
//! [`Error::NoResources`], and releasing a sink hands its context back.
//!
//! All sinks share the same bounds discipline:
//! - a write that does not fit in the destination fails without writing
//!   anything;
//! - seeking is only possible to offsets inside the destination;
//! - [`StreamSink::used_storage()`] is the furthest byte ever written, not
//!   the cursor;
//! - after [`StreamSink::release()`], every operation fails with
//!   [`Error::Released`].

use core::convert::TryFrom;

use static_assertions::assert_obj_safe;

use crate::cache;
use crate::component;
use crate::crypto::hash;
use crate::hardware;
use crate::hardware::flash::Region;
use crate::mem::Lease;
use crate::mem::OutOfMemory;
use crate::mem::Pool;
use crate::status::Classify;
use crate::status::ErrorKind;
use crate::Result;

pub mod cache_sink;
pub mod digest;
pub mod flash;
pub mod ram;
pub mod select;

pub use cache_sink::CacheSink;
pub use digest::DigestSink;
pub use flash::FlashSink;
pub use ram::RamSink;
pub use select::Selector;

/// The number of RAM sinks that may be in use at once.
pub const RAM_SINK_CONTEXTS: usize = 2;

/// The number of MRAM sinks that may be in use at once.
pub const FLASH_SINK_CONTEXTS: usize = 2;

/// The number of external memory sinks that may be in use at once.
pub const EXTMEM_SINK_CONTEXTS: usize = 1;

/// The number of cache sinks that may be in use at once.
pub const CACHE_SINK_CONTEXTS: usize = 1;

/// The number of digest sinks that may be in use at once.
pub const DIGEST_SINK_CONTEXTS: usize = 1;

/// A sink error.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Every context for this kind of sink is in use.
    NoResources,
    /// The write or seek falls outside the destination.
    OutOfBounds,
    /// The write does not fit into the remaining space of a cache slot.
    OutOfMemory,
    /// The sink was already released.
    Released,
    /// The destination does not meet the backend's alignment requirements.
    Misaligned,
    /// The sink does not support this operation.
    Unsupported,
    /// No backend handles this component.
    UnsupportedComponent,
    /// The component ID could not be decoded.
    BadComponentId,
    /// A digest was compared before any data was fed into it.
    NotInitialized,
    /// A digest was compared before all expected data was fed into it.
    Incomplete,
    /// The DFU cache failed.
    Cache(cache::Error),
    /// The underlying memory failed.
    Io(hardware::Error),
    /// The hashing engine failed, or the digest did not match.
    Digest(hash::Error),
}

impl From<OutOfMemory> for Error {
    fn from(_: OutOfMemory) -> Self {
        Self::NoResources
    }
}

impl From<hardware::Error> for Error {
    fn from(e: hardware::Error) -> Self {
        Self::Io(e)
    }
}

impl From<cache::Error> for Error {
    fn from(e: cache::Error) -> Self {
        match e {
            cache::Error::NoSpace => Self::OutOfMemory,
            e => Self::Cache(e),
        }
    }
}

impl From<hash::Error> for Error {
    fn from(e: hash::Error) -> Self {
        Self::Digest(e)
    }
}

impl From<component::Error> for Error {
    fn from(_: component::Error) -> Self {
        Self::BadComponentId
    }
}

debug_from!(Error => cache::Error, hash::Error, component::Error);

impl Classify for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NoResources | Self::OutOfMemory => ErrorKind::Resources,
            Self::OutOfBounds => ErrorKind::Condition,
            Self::Misaligned | Self::BadComponentId => ErrorKind::Decoding,
            Self::Unsupported | Self::UnsupportedComponent => {
                ErrorKind::Unsupported
            }
            Self::Released | Self::NotInitialized | Self::Incomplete => {
                ErrorKind::State
            }
            Self::Cache(e) => e.kind(),
            Self::Io(e) => e.kind(),
            Self::Digest(e) => e.kind(),
        }
    }
}

/// A destination for streamed payload data.
pub trait StreamSink {
    /// Erases the whole destination and rewinds the sink.
    fn erase(&mut self) -> Result<(), Error>;

    /// Writes `buf` at the cursor, advancing it.
    ///
    /// A write that does not fit is rejected as a whole.
    fn write(&mut self, buf: &[u8]) -> Result<(), Error>;

    /// Moves the cursor to `offset`, relative to the start of the
    /// destination.
    fn seek(&mut self, offset: u32) -> Result<(), Error>;

    /// Returns the number of bytes between the start of the destination and
    /// the furthest byte written.
    fn used_storage(&self) -> Result<u32, Error>;

    /// Returns this sink's context to its pool.
    ///
    /// Releasing twice fails with [`Error::Released`].
    fn release(&mut self) -> Result<(), Error>;
}
assert_obj_safe!(StreamSink);

/// The write position within a sink's destination.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Cursor {
    region: Region,
    offset: u32,
    used: u32,
}

impl Cursor {
    /// Creates a cursor at the start of `region`.
    pub fn new(region: Region) -> Self {
        Self {
            region,
            offset: 0,
            used: 0,
        }
    }

    /// Returns the destination this cursor moves over.
    pub fn region(&self) -> Region {
        self.region
    }

    /// Returns the address `len` bytes could be written at, without moving
    /// the cursor.
    fn reserve(&self, len: usize) -> core::result::Result<u32, Error> {
        let len = u32::try_from(len).map_err(|_| Error::OutOfBounds)?;
        match self.offset.checked_add(len) {
            Some(end) if end <= self.region.len => {
                Ok(self.region.ptr.address + self.offset)
            }
            _ => Err(Error::OutOfBounds),
        }
    }

    fn advance(&mut self, len: usize) {
        self.offset += len as u32;
        self.used = self.used.max(self.offset);
    }

    fn seek(&mut self, offset: u32) -> core::result::Result<(), Error> {
        if offset >= self.region.len {
            return Err(Error::OutOfBounds);
        }
        self.offset = offset;
        Ok(())
    }

    fn rewind(&mut self) {
        self.offset = 0;
        self.used = 0;
    }
}

/// Runs `f` on a leased context, failing with [`Error::Released`] if the
/// lease is gone.
fn leased<T, R>(
    lease: &Lease<T>,
    f: impl FnOnce(&mut T) -> core::result::Result<R, Error>,
) -> Result<R, Error> {
    match lease.with(f) {
        Some(Ok(r)) => Ok(r),
        Some(Err(e)) => fail!(e),
        None => fail!(Error::Released),
    }
}

/// Returns a lease to its pool.
fn release<T>(lease: &mut Lease<T>) -> Result<(), Error> {
    match lease.release() {
        Some(_) => Ok(()),
        None => fail!(Error::Released),
    }
}

/// The context pools every sink draws from.
///
/// A `Contexts` is created once by the integration and shared by reference
/// with the [`Selector`].
pub struct Contexts {
    ram: Pool<Cursor, RAM_SINK_CONTEXTS>,
    flash: Pool<Cursor, FLASH_SINK_CONTEXTS>,
    extmem: Pool<Cursor, EXTMEM_SINK_CONTEXTS>,
    cache: Pool<cache_sink::Context, CACHE_SINK_CONTEXTS>,
    digest: Pool<digest::Context, DIGEST_SINK_CONTEXTS>,
}

impl Contexts {
    /// Creates a new set of pools, with every context free.
    pub fn new() -> Self {
        Self {
            ram: Pool::new(),
            flash: Pool::new(),
            extmem: Pool::new(),
            cache: Pool::new(),
            digest: Pool::new(),
        }
    }

    /// Returns the pool RAM sinks draw from.
    pub fn ram(&self) -> &Pool<Cursor, RAM_SINK_CONTEXTS> {
        &self.ram
    }

    /// Returns the pool MRAM sinks draw from.
    pub fn flash(&self) -> &Pool<Cursor, FLASH_SINK_CONTEXTS> {
        &self.flash
    }

    /// Returns the pool external memory sinks draw from.
    pub fn extmem(&self) -> &Pool<Cursor, EXTMEM_SINK_CONTEXTS> {
        &self.extmem
    }

    /// Returns the pool cache sinks draw from.
    pub fn cache(&self) -> &Pool<cache_sink::Context, CACHE_SINK_CONTEXTS> {
        &self.cache
    }

    /// Returns the pool digest sinks draw from.
    pub fn digest(&self) -> &Pool<digest::Context, DIGEST_SINK_CONTEXTS> {
        &self.digest
    }

    /// Returns the number of contexts currently in use, across all pools.
    pub fn in_use(&self) -> usize {
        self.ram.in_use()
            + self.flash.in_use()
            + self.extmem.in_use()
            + self.cache.in_use()
            + self.digest.in_use()
    }
}

impl Default for Contexts {
    fn default() -> Self {
        Self::new()
    }
}

/// A sink returned by the [`Selector`].
#[derive(Debug)]
pub enum Sink<'a> {
    /// A RAM staging area.
    Ram(RamSink<'a>),
    /// A range of MRAM.
    Flash(FlashSink<'a>),
    /// A range of memory owned by another processor.
    ExtMem(FlashSink<'a>),
    /// A DFU cache slot.
    Cache(CacheSink<'a>),
}

impl<'a> Sink<'a> {
    fn inner(&mut self) -> &mut dyn StreamSink {
        match self {
            Self::Ram(s) => s,
            Self::Flash(s) | Self::ExtMem(s) => s,
            Self::Cache(s) => s,
        }
    }

    /// Returns the cache sink inside, if this is one.
    pub fn as_cache(&mut self) -> Option<&mut CacheSink<'a>> {
        match self {
            Self::Cache(s) => Some(s),
            _ => None,
        }
    }
}

impl StreamSink for Sink<'_> {
    fn erase(&mut self) -> Result<(), Error> {
        self.inner().erase()
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), Error> {
        self.inner().write(buf)
    }

    fn seek(&mut self, offset: u32) -> Result<(), Error> {
        self.inner().seek(offset)
    }

    fn used_storage(&self) -> Result<u32, Error> {
        match self {
            Self::Ram(s) => s.used_storage(),
            Self::Flash(s) | Self::ExtMem(s) => s.used_storage(),
            Self::Cache(s) => s.used_storage(),
        }
    }

    fn release(&mut self) -> Result<(), Error> {
        self.inner().release()
    }
}
