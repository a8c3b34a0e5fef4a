// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Sinks over DFU cache slots.

use core::fmt;

use crate::cache;
use crate::cache::Cache;
use crate::cache::Slot;
use crate::mem::Lease;
use crate::mem::Pool;
use crate::sink::leased;
use crate::sink::release;
use crate::sink::Error;
use crate::sink::StreamSink;
use crate::Result;

/// The context of a [`CacheSink`].
#[derive(Debug)]
pub struct Context {
    slot: Slot,
    offset: u32,
}

/// A [`StreamSink`] writing a payload into a fresh DFU cache slot.
///
/// The payload only becomes visible once [`CacheSink::commit()`] is called.
/// Releasing (or dropping) a sink whose slot was neither committed nor
/// dropped discards the slot.
pub struct CacheSink<'a> {
    cache: &'a Cache<'a>,
    ctx: Lease<'a, Context>,
}

impl fmt::Debug for CacheSink<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CacheSink").field("ctx", &self.ctx).finish()
    }
}

fn cache_err(e: crate::Error<cache::Error>) -> Error {
    Error::from(e.into_inner())
}

impl<'a> CacheSink<'a> {
    /// Allocates a slot keyed by `uri` in cache partition `partition`, and
    /// creates a sink writing into it.
    pub fn new<const N: usize>(
        cache: &'a Cache<'a>,
        pool: &'a Pool<Context, N>,
        partition: u32,
        uri: &[u8],
    ) -> Result<Self, Error> {
        // Checked up front, so that a full pool does not strand a new slot.
        check!(pool.in_use() < pool.capacity(), Error::NoResources);
        let slot = cache.create_slot(partition, uri)?;
        let ctx = match pool.acquire(Context { slot, offset: 0 }) {
            Ok(ctx) => ctx,
            Err(e) => return fail!(Error::from(e)),
        };
        Ok(Self { cache, ctx })
    }

    /// Returns whether the slot still accepts writes.
    pub fn is_write_enabled(&self) -> bool {
        self.ctx
            .with(|c| c.slot.is_write_enabled())
            .unwrap_or(false)
    }

    /// Makes the payload written so far visible under the slot's URI.
    pub fn commit(&mut self) -> Result<(), Error> {
        let cache = self.cache;
        leased(&self.ctx, |c| cache.commit(&mut c.slot).map_err(cache_err))
    }

    /// Discards the slot and everything written to it.
    pub fn drop_slot(&mut self) -> Result<(), Error> {
        let cache = self.cache;
        leased(&self.ctx, |c| cache.drop_slot(&mut c.slot).map_err(cache_err))
    }
}

impl StreamSink for CacheSink<'_> {
    fn erase(&mut self) -> Result<(), Error> {
        fail!(Error::Unsupported)
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), Error> {
        let cache = self.cache;
        leased(&self.ctx, |c| {
            cache
                .write(&mut c.slot, c.offset, buf)
                .map_err(cache_err)?;
            c.offset += buf.len() as u32;
            Ok(())
        })
    }

    fn seek(&mut self, offset: u32) -> Result<(), Error> {
        leased(&self.ctx, |c| {
            if offset >= c.slot.capacity() {
                return Err(Error::OutOfBounds);
            }
            c.offset = offset;
            Ok(())
        })
    }

    fn used_storage(&self) -> Result<u32, Error> {
        leased(&self.ctx, |c| Ok(c.slot.used()))
    }

    fn release(&mut self) -> Result<(), Error> {
        let cache = self.cache;
        let dropped = self.ctx.with(|c| {
            if !c.slot.is_write_enabled() {
                return Ok(());
            }
            warn!("releasing an open cache slot; dropping it");
            cache.drop_slot(&mut c.slot).map_err(cache_err)
        });
        release(&mut self.ctx)?;
        match dropped {
            Some(Err(e)) => fail!(e),
            _ => Ok(()),
        }
    }
}

impl Drop for CacheSink<'_> {
    fn drop(&mut self) {
        if !self.ctx.is_released() {
            let _ = self.release();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use core::cell::RefCell;

    use crate::config::CachePartition;
    use crate::config::Layout;
    use crate::hardware::flash::RamFlash;
    use crate::hardware::flash::Region;

    const BASE: u32 = 0x1000_0000;

    fn layout() -> Layout {
        let mut layout = Layout::default();
        layout.cache_partitions.push(CachePartition {
            id: 1,
            region: Region::new(BASE, 0x400),
        });
        layout
    }

    #[test]
    fn commit_then_release() {
        let mram = RefCell::new(RamFlash::new(vec![0xff; 0x400], BASE, 0x100));
        let cache = Cache::new(&mram, 64);
        cache.initialize(&layout(), false).unwrap();
        let pool = Pool::<Context, 1>::new();

        let mut sink = CacheSink::new(&cache, &pool, 1, b"app.bin").unwrap();
        sink.write(b"payload").unwrap();
        assert!(sink.is_write_enabled());
        sink.commit().unwrap();
        assert!(!sink.is_write_enabled());
        assert_eq!(
            sink.write(b"more").unwrap_err().into_inner(),
            Error::Cache(cache::Error::NotWriteEnabled)
        );
        sink.release().unwrap();

        assert_eq!(cache.get(b"app.bin").unwrap().len, 7);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn release_drops_open_slot() {
        let mram = RefCell::new(RamFlash::new(vec![0xff; 0x400], BASE, 0x100));
        let cache = Cache::new(&mram, 64);
        cache.initialize(&layout(), false).unwrap();
        let pool = Pool::<Context, 1>::new();

        let mut sink = CacheSink::new(&cache, &pool, 1, b"app.bin").unwrap();
        sink.write(b"payload").unwrap();
        sink.release().unwrap();
        assert_eq!(sink.release().unwrap_err().into_inner(), Error::Released);
        assert!(cache.get(b"app.bin").is_err());

        {
            let mut sink = CacheSink::new(&cache, &pool, 1, b"app.bin").unwrap();
            sink.write(b"again").unwrap();
        }
        assert!(cache.get(b"app.bin").is_err());
        assert!(cache.populated().is_empty());
    }

    #[test]
    fn limits() {
        let mram = RefCell::new(RamFlash::new(vec![0xff; 0x400], BASE, 0x100));
        let cache = Cache::new(&mram, 64);
        cache.initialize(&layout(), false).unwrap();
        let pool = Pool::<Context, 1>::new();

        let mut sink = CacheSink::new(&cache, &pool, 1, b"a").unwrap();
        assert_eq!(
            CacheSink::new(&cache, &pool, 1, b"b")
                .err()
                .map(|e| e.into_inner()),
            Some(Error::NoResources)
        );
        assert_eq!(sink.erase().unwrap_err().into_inner(), Error::Unsupported);

        // 0x400 bytes, minus the slot header and the map end.
        let capacity = 0x400 - 1 - 2 - 5 - 1;
        sink.seek(capacity - 2).unwrap();
        assert_eq!(
            sink.write(b"abc").unwrap_err().into_inner(),
            Error::OutOfMemory
        );
        assert_eq!(sink.used_storage().unwrap(), 0);
        sink.write(b"ab").unwrap();
        assert_eq!(sink.used_storage().unwrap(), capacity);
        assert_eq!(
            sink.seek(capacity).unwrap_err().into_inner(),
            Error::OutOfBounds
        );
    }
}
