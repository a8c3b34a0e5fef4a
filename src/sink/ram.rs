// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Sinks over working RAM.

use core::cell::RefCell;
use core::fmt;

use crate::hardware;
use crate::hardware::flash::Ptr;
use crate::hardware::flash::Region;
use crate::hardware::ram::Ram;
use crate::mem::is_aligned;
use crate::mem::Lease;
use crate::mem::Pool;
use crate::sink::leased;
use crate::sink::release;
use crate::sink::Cursor;
use crate::sink::Error;
use crate::sink::StreamSink;
use crate::Result;

/// A [`StreamSink`] writing into a region of RAM.
///
/// If the platform's data cache needs maintenance, every write is followed by
/// a flush of the lines it touched.
pub struct RamSink<'a> {
    ram: &'a RefCell<dyn Ram + 'a>,
    ctx: Lease<'a, Cursor>,
}

impl fmt::Debug for RamSink<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RamSink").field("ctx", &self.ctx).finish()
    }
}

impl<'a> RamSink<'a> {
    /// Creates a sink over `region`, drawing a context from `pool`.
    ///
    /// `region` must be inside the RAM span and, if the data cache needs
    /// maintenance, cover whole cache lines, so that flushes never reach
    /// neighbouring memory.
    pub fn new<const N: usize>(
        ram: &'a RefCell<dyn Ram + 'a>,
        pool: &'a Pool<Cursor, N>,
        region: Region,
    ) -> Result<Self, Error> {
        let (span, line) = match ram.try_borrow() {
            Ok(ram) => (ram.span(), ram.dcache_line()),
            Err(_) => return fail!(Error::Io(hardware::Error::Locked)),
        };
        check!(span.contains(region), Error::OutOfBounds);
        if let Some(line) = line {
            check!(
                is_aligned(region.ptr.address, line) && is_aligned(region.len, line),
                Error::Misaligned
            );
        }

        let ctx = match pool.acquire(Cursor::new(region)) {
            Ok(ctx) => ctx,
            Err(e) => return fail!(Error::from(e), "no free RAM sink contexts"),
        };
        trace!("RAM sink over {:?}", region);
        Ok(Self { ram, ctx })
    }

    fn store(&self, at: u32, buf: &[u8]) -> core::result::Result<(), Error> {
        let mut ram = self
            .ram
            .try_borrow_mut()
            .map_err(|_| hardware::Error::Locked)?;
        ram.write(Ptr::new(at), buf)?;

        if let Some(line) = ram.dcache_line() {
            let span = ram.span();
            let end = at + buf.len() as u32;
            let start = (at - at % line).max(span.ptr.address);
            let end = crate::mem::round_up(end, line)
                .unwrap_or(u32::MAX)
                .min(span.end().unwrap_or(u32::MAX));
            ram.flush_dcache(Region::new(start, end - start))?;
        }
        Ok(())
    }
}

impl StreamSink for RamSink<'_> {
    fn erase(&mut self) -> Result<(), Error> {
        leased(&self.ctx, |cursor| {
            let region = cursor.region();
            let zeros = [0; 32];
            let mut offset = 0;
            while offset < region.len {
                let len = (region.len - offset).min(zeros.len() as u32);
                self.store(region.ptr.address + offset, &zeros[..len as usize])?;
                offset += len;
            }
            cursor.rewind();
            Ok(())
        })
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), Error> {
        leased(&self.ctx, |cursor| {
            let at = cursor.reserve(buf.len())?;
            if !buf.is_empty() {
                self.store(at, buf)?;
            }
            cursor.advance(buf.len());
            Ok(())
        })
    }

    fn seek(&mut self, offset: u32) -> Result<(), Error> {
        leased(&self.ctx, |cursor| cursor.seek(offset))
    }

    fn used_storage(&self) -> Result<u32, Error> {
        leased(&self.ctx, |cursor| Ok(cursor.used))
    }

    fn release(&mut self) -> Result<(), Error> {
        release(&mut self.ctx)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hardware::ram::fake;

    const BASE: u32 = 0x2000_0000;

    #[test]
    fn write_and_flush() {
        let ram = RefCell::new(fake::Ram::new(BASE, 0x1000, Some(32)));
        let pool = Pool::<Cursor, 1>::new();

        let region = Region::new(BASE + 0x100, 0x40);
        let mut sink = RamSink::new(&ram, &pool, region).unwrap();
        sink.write(b"hello").unwrap();
        sink.write(&[0xaa; 30]).unwrap();
        assert_eq!(sink.used_storage().unwrap(), 35);

        {
            let ram = ram.borrow();
            assert_eq!(ram.contents(Region::new(BASE + 0x100, 5)), b"hello");
            assert_eq!(
                ram.flushed(),
                &[
                    Region::new(BASE + 0x100, 32),
                    Region::new(BASE + 0x100, 64),
                ]
            );
        }

        sink.seek(2).unwrap();
        sink.write(b"LL").unwrap();
        assert_eq!(sink.used_storage().unwrap(), 35);
        assert_eq!(
            ram.borrow().contents(Region::new(BASE + 0x100, 5)),
            b"heLLo"
        );

        sink.erase().unwrap();
        assert_eq!(sink.used_storage().unwrap(), 0);
        assert!(ram.borrow().contents(region).iter().all(|&b| b == 0));
    }

    #[test]
    fn out_of_bounds_write_is_not_applied() {
        let ram = RefCell::new(fake::Ram::new(BASE, 0x1000, None));
        let pool = Pool::<Cursor, 1>::new();
        let region = Region::new(BASE, 8);
        let mut sink = RamSink::new(&ram, &pool, region).unwrap();

        sink.write(b"abcd").unwrap();
        assert_eq!(
            sink.write(b"efghi").unwrap_err().into_inner(),
            Error::OutOfBounds
        );
        assert_eq!(sink.used_storage().unwrap(), 4);
        assert_eq!(&ram.borrow().contents(region)[4..], &[0; 4]);
        assert_eq!(sink.seek(8).unwrap_err().into_inner(), Error::OutOfBounds);
        assert!(ram.borrow().flushed().is_empty());
    }

    #[test]
    fn rejects_bad_regions() {
        let ram = RefCell::new(fake::Ram::new(BASE, 0x1000, Some(32)));
        let pool = Pool::<Cursor, 1>::new();

        assert_eq!(
            RamSink::new(&ram, &pool, Region::new(BASE + 0xff0, 0x20))
                .err()
                .map(|e| e.into_inner()),
            Some(Error::OutOfBounds)
        );
        assert_eq!(
            RamSink::new(&ram, &pool, Region::new(BASE + 4, 0x20))
                .err()
                .map(|e| e.into_inner()),
            Some(Error::Misaligned)
        );
        // The last line would be shared with whatever follows.
        assert_eq!(
            RamSink::new(&ram, &pool, Region::new(BASE + 0x20, 0x21))
                .err()
                .map(|e| e.into_inner()),
            Some(Error::Misaligned)
        );
        assert!(RamSink::new(&ram, &pool, Region::new(BASE + 0x20, 0x40)).is_ok());
    }

    #[test]
    fn pool_exhaustion() {
        let ram = RefCell::new(fake::Ram::new(BASE, 0x1000, None));
        let pool = Pool::<Cursor, 2>::new();
        let region = Region::new(BASE, 0x10);

        let mut a = RamSink::new(&ram, &pool, region).unwrap();
        let _b = RamSink::new(&ram, &pool, region).unwrap();
        assert_eq!(
            RamSink::new(&ram, &pool, region)
                .err()
                .map(|e| e.into_inner()),
            Some(Error::NoResources)
        );

        a.release().unwrap();
        assert_eq!(a.release().unwrap_err().into_inner(), Error::Released);
        assert_eq!(a.write(b"x").unwrap_err().into_inner(), Error::Released);
        assert!(RamSink::new(&ram, &pool, region).is_ok());
    }
}
