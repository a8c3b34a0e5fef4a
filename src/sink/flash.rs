// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Sinks over non-volatile memory.
//!
//! The same sink serves on-chip MRAM and memory behind another processor:
//! both are a [`Flash`], and the latter is simply an
//! [`ExtMem`](crate::hardware::extmem::ExtMem).

use core::cell::RefCell;
use core::fmt;

use crate::hardware;
use crate::hardware::flash::Capabilities;
use crate::hardware::flash::Flash;
use crate::hardware::flash::Ptr;
use crate::hardware::flash::Region;
use crate::mem::Lease;
use crate::mem::Pool;
use crate::sink::leased;
use crate::sink::release;
use crate::sink::Cursor;
use crate::sink::Error;
use crate::sink::StreamSink;
use crate::Result;

/// A [`StreamSink`] writing into a region of a [`Flash`] device.
///
/// Writes program the device directly; the destination must have been
/// erased beforehand, either by the caller or through
/// [`StreamSink::erase()`].
pub struct FlashSink<'a> {
    flash: &'a RefCell<dyn Flash + 'a>,
    // The cursor moves over device offsets, not absolute addresses.
    ctx: Lease<'a, Cursor>,
    erase_block: u32,
}

impl fmt::Debug for FlashSink<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FlashSink")
            .field("ctx", &self.ctx)
            .field("erase_block", &self.erase_block)
            .finish()
    }
}

impl<'a> FlashSink<'a> {
    /// Creates a sink over `region`, an absolute range of addresses, drawing
    /// a context from `pool`.
    ///
    /// The device's geometry is queried once, here.
    pub fn new<const N: usize>(
        flash: &'a RefCell<dyn Flash + 'a>,
        pool: &'a Pool<Cursor, N>,
        region: Region,
    ) -> Result<Self, Error> {
        let caps = match flash.try_borrow() {
            Ok(flash) => flash.capabilities(),
            Err(_) => Err(hardware::Error::Locked),
        };
        match caps {
            Ok(caps) => Self::with_capabilities(flash, pool, region, caps),
            Err(e) => fail!(Error::Io(e)),
        }
    }

    /// Like [`FlashSink::new()`], but with the device's geometry already in
    /// hand.
    pub fn with_capabilities<const N: usize>(
        flash: &'a RefCell<dyn Flash + 'a>,
        pool: &'a Pool<Cursor, N>,
        region: Region,
        caps: Capabilities,
    ) -> Result<Self, Error> {
        let local = match caps.local(region) {
            Some(local) => local,
            None => {
                return fail!(
                    Error::OutOfBounds,
                    "{:?} is outside of {:?}",
                    region,
                    caps.span()
                )
            }
        };

        let ctx = match pool.acquire(Cursor::new(local)) {
            Ok(ctx) => ctx,
            Err(e) => return fail!(Error::from(e), "no free flash sink contexts"),
        };
        trace!("flash sink over {:?}", region);
        Ok(Self {
            flash,
            ctx,
            erase_block: caps.erase_block,
        })
    }

    fn device(
        &self,
    ) -> core::result::Result<core::cell::RefMut<'_, dyn Flash + 'a>, Error> {
        Ok(self
            .flash
            .try_borrow_mut()
            .map_err(|_| hardware::Error::Locked)?)
    }
}

impl StreamSink for FlashSink<'_> {
    fn erase(&mut self) -> Result<(), Error> {
        leased(&self.ctx, |cursor| {
            let region = cursor.region();
            let eb = self.erase_block;
            if eb == 0 || region.ptr.address % eb != 0 || region.len % eb != 0 {
                return Err(Error::Misaligned);
            }
            self.device()?.erase(region)?;
            cursor.rewind();
            Ok(())
        })
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), Error> {
        leased(&self.ctx, |cursor| {
            let at = cursor.reserve(buf.len())?;
            if !buf.is_empty() {
                self.device()?.program(Ptr::new(at), buf)?;
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
    use crate::hardware::extmem;
    use crate::hardware::flash::RamFlash;

    const BASE: u32 = 0x0e00_0000;

    #[test]
    fn write_at_absolute_address() {
        let mram = RefCell::new(RamFlash::new(vec![0xff; 0x1000], BASE, 0x100));
        let pool = Pool::<Cursor, 1>::new();

        let mut sink =
            FlashSink::new(&mram, &pool, Region::new(BASE + 0x200, 0x200))
                .unwrap();
        sink.write(b"firmware").unwrap();
        sink.seek(0x100).unwrap();
        sink.write(b"tail").unwrap();
        assert_eq!(sink.used_storage().unwrap(), 0x104);
        assert_eq!(&mram.borrow().bytes()[0x200..0x208], b"firmware");
        assert_eq!(&mram.borrow().bytes()[0x300..0x304], b"tail");

        assert_eq!(
            sink.write(&[0; 0xfd]).unwrap_err().into_inner(),
            Error::OutOfBounds
        );
        assert_eq!(sink.used_storage().unwrap(), 0x104);

        sink.erase().unwrap();
        assert_eq!(sink.used_storage().unwrap(), 0);
        assert!(mram.borrow().bytes()[0x200..0x400].iter().all(|&b| b == 0xff));
    }

    #[test]
    fn rejects_bad_regions() {
        let mram = RefCell::new(RamFlash::new(vec![0xff; 0x1000], BASE, 0x100));
        let pool = Pool::<Cursor, 1>::new();

        assert_eq!(
            FlashSink::new(&mram, &pool, Region::new(BASE + 0xf00, 0x101))
                .err()
                .map(|e| e.into_inner()),
            Some(Error::OutOfBounds)
        );
        assert_eq!(
            FlashSink::new(&mram, &pool, Region::new(BASE - 1, 0x10))
                .err()
                .map(|e| e.into_inner()),
            Some(Error::OutOfBounds)
        );

        let mut sink =
            FlashSink::new(&mram, &pool, Region::new(BASE + 0x10, 0x100))
                .unwrap();
        assert_eq!(sink.erase().unwrap_err().into_inner(), Error::Misaligned);
    }

    #[test]
    fn external_memory() {
        let ext = RefCell::new(extmem::ExtMem::new(extmem::fake::Transport::new(
            0x6000_0000,
            0x400,
            0x100,
        )));
        let pool = Pool::<Cursor, 1>::new();

        let mut sink =
            FlashSink::new(&ext, &pool, Region::new(0x6000_0100, 0x100)).unwrap();
        sink.write(b"radio").unwrap();
        assert_eq!(sink.used_storage().unwrap(), 5);
        sink.release().unwrap();
        drop(sink);

        let ext = ext.into_inner().into_inner();
        assert_eq!(&ext.memory()[0x100..0x105], b"radio");
    }
}
