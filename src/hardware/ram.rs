// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Working memory.
//!
//! Candidate images and manifests are staged in RAM before the secure domain
//! picks them up. On platforms whose data caches are not coherent with the
//! other bus masters, written lines must be flushed before anyone else reads
//! them; [`Ram::dcache_line()`] reports whether that is the case.

use static_assertions::assert_obj_safe;

use crate::hardware::flash::Ptr;
use crate::hardware::flash::Region;
use crate::hardware::Error;

/// Provides access to the addressable RAM of this processor.
///
/// Unlike [`Flash`](super::flash::Flash), addresses here are absolute.
pub trait Ram {
    /// Returns the addressable span of RAM.
    fn span(&self) -> Region;

    /// Returns the data cache line size, if the data cache needs explicit
    /// maintenance.
    fn dcache_line(&self) -> Option<u32>;

    /// Reads `out.len()` bytes starting at `address`.
    fn read(&self, address: Ptr, out: &mut [u8]) -> Result<(), Error>;

    /// Writes `buf` starting at `address`.
    fn write(&mut self, address: Ptr, buf: &[u8]) -> Result<(), Error>;

    /// Cleans the data cache lines covering `region`.
    fn flush_dcache(&mut self, region: Region) -> Result<(), Error>;
}
assert_obj_safe!(Ram);

#[cfg(feature = "std")]
pub mod fake {
    //! A fake [`Ram`](super::Ram), backed by a heap buffer.

    use super::*;
    use super::Ram as _;

    /// A fake `Ram` that records every cache flush it is asked for.
    pub struct Ram {
        base: u32,
        bytes: Vec<u8>,
        dcache_line: Option<u32>,
        flushed: Vec<Region>,
    }

    impl Ram {
        /// Creates a new fake `Ram` of `size` bytes at `base`.
        pub fn new(base: u32, size: u32, dcache_line: Option<u32>) -> Self {
            Self {
                base,
                bytes: vec![0; size as usize],
                dcache_line,
                flushed: Vec::new(),
            }
        }

        /// Returns the regions passed to `flush_dcache()`, in order.
        pub fn flushed(&self) -> &[Region] {
            &self.flushed
        }

        /// Returns the contents of `region`, which must be in bounds.
        pub fn contents(&self, region: Region) -> &[u8] {
            let start = (region.ptr.address - self.base) as usize;
            &self.bytes[start..start + region.len as usize]
        }

        fn range(&self, region: Region) -> Result<core::ops::Range<usize>, Error> {
            if !self.span().contains(region) {
                return Err(Error::OutOfRange);
            }
            let start = (region.ptr.address - self.base) as usize;
            Ok(start..start + region.len as usize)
        }
    }

    impl super::Ram for Ram {
        fn span(&self) -> Region {
            Region::new(self.base, self.bytes.len() as u32)
        }

        fn dcache_line(&self) -> Option<u32> {
            self.dcache_line
        }

        fn read(&self, address: Ptr, out: &mut [u8]) -> Result<(), Error> {
            let range =
                self.range(Region::new(address.address, out.len() as u32))?;
            out.copy_from_slice(&self.bytes[range]);
            Ok(())
        }

        fn write(&mut self, address: Ptr, buf: &[u8]) -> Result<(), Error> {
            let range =
                self.range(Region::new(address.address, buf.len() as u32))?;
            self.bytes[range].copy_from_slice(buf);
            Ok(())
        }

        fn flush_dcache(&mut self, region: Region) -> Result<(), Error> {
            self.range(region)?;
            self.flushed.push(region);
            Ok(())
        }
    }
}
