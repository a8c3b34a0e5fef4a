// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Non-volatile memory abstraction.
//!
//! This module provides the [`Flash`] trait, which represents an *abstract
//! flash device*: a region of non-volatile memory that can be read,
//! programmed, and erased in blocks. Such a "device" can range from a plain
//! Rust slice to on-chip MRAM to memory behind another processor (see
//! [`extmem`](super::extmem)), or even a subregion of any of these.
//!
//! Offsets passed to a [`Flash`] are relative to the start of the device;
//! [`Capabilities::base`] records where offset zero sits in the memory map,
//! so that absolute addresses taken from component IDs can be translated.

use core::convert::TryInto as _;

use static_assertions::assert_obj_safe;

use zerocopy::AsBytes;
use zerocopy::FromBytes;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub use crate::hardware::Error;

/// The value of an erased byte.
pub const ERASED: u8 = 0xff;

/// Static properties of a [`Flash`] device.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Capabilities {
    /// The address offset zero is mapped at.
    pub base: u32,
    /// The size of the device, in bytes.
    pub size: u32,
    /// The size of the smallest erasable unit, in bytes.
    pub erase_block: u32,
    /// The alignment `program()` offsets and lengths must meet.
    pub write_align: u32,
}

impl Capabilities {
    /// Returns the absolute address range of this device.
    pub fn span(&self) -> Region {
        Region::new(self.base, self.size)
    }

    /// Returns whether the absolute range `region` lies within this device.
    pub fn contains(&self, region: Region) -> bool {
        self.span().contains(region)
    }

    /// Translates an absolute address into a device offset.
    pub fn offset_of(&self, address: u32) -> Option<Ptr> {
        let offset = address.checked_sub(self.base)?;
        if offset > self.size {
            return None;
        }
        Some(Ptr::new(offset))
    }

    /// Translates an absolute region into device offsets, if the device
    /// holds all of it.
    pub fn local(&self, region: Region) -> Option<Region> {
        if !self.contains(region) {
            return None;
        }
        Some(Region::new(region.ptr.address - self.base, region.len))
    }
}

/// Provides access to a flash-like storage device.
///
/// This trait provides abstract operations on a device, as if it were a
/// block of memory with an explicit erase operation. `program()` never
/// erases implicitly; callers must `erase()` first where the device needs
/// it.
pub trait Flash {
    /// Returns the static properties of this device.
    fn capabilities(&self) -> Result<Capabilities, Error>;

    /// Attempts to read `out.len()` bytes starting at `offset`.
    fn read(&self, offset: Ptr, out: &mut [u8]) -> Result<(), Error>;

    /// Attempts to write `buf.len()` bytes starting at `offset`.
    ///
    /// Note that this function is not guaranteed to succeed (and be
    /// reflected in the return value of `read`) until `flush()` is called.
    /// This is to permit a `Flash` implementation to buffer writes before
    /// sending them out.
    fn program(&mut self, offset: Ptr, buf: &[u8]) -> Result<(), Error>;

    /// Erases `region`, which must be aligned to the erase block size.
    fn erase(&mut self, region: Region) -> Result<(), Error>;

    /// Flushes any pending `program()` operations.
    fn flush(&mut self) -> Result<(), Error> {
        Ok(())
    }
}
assert_obj_safe!(Flash);

impl<F: Flash + ?Sized> Flash for &F {
    #[inline]
    fn capabilities(&self) -> Result<Capabilities, Error> {
        F::capabilities(self)
    }

    #[inline]
    fn read(&self, offset: Ptr, out: &mut [u8]) -> Result<(), Error> {
        F::read(self, offset, out)
    }

    #[inline]
    fn program(&mut self, _: Ptr, _: &[u8]) -> Result<(), Error> {
        Err(Error::Locked)
    }

    #[inline]
    fn erase(&mut self, _: Region) -> Result<(), Error> {
        Err(Error::Locked)
    }

    #[inline]
    fn flush(&mut self) -> Result<(), Error> {
        Err(Error::Locked)
    }
}

impl<F: Flash + ?Sized> Flash for &mut F {
    #[inline]
    fn capabilities(&self) -> Result<Capabilities, Error> {
        F::capabilities(self)
    }

    #[inline]
    fn read(&self, offset: Ptr, out: &mut [u8]) -> Result<(), Error> {
        F::read(self, offset, out)
    }

    #[inline]
    fn program(&mut self, offset: Ptr, buf: &[u8]) -> Result<(), Error> {
        F::program(self, offset, buf)
    }

    #[inline]
    fn erase(&mut self, region: Region) -> Result<(), Error> {
        F::erase(self, region)
    }

    #[inline]
    fn flush(&mut self) -> Result<(), Error> {
        F::flush(self)
    }
}

/// Convenience functions on any [`Flash`], exposed as a trait.
#[extend::ext(name = FlashExt)]
pub impl<F: Flash + ?Sized> F {
    /// Returns whether every byte of `region` reads back as [`ERASED`].
    fn is_erased(&self, region: Region) -> Result<bool, Error> {
        let mut chunk = [0; 64];
        let mut offset = 0;
        while offset < region.len {
            let len = (region.len - offset).min(chunk.len() as u32);
            let buf = &mut chunk[..len as usize];
            self.read(Ptr::new(region.ptr.address + offset), buf)?;
            if buf.iter().any(|&b| b != ERASED) {
                return Ok(false);
            }
            offset += len;
        }
        Ok(true)
    }

    /// Erases `region` only if some byte in it is not already erased.
    ///
    /// Returns whether an erase was issued.
    fn erase_if_dirty(&mut self, region: Region) -> Result<bool, Error> {
        if self.is_erased(region)? {
            return Ok(false);
        }
        self.erase(region)?;
        Ok(true)
    }
}

/// Adapter for working with a sub-region of a [`Flash`] type.
///
/// Reads and writes on the device will be constrained to a given [`Region`],
/// and offsets are relative to the start of that region. This is used to
/// hand out a view of the DFU partition (or of the envelope inside it)
/// without exposing the rest of the device.
#[derive(Copy, Clone)]
pub struct SubFlash<F>(pub F, pub Region);

impl<F: Flash> SubFlash<F> {
    /// Creates a new `SubFlash` representing the entirety of the given device.
    pub fn full(flash: F) -> Result<Self, Error> {
        let region = Region::new(0, flash.capabilities()?.size);
        Ok(Self(flash, region))
    }
}

impl<F> SubFlash<F> {
    /// Interprets `region` as a subregion of this `SubFlash`, returning a new
    /// `SubFlash` that represents that region.
    pub fn reslice(self, region: Region) -> Option<Self> {
        if !Region::new(0, self.1.len).contains(region) {
            return None;
        }

        Some(Self(
            self.0,
            Region::new(
                self.1.ptr.address.checked_add(region.ptr.address)?,
                region.len,
            ),
        ))
    }

    fn translate(&self, region: Region) -> Result<Ptr, Error> {
        if !Region::new(0, self.1.len).contains(region) {
            return Err(Error::OutOfRange);
        }
        Ok(Ptr::new(self.1.ptr.address + region.ptr.address))
    }
}

impl<F: Flash> Flash for SubFlash<F> {
    #[inline]
    fn capabilities(&self) -> Result<Capabilities, Error> {
        let caps = self.0.capabilities()?;
        Ok(Capabilities {
            base: caps
                .base
                .checked_add(self.1.ptr.address)
                .ok_or(Error::OutOfRange)?,
            size: self.1.len,
            ..caps
        })
    }

    #[inline]
    fn read(&self, offset: Ptr, out: &mut [u8]) -> Result<(), Error> {
        let ptr = self.translate(Region::new(offset.address, len(out)?))?;
        self.0.read(ptr, out)
    }

    #[inline]
    fn program(&mut self, offset: Ptr, buf: &[u8]) -> Result<(), Error> {
        let ptr = self.translate(Region::new(offset.address, len(buf)?))?;
        self.0.program(ptr, buf)
    }

    #[inline]
    fn erase(&mut self, region: Region) -> Result<(), Error> {
        let ptr = self.translate(region)?;
        self.0.erase(Region { ptr, len: region.len })
    }

    #[inline]
    fn flush(&mut self) -> Result<(), Error> {
        self.0.flush()
    }
}

fn len(buf: &[u8]) -> Result<u32, Error> {
    buf.len().try_into().map_err(|_| Error::OutOfRange)
}

/// Adapter for converting mutable, RAM-backed storage into a [`Flash`].
///
/// For the purposes of this type, "RAM-backed" means that `AsRef<[u8]>`
/// and `AsMut<[u8]>` are implemented. Erasing fills with [`ERASED`];
/// programming overwrites, like MRAM.
#[derive(Copy, Clone)]
pub struct RamFlash<Bytes> {
    bytes: Bytes,
    base: u32,
    erase_block: u32,
}

impl<Bytes: AsRef<[u8]> + AsMut<[u8]>> RamFlash<Bytes> {
    /// Creates a new `RamFlash` mapped at `base`, with the given erase block
    /// size.
    pub fn new(bytes: Bytes, base: u32, erase_block: u32) -> Self {
        Self {
            bytes,
            base,
            erase_block,
        }
    }

    /// Returns the backing storage.
    pub fn bytes(&self) -> &[u8] {
        self.bytes.as_ref()
    }

    fn range(&self, region: Region) -> Result<core::ops::Range<usize>, Error> {
        let start = region.ptr.address as usize;
        let end = start
            .checked_add(region.len as usize)
            .ok_or(Error::OutOfRange)?;
        if end > self.bytes.as_ref().len() {
            return Err(Error::OutOfRange);
        }
        Ok(start..end)
    }
}

impl<Bytes: AsRef<[u8]> + AsMut<[u8]>> Flash for RamFlash<Bytes> {
    fn capabilities(&self) -> Result<Capabilities, Error> {
        Ok(Capabilities {
            base: self.base,
            size: len(self.bytes.as_ref())?,
            erase_block: self.erase_block,
            write_align: 1,
        })
    }

    fn read(&self, offset: Ptr, out: &mut [u8]) -> Result<(), Error> {
        let range = self.range(Region::new(offset.address, len(out)?))?;
        out.copy_from_slice(&self.bytes.as_ref()[range]);
        Ok(())
    }

    fn program(&mut self, offset: Ptr, buf: &[u8]) -> Result<(), Error> {
        let range = self.range(Region::new(offset.address, len(buf)?))?;
        self.bytes.as_mut()[range].copy_from_slice(buf);
        Ok(())
    }

    fn erase(&mut self, region: Region) -> Result<(), Error> {
        if region.ptr.address % self.erase_block != 0
            || region.len % self.erase_block != 0
        {
            return Err(Error::Misaligned);
        }
        let range = self.range(region)?;
        for b in &mut self.bytes.as_mut()[range] {
            *b = ERASED;
        }
        Ok(())
    }
}

/// An abstract pointer into a [`Flash`] type.
///
/// A `Ptr` needs to be used in conjunction with a [`Flash`]
/// implementation to be read from or written to.
#[derive(
    Copy, Clone, Default, Debug, PartialEq, Eq, Hash, AsBytes, FromBytes,
)]
#[repr(transparent)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Ptr {
    /// The abstract address of this pointer.
    pub address: u32,
}

impl Ptr {
    /// Convenience method for creating a `Ptr` without having to use
    /// a struct literal.
    pub const fn new(address: u32) -> Self {
        Self { address }
    }
}

/// A region of memory.
///
/// Much like a [`Ptr`], a `Region` needs to be interpreted with respect to
/// a [`Flash`] implementation, or to the memory map. The layout is fixed,
/// since lists of regions are handed to the secure domain as raw bytes.
#[derive(
    Copy, Clone, Default, Debug, PartialEq, Eq, Hash, AsBytes, FromBytes,
)]
#[repr(C)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Region {
    /// The base pointer for this slice.
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub ptr: Ptr,
    /// The length of the slice, in bytes.
    pub len: u32,
}

impl Region {
    /// Convenience method for creating a `Region` without having to use
    /// a struct literal.
    pub const fn new(ptr: u32, len: u32) -> Self {
        Self {
            ptr: Ptr::new(ptr),
            len,
        }
    }

    /// Returns the first address past the end of this region, if it is
    /// representable.
    pub fn end(&self) -> Option<u32> {
        self.ptr.address.checked_add(self.len)
    }

    /// Returns whether `other` lies entirely within `self`.
    pub fn contains(&self, other: Region) -> bool {
        match (self.end(), other.end()) {
            (Some(end), Some(other_end)) => {
                other.ptr.address >= self.ptr.address && other_end <= end
            }
            _ => false,
        }
    }

    /// Returns whether `self` and `other` share at least one byte.
    pub fn overlaps(&self, other: Region) -> bool {
        match (self.end(), other.end()) {
            (Some(end), Some(other_end)) => {
                self.ptr.address < other_end && other.ptr.address < end
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn region_containment() {
        let outer = Region::new(0x1000, 0x100);
        assert!(outer.contains(Region::new(0x1000, 0x100)));
        assert!(outer.contains(Region::new(0x10ff, 1)));
        assert!(!outer.contains(Region::new(0x10ff, 2)));
        assert!(!outer.contains(Region::new(0xfff, 1)));
        assert!(!outer.contains(Region::new(u32::MAX, 2)));
        assert!(outer.overlaps(Region::new(0x10ff, 0x10)));
        assert!(!outer.overlaps(Region::new(0x1100, 0x10)));
    }

    #[test]
    fn ram_flash() {
        let mut flash = RamFlash::new([0u8; 64], 0x2000, 16);
        let caps = flash.capabilities().unwrap();
        assert_eq!(caps.span(), Region::new(0x2000, 64));
        assert_eq!(caps.offset_of(0x2010), Some(Ptr::new(0x10)));
        assert_eq!(caps.offset_of(0x1fff), None);
        assert_eq!(
            caps.local(Region::new(0x2030, 0x10)),
            Some(Region::new(0x30, 0x10))
        );
        assert_eq!(caps.local(Region::new(0x2030, 0x11)), None);

        flash.program(Ptr::new(4), &[1, 2, 3]).unwrap();
        let mut out = [0; 3];
        flash.read(Ptr::new(4), &mut out).unwrap();
        assert_eq!(out, [1, 2, 3]);

        assert_eq!(flash.erase(Region::new(4, 16)), Err(Error::Misaligned));
        assert!(!flash.is_erased(Region::new(0, 16)).unwrap());
        assert!(flash.erase_if_dirty(Region::new(0, 16)).unwrap());
        assert!(flash.is_erased(Region::new(0, 16)).unwrap());
        assert!(!flash.erase_if_dirty(Region::new(0, 16)).unwrap());

        assert_eq!(flash.program(Ptr::new(62), &[0; 3]), Err(Error::OutOfRange));
    }

    #[test]
    fn sub_flash() {
        let mut flash = RamFlash::new([0u8; 64], 0x2000, 16);
        {
            let mut sub = SubFlash(&mut flash, Region::new(16, 32));
            let caps = sub.capabilities().unwrap();
            assert_eq!(caps.span(), Region::new(0x2010, 32));
            sub.program(Ptr::new(0), &[0xaa; 4]).unwrap();
            assert_eq!(sub.program(Ptr::new(30), &[0; 4]), Err(Error::OutOfRange));
            assert!(sub.reslice(Region::new(16, 17)).is_none());
        }
        assert_eq!(&flash.bytes()[16..20], &[0xaa; 4]);

        let view = SubFlash(&flash, Region::new(16, 32));
        let mut view = view.reslice(Region::new(0, 4)).unwrap();
        let mut out = [0; 4];
        view.read(Ptr::new(0), &mut out).unwrap();
        assert_eq!(out, [0xaa; 4]);
        assert_eq!(view.program(Ptr::new(0), &[0]), Err(Error::Locked));
    }
}
