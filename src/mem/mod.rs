// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! General memory manipulation utilities, such as fixed-capacity pools.

mod pool;
pub use pool::*;

/// Rounds `addr` up to a multiple of `block`, which need not be a power of
/// two (flash erase blocks frequently are not).
///
/// Returns `None` on overflow or if `block` is zero.
#[inline]
pub(crate) fn round_up(addr: u32, block: u32) -> Option<u32> {
    if block == 0 {
        return None;
    }
    let rem = addr % block;
    if rem == 0 {
        return Some(addr);
    }
    addr.checked_add(block - rem)
}

/// Returns whether `addr` is a multiple of `align`, a power of two.
#[inline]
pub(crate) fn is_aligned(addr: u32, align: u32) -> bool {
    addr & align.wrapping_sub(1) == 0
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn alignment() {
        assert!(is_aligned(0x2000_0040, 64));
        assert!(!is_aligned(0x2000_0041, 64));
    }

    #[test]
    fn rounding() {
        assert_eq!(round_up(0, 0x1000), Some(0));
        assert_eq!(round_up(1, 0x1000), Some(0x1000));
        assert_eq!(round_up(10, 3), Some(12));
        assert_eq!(round_up(5, 0), None);
        assert_eq!(round_up(u32::MAX, 16), None);
    }
}
