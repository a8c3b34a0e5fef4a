// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Implementations of [`crypto::hash`] based on `ring`.

use core::mem;

use ring::digest;

use crate::crypto::hash;
use crate::Result;

#[cfg(doc)]
use crate::crypto;

/// A `ring`-based [`hash::Engine`].
pub struct Engine {
    inner: Option<digest::Context>,
}

impl Engine {
    /// Creates a new `Engine`.
    pub fn new() -> Self {
        Self { inner: None }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl hash::Engine for Engine {
    fn supports(&mut self, _: hash::Algo) -> bool {
        true
    }

    fn start_raw(&mut self, algo: hash::Algo) -> Result<(), hash::Error> {
        self.inner = Some(digest::Context::new(match algo {
            hash::Algo::Sha256 => &digest::SHA256,
            hash::Algo::Sha384 => &digest::SHA384,
            hash::Algo::Sha512 => &digest::SHA512,
        }));
        Ok(())
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), hash::Error> {
        match &mut self.inner {
            None => return fail!(hash::Error::Idle),
            Some(c) => c.update(data),
        }
        Ok(())
    }

    fn finish_raw(&mut self, out: &mut [u8]) -> Result<(), hash::Error> {
        let c = match mem::replace(&mut self.inner, None) {
            None => return fail!(hash::Error::Idle),
            Some(c) => c,
        };
        check!(
            out.len() == c.algorithm().output_len,
            hash::Error::WrongSize
        );
        out.copy_from_slice(c.finish().as_ref());
        Ok(())
    }

    fn compare_raw(&mut self, expected: &[u8]) -> Result<(), hash::Error> {
        let c = match mem::replace(&mut self.inner, None) {
            None => return fail!(hash::Error::Idle),
            Some(c) => c,
        };
        check!(
            expected.len() == c.algorithm().output_len,
            hash::Error::WrongSize
        );
        let digest = c.finish();
        ring::constant_time::verify_slices_are_equal(digest.as_ref(), expected)
            .or_else(|_| fail!(hash::Error::Mismatch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::Algo::Sha256;
    use crate::crypto::hash::Engine as _;
    use crate::crypto::hash::EngineExt as _;

    const PLAIN_TEXT: &[u8] = b"The quick brown fox jumps over the lazy dog";

    #[test]
    #[cfg_attr(miri, ignore)]
    fn hash256() {
        let expected = digest::digest(&digest::SHA256, PLAIN_TEXT);

        let mut e = Engine::new();
        let mut digest = [0; Sha256.bytes()];

        let mut ctx = e.new_hash(Sha256).unwrap();
        ctx.write(PLAIN_TEXT).unwrap();
        ctx.finish(&mut digest).unwrap();
        assert_eq!(&digest, expected.as_ref());

        let mut ctx = e.new_hash(Sha256).unwrap();
        ctx.write(&PLAIN_TEXT[..16]).unwrap();
        ctx.write(&PLAIN_TEXT[16..]).unwrap();
        ctx.expect(expected.as_ref()).unwrap();
    }

    #[test]
    fn idle_and_mismatch() {
        let mut e = Engine::new();
        assert_eq!(
            e.write_raw(b"x").unwrap_err().into_inner(),
            hash::Error::Idle
        );

        let mut ctx = e.new_hash(Sha256).unwrap();
        ctx.write(PLAIN_TEXT).unwrap();
        assert_eq!(
            ctx.expect(&[0; 32]).unwrap_err().into_inner(),
            hash::Error::Mismatch
        );

        let mut ctx = e.new_hash(Sha256).unwrap();
        ctx.write(PLAIN_TEXT).unwrap();
        assert_eq!(
            ctx.expect(&[0; 20]).unwrap_err().into_inner(),
            hash::Error::WrongSize
        );

        // Finishing leaves the engine idle.
        assert_eq!(
            e.finish_raw(&mut [0; 32]).unwrap_err().into_inner(),
            hash::Error::Idle
        );
    }
}
