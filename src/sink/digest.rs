// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Sinks feeding a running digest.

use core::fmt;

use arrayvec::ArrayVec;

use crate::crypto::hash;
use crate::mem::Lease;
use crate::mem::Pool;
use crate::sink::leased;
use crate::sink::release;
use crate::sink::Error;
use crate::sink::StreamSink;
use crate::Result;

/// The context of a [`DigestSink`].
#[derive(Debug)]
pub struct Context {
    algo: hash::Algo,
    expected: ArrayVec<u8, { hash::MAX_BYTES }>,
    expected_len: Option<u32>,
    written: u32,
    finished: bool,
}

/// A [`StreamSink`] which hashes everything written to it, for comparison
/// against an expected digest once the payload is complete.
///
/// The sink is strictly sequential: it can only "seek" to where it already
/// is, and cannot be erased.
pub struct DigestSink<'a, E: hash::Engine + ?Sized> {
    engine: &'a mut E,
    ctx: Lease<'a, Context>,
}

impl<E: hash::Engine + ?Sized> fmt::Debug for DigestSink<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DigestSink").field("ctx", &self.ctx).finish()
    }
}

impl<'a, E: hash::Engine + ?Sized> DigestSink<'a, E> {
    /// Starts hashing with `algo`, to be compared against `expected`.
    ///
    /// If `expected_len` is given, writing more than that many bytes fails,
    /// and the digest cannot be checked before exactly that many bytes were
    /// written.
    pub fn new<const N: usize>(
        engine: &'a mut E,
        pool: &'a Pool<Context, N>,
        algo: hash::Algo,
        expected: &[u8],
        expected_len: Option<u32>,
    ) -> Result<Self, Error> {
        check!(
            expected.len() == algo.bytes(),
            Error::Digest(hash::Error::WrongSize)
        );
        check!(engine.supports(algo), Error::Digest(hash::Error::Unsupported));

        let mut digest = ArrayVec::new();
        let _ = digest.try_extend_from_slice(expected);
        let ctx = match pool.acquire(Context {
            algo,
            expected: digest,
            expected_len,
            written: 0,
            finished: false,
        }) {
            Ok(ctx) => ctx,
            Err(e) => return fail!(Error::from(e), "no free digest contexts"),
        };
        engine.start_raw(algo)?;
        Ok(Self { engine, ctx })
    }

    /// Finishes the digest and compares it against the expected value.
    ///
    /// Fails with [`Error::NotInitialized`] if nothing was written (or the
    /// digest was already checked), and with [`Error::Incomplete`] if fewer
    /// bytes than expected were written.
    pub fn check(&mut self) -> Result<(), Error> {
        let engine = &mut *self.engine;
        leased(&self.ctx, |c| {
            if c.finished || c.written == 0 {
                return Err(Error::NotInitialized);
            }
            if let Some(len) = c.expected_len {
                if c.written < len {
                    return Err(Error::Incomplete);
                }
            }
            c.finished = true;
            trace!("comparing {:?} digest over {} bytes", c.algo, c.written);
            engine
                .compare_raw(&c.expected)
                .map_err(|e| Error::Digest(e.into_inner()))
        })
    }
}

impl<E: hash::Engine + ?Sized> StreamSink for DigestSink<'_, E> {
    fn erase(&mut self) -> Result<(), Error> {
        fail!(Error::Unsupported)
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), Error> {
        let engine = &mut *self.engine;
        leased(&self.ctx, |c| {
            if c.finished {
                return Err(Error::NotInitialized);
            }
            let end = c
                .written
                .checked_add(buf.len() as u32)
                .ok_or(Error::OutOfBounds)?;
            if matches!(c.expected_len, Some(len) if end > len) {
                return Err(Error::OutOfBounds);
            }
            engine
                .write_raw(buf)
                .map_err(|e| Error::Digest(e.into_inner()))?;
            c.written = end;
            Ok(())
        })
    }

    fn seek(&mut self, offset: u32) -> Result<(), Error> {
        leased(&self.ctx, |c| {
            if offset != c.written {
                return Err(Error::Unsupported);
            }
            Ok(())
        })
    }

    fn used_storage(&self) -> Result<u32, Error> {
        leased(&self.ctx, |c| Ok(c.written))
    }

    fn release(&mut self) -> Result<(), Error> {
        release(&mut self.ctx)
    }
}

#[cfg(all(test, feature = "ring"))]
mod test {
    use super::*;
    use crate::crypto::ring;

    const PAYLOAD: &[u8] = b"The quick brown fox jumps over the lazy dog";

    fn sha256(data: &[u8]) -> [u8; 32] {
        let mut out = [0; 32];
        out.copy_from_slice(
            ::ring::digest::digest(&::ring::digest::SHA256, data).as_ref(),
        );
        out
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn streamed_digest() {
        let mut engine = ring::hash::Engine::new();
        let pool = Pool::<Context, 1>::new();
        let expected = sha256(PAYLOAD);

        let mut sink = DigestSink::new(
            &mut engine,
            &pool,
            hash::Algo::Sha256,
            &expected,
            Some(PAYLOAD.len() as u32),
        )
        .unwrap();
        sink.write(&PAYLOAD[..10]).unwrap();
        assert_eq!(sink.check().unwrap_err().into_inner(), Error::Incomplete);
        assert_eq!(sink.seek(0).unwrap_err().into_inner(), Error::Unsupported);
        sink.seek(10).unwrap();
        sink.write(&PAYLOAD[10..]).unwrap();
        assert_eq!(
            sink.write(b"!").unwrap_err().into_inner(),
            Error::OutOfBounds
        );
        assert_eq!(sink.used_storage().unwrap(), PAYLOAD.len() as u32);
        sink.check().unwrap();
        assert_eq!(
            sink.check().unwrap_err().into_inner(),
            Error::NotInitialized
        );
        sink.release().unwrap();
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn mismatch_and_misuse() {
        let mut engine = ring::hash::Engine::new();
        let pool = Pool::<Context, 1>::new();
        let mut expected = sha256(PAYLOAD);
        expected[31] ^= 0x80;

        {
            let mut sink = DigestSink::new(
                &mut engine,
                &pool,
                hash::Algo::Sha256,
                &expected,
                None,
            )
            .unwrap();
            assert_eq!(
                sink.check().unwrap_err().into_inner(),
                Error::NotInitialized
            );
            sink.write(PAYLOAD).unwrap();
            let err = sink.check().unwrap_err();
            assert_eq!(err.into_inner(), Error::Digest(hash::Error::Mismatch));
            assert_eq!(
                sink.erase().unwrap_err().into_inner(),
                Error::Unsupported
            );
        }

        assert_eq!(
            DigestSink::new(
                &mut engine,
                &pool,
                hash::Algo::Sha384,
                &expected,
                None
            )
            .err()
            .map(|e| e.into_inner()),
            Some(Error::Digest(hash::Error::WrongSize))
        );
    }
}
