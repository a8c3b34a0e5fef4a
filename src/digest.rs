// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! One-shot digest checks.
//!
//! [`check_digest()`] is what the manifest interpreter calls to validate an
//! image it has in hand. Payloads that are streamed into a destination
//! instead go through a [`DigestSink`](crate::sink::DigestSink).

use crate::crypto::hash;
use crate::crypto::hash::EngineExt as _;
use crate::status::Classify;
use crate::status::ErrorKind;
use crate::Result;

/// A digest check error.
///
/// Everything except [`Error::Mismatch`] means the request itself was
/// malformed.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Error {
    /// The COSE algorithm is not a hash this crate knows, or the engine does
    /// not implement it.
    UnsupportedAlgorithm,
    /// The expected digest or the payload was empty.
    Empty,
    /// The expected digest does not have the algorithm's length.
    WrongLength,
    /// The payload does not hash to the expected digest.
    Mismatch,
    /// The hash engine failed.
    Hash(hash::Error),
}

impl Classify for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedAlgorithm | Self::Empty | Self::WrongLength => {
                ErrorKind::Decoding
            }
            Self::Mismatch => ErrorKind::Condition,
            Self::Hash(e) => e.kind(),
        }
    }
}

impl From<hash::Error> for Error {
    fn from(e: hash::Error) -> Self {
        match e {
            hash::Error::Mismatch => Self::Mismatch,
            hash::Error::Unsupported => Self::UnsupportedAlgorithm,
            hash::Error::WrongSize => Self::WrongLength,
            e => Self::Hash(e),
        }
    }
}

debug_from!(Error => hash::Error);

/// Hashes `payload` with the algorithm `cose_alg` names, and compares the
/// result against `expected`.
pub fn check_digest<E: hash::Engine + ?Sized>(
    engine: &mut E,
    cose_alg: i32,
    expected: &[u8],
    payload: &[u8],
) -> Result<(), Error> {
    let algo = match hash::Algo::from_cose(cose_alg) {
        Some(algo) => algo,
        None => {
            return fail!(
                Error::UnsupportedAlgorithm,
                "unknown COSE hash algorithm {}",
                cose_alg
            )
        }
    };
    check!(engine.supports(algo), Error::UnsupportedAlgorithm);
    check!(!expected.is_empty() && !payload.is_empty(), Error::Empty);
    check!(expected.len() == algo.bytes(), Error::WrongLength);

    let mut hasher = engine.new_hash(algo)?;
    hasher.write(payload)?;
    hasher.expect(expected)?;
    trace!("{:?} digest over {} bytes matched", algo, payload.len());
    Ok(())
}

#[cfg(all(test, feature = "ring"))]
mod test {
    use super::*;
    use crate::crypto::ring;

    const PAYLOAD: &[u8] = b"firmware image";

    fn digest(algo: &'static ::ring::digest::Algorithm, data: &[u8]) -> Vec<u8> {
        ::ring::digest::digest(algo, data).as_ref().to_vec()
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn every_algorithm() {
        let mut engine = ring::hash::Engine::new();
        for &(cose, algo) in &[
            (-16, &::ring::digest::SHA256),
            (-43, &::ring::digest::SHA384),
            (-44, &::ring::digest::SHA512),
        ] {
            check_digest(&mut engine, cose, &digest(algo, PAYLOAD), PAYLOAD)
                .unwrap();
        }
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn errors() {
        let mut engine = ring::hash::Engine::new();
        let good = digest(&::ring::digest::SHA256, PAYLOAD);
        let err = |r: Result<(), Error>| {
            let e = r.unwrap_err();
            (e.kind(), e.into_inner())
        };

        assert_eq!(
            err(check_digest(&mut engine, -15, &good, PAYLOAD)),
            (ErrorKind::Decoding, Error::UnsupportedAlgorithm)
        );
        assert_eq!(
            err(check_digest(&mut engine, -16, &[], PAYLOAD)),
            (ErrorKind::Decoding, Error::Empty)
        );
        assert_eq!(
            err(check_digest(&mut engine, -16, &good, &[])),
            (ErrorKind::Decoding, Error::Empty)
        );
        assert_eq!(
            err(check_digest(&mut engine, -43, &good, PAYLOAD)),
            (ErrorKind::Decoding, Error::WrongLength)
        );

        for i in 0..good.len() {
            let mut bad = good.clone();
            bad[i] ^= 0x01;
            assert_eq!(
                err(check_digest(&mut engine, -16, &bad, PAYLOAD)),
                (ErrorKind::Condition, Error::Mismatch)
            );
        }
    }
}
