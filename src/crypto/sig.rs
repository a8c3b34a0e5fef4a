// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Algorithm-generic signature traits.

use crate::status::Classify;
use crate::status::ErrorKind;

/// A signature algorithm a manifest may be signed with.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Algo {
    /// ECDSA over NIST P-256 with SHA-256, with the signature encoded as the
    /// fixed-width concatenation `r || s`.
    EcdsaP256Sha256,
    /// Pure EdDSA over Curve25519.
    Ed25519,
}

impl Algo {
    /// Maps a COSE algorithm identifier onto an `Algo`.
    ///
    /// See https://www.iana.org/assignments/cose/cose.xhtml#algorithms.
    pub fn from_cose(id: i32) -> Option<Self> {
        match id {
            -7 => Some(Self::EcdsaP256Sha256),
            -8 => Some(Self::Ed25519),
            _ => None,
        }
    }

    /// Returns the COSE algorithm identifier for this `Algo`.
    pub fn to_cose(self) -> i32 {
        match self {
            Self::EcdsaP256Sha256 => -7,
            Self::Ed25519 => -8,
        }
    }

    /// Returns the length of a signature with this algorithm, in bytes.
    pub const fn sig_bytes(self) -> usize {
        64
    }
}

/// An error returned by a signature operation.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Error {
    /// The signature did not verify.
    BadSignature,
    /// The signature had the wrong length for its algorithm.
    WrongLength,
    /// The key ID is not known to this provider.
    UnknownKey,
    /// The key exists, but is not usable with the requested algorithm.
    AlgoMismatch,
    /// Indicates an unspecified, internal error.
    Unspecified,
}

impl Classify for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::BadSignature => ErrorKind::Condition,
            Self::WrongLength | Self::AlgoMismatch => ErrorKind::Decoding,
            Self::UnknownKey => ErrorKind::Unauthorized,
            Self::Unspecified => ErrorKind::Io,
        }
    }
}

/// A signature-verification engine, already primed with a key.
///
/// There is no way to extract the key back out of a `Verify` value.
pub trait Verify {
    /// Uses this engine to verify `signature` over `message`.
    ///
    /// If the underlying cryptographic operation succeeds, returns `Ok(())`.
    /// Failures, including signature check failures, are included in the
    /// `Err` variant.
    fn verify(&mut self, signature: &[u8], message: &[u8]) -> Result<(), Error>;
}

/// An signing engine, already primed with a keypair.
///
/// There is no way to extract the keypair back out of a `Sign` value.
pub trait Sign {
    /// Returns the number of bytes a signature produced by this signer needs.
    fn sig_bytes(&self) -> usize;

    /// Uses this signer to create a signature value for `message`.
    fn sign(&mut self, message: &[u8], signature: &mut [u8])
        -> Result<(), Error>;
}

/// A source of verification keys, looked up by numeric key ID.
///
/// This is the interface to a platform's key store: the keys themselves
/// never leave it.
pub trait Provider {
    /// Verifies `signature` over `message` with the key `key_id`, using
    /// `algo`.
    ///
    /// Returns [`Error::UnknownKey`] if this provider does not hold
    /// `key_id`, so that callers can fall back to another provider.
    fn verify(
        &mut self,
        key_id: u32,
        algo: Algo,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), Error>;
}

// Ensure object-safety.
impl dyn Provider {}
impl dyn Verify {}

/// A [`Provider`] which holds no keys at all.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoKeys;

impl Provider for NoKeys {
    fn verify(&mut self, _: u32, _: Algo, _: &[u8], _: &[u8]) -> Result<(), Error> {
        Err(Error::UnknownKey)
    }
}
