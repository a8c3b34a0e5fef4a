// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Implementations of [`crypto::sig`] based on [`ring`].
//!
//! Verification works everywhere; signing requires the `std` feature flag
//! to be enabled, since it needs a system RNG.

use arrayvec::ArrayVec;

use ring::signature::VerificationAlgorithm as _;

use crate::crypto::sig;

#[cfg(doc)]
use crate::crypto;

/// The length of an uncompressed SEC1 P-256 public key.
pub const P256_PUBLIC_LEN: usize = 65;

/// The length of an Ed25519 public key.
pub const ED25519_PUBLIC_LEN: usize = 32;

/// A `ring`-based [`sig::Verify`] for fixed-width ECDSA using the P-256
/// curve.
pub struct VerifyP256 {
    key: [u8; P256_PUBLIC_LEN],
}

impl VerifyP256 {
    /// Creates a new `VerifyP256` from the given public-key coordinates.
    pub fn from_coordinates(x: [u8; 32], y: [u8; 32]) -> Self {
        let mut key = [4u8; P256_PUBLIC_LEN];
        key[1..33].copy_from_slice(&x);
        key[33..65].copy_from_slice(&y);
        Self { key }
    }

    /// Creates a new `VerifyP256` from an uncompressed SEC1 point.
    pub fn from_sec1(key: [u8; P256_PUBLIC_LEN]) -> Self {
        Self { key }
    }
}

impl sig::Verify for VerifyP256 {
    fn verify(
        &mut self,
        signature: &[u8],
        message: &[u8],
    ) -> Result<(), sig::Error> {
        if signature.len() != sig::Algo::EcdsaP256Sha256.sig_bytes() {
            return Err(sig::Error::WrongLength);
        }
        ring::signature::ECDSA_P256_SHA256_FIXED
            .verify(
                (&self.key[..]).into(),
                message.into(),
                signature.into(),
            )
            .map_err(|_| sig::Error::BadSignature)
    }
}

/// A `ring`-based [`sig::Verify`] for Ed25519.
pub struct VerifyEd25519 {
    key: [u8; ED25519_PUBLIC_LEN],
}

impl VerifyEd25519 {
    /// Creates a new `VerifyEd25519` from a raw public key.
    pub fn from_public(key: [u8; ED25519_PUBLIC_LEN]) -> Self {
        Self { key }
    }
}

impl sig::Verify for VerifyEd25519 {
    fn verify(
        &mut self,
        signature: &[u8],
        message: &[u8],
    ) -> Result<(), sig::Error> {
        if signature.len() != sig::Algo::Ed25519.sig_bytes() {
            return Err(sig::Error::WrongLength);
        }
        ring::signature::ED25519
            .verify(
                (&self.key[..]).into(),
                message.into(),
                signature.into(),
            )
            .map_err(|_| sig::Error::BadSignature)
    }
}

/// A public key held by a [`Keyring`].
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PublicKey {
    /// An uncompressed SEC1 P-256 point.
    P256([u8; P256_PUBLIC_LEN]),
    /// A raw Ed25519 key.
    Ed25519([u8; ED25519_PUBLIC_LEN]),
}

impl PublicKey {
    /// Returns the signature algorithm this key verifies.
    pub fn algo(&self) -> sig::Algo {
        match self {
            Self::P256(_) => sig::Algo::EcdsaP256Sha256,
            Self::Ed25519(_) => sig::Algo::Ed25519,
        }
    }

    /// Verifies `signature` over `message` with this key.
    pub fn verify(&self, signature: &[u8], message: &[u8]) -> Result<(), sig::Error> {
        use sig::Verify as _;
        match *self {
            Self::P256(k) => VerifyP256::from_sec1(k).verify(signature, message),
            Self::Ed25519(k) => {
                VerifyEd25519::from_public(k).verify(signature, message)
            }
        }
    }
}

/// A fixed-capacity, in-memory [`sig::Provider`].
///
/// This is used for keys compiled into the firmware image, which can be
/// checked without a round-trip to the platform key store.
pub struct Keyring<const N: usize> {
    keys: ArrayVec<(u32, PublicKey), N>,
}

impl<const N: usize> Keyring<N> {
    /// Creates a new, empty `Keyring`.
    pub fn new() -> Self {
        Self {
            keys: ArrayVec::new(),
        }
    }

    /// Adds a key, returning `false` if the keyring is full or `key_id` is
    /// already present.
    pub fn insert(&mut self, key_id: u32, key: PublicKey) -> bool {
        if self.keys.iter().any(|(id, _)| *id == key_id) {
            return false;
        }
        self.keys.try_push((key_id, key)).is_ok()
    }
}

impl<const N: usize> Default for Keyring<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> sig::Provider for Keyring<N> {
    fn verify(
        &mut self,
        key_id: u32,
        algo: sig::Algo,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), sig::Error> {
        let key = self
            .keys
            .iter()
            .find(|(id, _)| *id == key_id)
            .map(|(_, key)| key)
            .ok_or(sig::Error::UnknownKey)?;
        if key.algo() != algo {
            return Err(sig::Error::AlgoMismatch);
        }
        key.verify(signature, message)
    }
}

#[cfg(feature = "std")]
pub use signing::*;

#[cfg(feature = "std")]
mod signing {
    use super::*;
    use ring::signature::KeyPair as _;

    /// A `ring`-based [`sig::Sign`] for fixed-width ECDSA over P-256.
    pub struct SignP256 {
        keypair: ring::signature::EcdsaKeyPair,
    }

    impl SignP256 {
        /// Creates a new `SignP256` from the given PKCS#8-encoded private
        /// key.
        pub fn from_pkcs8(pkcs8: &[u8]) -> Result<Self, sig::Error> {
            let keypair = ring::signature::EcdsaKeyPair::from_pkcs8(
                &ring::signature::ECDSA_P256_SHA256_FIXED_SIGNING,
                pkcs8,
            )
            .map_err(|_| sig::Error::Unspecified)?;
            Ok(Self { keypair })
        }

        /// Generates a fresh PKCS#8-encoded private key.
        pub fn generate_pkcs8() -> Result<Vec<u8>, sig::Error> {
            let rng = ring::rand::SystemRandom::new();
            ring::signature::EcdsaKeyPair::generate_pkcs8(
                &ring::signature::ECDSA_P256_SHA256_FIXED_SIGNING,
                &rng,
            )
            .map(|doc| doc.as_ref().to_vec())
            .map_err(|_| sig::Error::Unspecified)
        }

        /// Returns the public half of this keypair.
        pub fn public(&self) -> PublicKey {
            let mut key = [0; P256_PUBLIC_LEN];
            key.copy_from_slice(self.keypair.public_key().as_ref());
            PublicKey::P256(key)
        }
    }

    impl sig::Sign for SignP256 {
        fn sig_bytes(&self) -> usize {
            sig::Algo::EcdsaP256Sha256.sig_bytes()
        }

        fn sign(
            &mut self,
            message: &[u8],
            signature: &mut [u8],
        ) -> Result<(), sig::Error> {
            let rng = ring::rand::SystemRandom::new();
            let sig = self
                .keypair
                .sign(&rng, message)
                .map_err(|_| sig::Error::Unspecified)?;
            if signature.len() != sig.as_ref().len() {
                return Err(sig::Error::WrongLength);
            }
            signature.copy_from_slice(sig.as_ref());
            Ok(())
        }
    }

    /// A `ring`-based [`sig::Sign`] for Ed25519.
    pub struct SignEd25519 {
        keypair: ring::signature::Ed25519KeyPair,
    }

    impl SignEd25519 {
        /// Creates a new `SignEd25519` from the given PKCS#8-encoded private
        /// key.
        pub fn from_pkcs8(pkcs8: &[u8]) -> Result<Self, sig::Error> {
            let keypair = ring::signature::Ed25519KeyPair::from_pkcs8(pkcs8)
                .map_err(|_| sig::Error::Unspecified)?;
            Ok(Self { keypair })
        }

        /// Generates a fresh PKCS#8-encoded private key.
        pub fn generate_pkcs8() -> Result<Vec<u8>, sig::Error> {
            let rng = ring::rand::SystemRandom::new();
            ring::signature::Ed25519KeyPair::generate_pkcs8(&rng)
                .map(|doc| doc.as_ref().to_vec())
                .map_err(|_| sig::Error::Unspecified)
        }

        /// Returns the public half of this keypair.
        pub fn public(&self) -> PublicKey {
            let mut key = [0; ED25519_PUBLIC_LEN];
            key.copy_from_slice(self.keypair.public_key().as_ref());
            PublicKey::Ed25519(key)
        }
    }

    impl sig::Sign for SignEd25519 {
        fn sig_bytes(&self) -> usize {
            sig::Algo::Ed25519.sig_bytes()
        }

        fn sign(
            &mut self,
            message: &[u8],
            signature: &mut [u8],
        ) -> Result<(), sig::Error> {
            let sig = self.keypair.sign(message);
            if signature.len() != sig.as_ref().len() {
                return Err(sig::Error::WrongLength);
            }
            signature.copy_from_slice(sig.as_ref());
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::sig::Provider as _;
    use crate::crypto::sig::Sign as _;

    #[test]
    #[cfg_attr(miri, ignore)]
    fn p256_round_trip() {
        let pkcs8 = SignP256::generate_pkcs8().unwrap();
        let mut signer = SignP256::from_pkcs8(&pkcs8).unwrap();
        let mut signature = [0; 64];
        signer.sign(b"manifest", &mut signature).unwrap();

        let mut keys = Keyring::<2>::new();
        assert!(keys.insert(0x4000_aa00, signer.public()));
        assert!(!keys.insert(0x4000_aa00, signer.public()));

        let algo = sig::Algo::EcdsaP256Sha256;
        keys.verify(0x4000_aa00, algo, b"manifest", &signature).unwrap();
        assert_eq!(
            keys.verify(0x4000_aa00, algo, b"manifesu", &signature),
            Err(sig::Error::BadSignature)
        );
        assert_eq!(
            keys.verify(0x4000_aa01, algo, b"manifest", &signature),
            Err(sig::Error::UnknownKey)
        );
        assert_eq!(
            keys.verify(0x4000_aa00, sig::Algo::Ed25519, b"manifest", &signature),
            Err(sig::Error::AlgoMismatch)
        );
        assert_eq!(
            keys.verify(0x4000_aa00, algo, b"manifest", &signature[..63]),
            Err(sig::Error::WrongLength)
        );
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn ed25519_round_trip() {
        let pkcs8 = SignEd25519::generate_pkcs8().unwrap();
        let mut signer = SignEd25519::from_pkcs8(&pkcs8).unwrap();
        let mut signature = [0; 64];
        signer.sign(b"manifest", &mut signature).unwrap();

        let public = signer.public();
        public.verify(&signature, b"manifest").unwrap();
        signature[10] ^= 1;
        assert_eq!(
            public.verify(&signature, b"manifest"),
            Err(sig::Error::BadSignature)
        );
    }
}
