// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! End-to-end tests against a [`Virtual`](crate::device::Virtual) device.

use suit_dfu::crypto::ring::sig::SignEd25519;
use suit_dfu::crypto::ring::sig::SignP256;

mod auth;

lazy_static::lazy_static! {
    /// A P-256 key shared by every test; generating one is slow.
    pub static ref P256_PKCS8: Vec<u8> = SignP256::generate_pkcs8().unwrap();
    /// An Ed25519 key shared by every test.
    pub static ref ED25519_PKCS8: Vec<u8> =
        SignEd25519::generate_pkcs8().unwrap();
}

/// Returns a signer for [`P256_PKCS8`].
pub fn p256() -> SignP256 {
    SignP256::from_pkcs8(&P256_PKCS8).unwrap()
}

/// Returns a signer for [`ED25519_PKCS8`].
pub fn ed25519() -> SignEd25519 {
    SignEd25519::from_pkcs8(&ED25519_PKCS8).unwrap()
}

#[ctor::ctor]
fn init_test_logger() {
    env_logger::builder().is_test(true).try_init().ok();
}
