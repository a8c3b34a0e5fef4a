// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Pluggable cryptograpy traits.
//!
//! The update core needs to hash payloads and verify manifest signatures.
//! This module provides object-safe traits that abstract over those
//! operations, so that a platform can route them to its own crypto
//! accelerator or key store.
//!
//! It is recommended to not import the traits in this module directly, since
//! a lot of them have the same name. Instead, use imports like
//! `use suit_dfu::crypto::hash;` and partially-qualified names like
//! `hash::Engine`.
//!
//! Software implementations of these traits are provided under the
//! [`ring` module], based on the [`ring`] crate. Their presence is controlled
//! by the `ring` feature flag; signing requires `std` as well.
//!
//! [`ring` module]: ring/index.html

pub mod hash;
pub mod sig;

#[cfg(feature = "ring")]
pub mod ring;
