// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Pluggable hardware functionality
//!
//! This module provides traits for plugging in the memory drivers the update
//! core writes through: memory-mapped non-volatile memory ([`flash`]),
//! working RAM ([`ram`]), and memory owned by another processor, reached
//! through a request/reply transport ([`extmem`]).
//!
//! Only the contracts the update core relies on are described here; register
//! level semantics are the business of the implementations.

use crate::status::Classify;
use crate::status::ErrorKind;

pub mod extmem;
pub mod flash;
pub mod ram;

/// A hardware error.
///
/// All of these errors are non-retryable; an implementation should block
/// until the operation succeeds or definitively fails.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Indicates that an operation failed because the requested
    /// operation was outside of the device's address space.
    OutOfRange,

    /// Indicates that the device is locked in some manner and cannot
    /// be affected by the operation.
    Locked,

    /// Indicates that an address or length did not meet the device's
    /// alignment requirements.
    Misaligned,

    /// Indicates that a remote device did not answer in time.
    Timeout,

    /// Indicates that an unspecified error occured.
    Unspecified,
}

impl Classify for Error {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Io
    }
}
