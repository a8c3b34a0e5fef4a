// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Error classification.
//!
//! Every module in this crate has its own error enum, but callers such as
//! the [`Orchestrator`] (and the manifest interpreter sitting above it) only
//! care about a handful of broad classes: whether the input was malformed,
//! whether it was refused, whether it was well-formed but wrong, whether a
//! resource ran out, or whether the hardware failed. [`ErrorKind`] is that
//! classification.
//!
//! [`Orchestrator`]: crate::orchestrator::Orchestrator

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A broad class of failure.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ErrorKind {
    /// The input was malformed: a bad component ID, an unsupported
    /// algorithm, a digest or signature of the wrong length.
    ///
    /// Never retried.
    Decoding,

    /// Nothing on this platform can handle the request, such as a component
    /// type that no sink backend claims.
    Unsupported,

    /// The request was understood but refused by policy: an unknown manifest
    /// class, a key not authorized for a class, a forbidden dependency.
    Unauthorized,

    /// The input was well-formed, but wrong: a signature that does not
    /// verify or a digest that does not match.
    ///
    /// Terminal for the current candidate only.
    Condition,

    /// A bounded resource ran out, such as a sink context pool or the free
    /// space in a cache partition.
    ///
    /// Recoverable once the resource is released.
    Resources,

    /// An underlying memory operation failed.
    Io,

    /// An operation was requested in a state that does not permit it.
    State,
}

/// Types which can be classified into an [`ErrorKind`].
pub trait Classify {
    /// Returns the class of this error.
    fn kind(&self) -> ErrorKind;
}
