// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! `suit-dfu` is the core of a [SUIT]-based firmware update pipeline for
//! multi-domain devices.
//!
//! It decides whether a proposed update may be trusted, where its payload
//! bytes are allowed to land, and keeps track of where the device is in its
//! boot and update lifecycle. Parsing manifests and interpreting their
//! command sequences is left to a manifest interpreter, which calls into
//! this crate through a [`Platform`](platform::Platform):
//! - [`sink`] turns component IDs into bounds-checked destinations
//!   ("sinks") over RAM, MRAM, memory behind other processors, or the
//!   [DFU cache](cache);
//! - [`manifest`] authenticates manifests and authorizes what they may do;
//! - [`digest`] checks payload digests;
//! - [`execution_mode`] tracks the lifecycle phase;
//! - [`orchestrator`] drives a stored candidate to installation.
//!
//! Like the rest of the firmware it runs in, this crate does not allocate:
//! every bounded resource (sink contexts, cache partitions, provisioned
//! manifest classes) has a capacity fixed at build time.
//!
//! [SUIT]: https://datatracker.ietf.org/wg/suit/about/

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(missing_docs)]
#![deny(unused)]
#![deny(unsafe_code)]

#[macro_use]
mod debug;

#[macro_use]
pub mod wire;

pub mod cache;
pub mod cbor;
pub mod component;
pub mod config;
pub mod crypto;
pub mod digest;
pub mod execution_mode;
pub mod hardware;
pub mod manifest;
pub mod mem;
pub mod orchestrator;
pub mod platform;
pub mod sink;
pub mod status;

pub use debug::Error;

/// A `suit-dfu` result, wrapping a module-specific error in an [`Error`].
pub type Result<T, E> = core::result::Result<T, Error<E>>;
