// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Manifest trust decisions.
//!
//! Parsing SUIT manifests and interpreting their command sequences happens
//! elsewhere; this module only answers the questions the interpreter asks
//! along the way:
//! - May a manifest of this class be processed at all, and is its signature
//!   valid? See [`auth::Authenticator::authenticate()`].
//! - May a manifest of this class touch that component? See
//!   [`auth::Authenticator::authorize_component_id()`].
//! - May a manifest of this class pull in a dependency of that class?
//!   See [`auth::Authenticator::authorize_process_dependency()`].
//!
//! Manifests are identified by their *class*, a UUID that is statically
//! provisioned on the device together with the policies that apply to it
//! (the [`mpi::Provisioning`] table). The rules relating classes, keys and
//! components to each other live in [`mci::Mci`].

pub mod auth;
pub mod class;
pub mod mci;
pub mod mpi;

wire_enum! {
    /// A manifest command sequence.
    ///
    /// Values are the SUIT manifest keys the sequences are stored under.
    pub enum Sequence: u8 {
        /// Makes sure all dependency manifests are present.
        DependencyResolution = 15,
        /// Fetches payloads into the DFU cache.
        PayloadFetch = 16,
        /// Installs payloads into their final location.
        Install = 20,
        /// Validates installed payloads.
        Validate = 7,
        /// Loads payloads into their execution location.
        Load = 8,
        /// Starts the installed images.
        Invoke = 9,
    }
}
