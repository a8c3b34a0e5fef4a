// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! The platform interface the manifest interpreter calls into.
//!
//! A [`Platform`] bundles everything a manifest interpreter needs while it
//! runs a command sequence: sinks to write payloads into, the authenticator
//! to vet manifests with, and a hash engine for digest checks. Component
//! IDs arrive here in their encoded form and are decoded exactly once,
//! before they go anywhere else.

use crate::component::ComponentId;
use crate::crypto::hash;
use crate::digest;
use crate::execution_mode::ExecutionMode;
use crate::hardware::flash::Region;
use crate::manifest::auth;
use crate::manifest::auth::Authenticator;
use crate::sink;
use crate::sink::DigestSink;
use crate::sink::Selector;
use crate::sink::Sink;
use crate::Result;

pub use crate::manifest::Sequence;

/// The services offered to a manifest interpreter.
pub struct Platform<'a, 'k> {
    selector: Selector<'a>,
    authenticator: Authenticator<'a, 'k>,
    hash: &'k mut dyn hash::Engine,
}

impl<'a, 'k> Platform<'a, 'k> {
    /// Creates a new `Platform`.
    pub fn new(
        selector: Selector<'a>,
        authenticator: Authenticator<'a, 'k>,
        hash: &'k mut dyn hash::Engine,
    ) -> Self {
        Self {
            selector,
            authenticator,
            hash,
        }
    }

    /// Returns the sink selector.
    pub fn selector(&self) -> &Selector<'a> {
        &self.selector
    }

    /// Returns the authenticator.
    pub fn authenticator(&self) -> &Authenticator<'a, 'k> {
        &self.authenticator
    }

    /// Returns a sink for the encoded component ID `component_id`.
    ///
    /// See [`Selector::select()`].
    pub fn sink_select(
        &self,
        component_id: &[u8],
        uri: Option<&[u8]>,
    ) -> Result<Sink<'a>, sink::Error> {
        let id = ComponentId::decode(component_id)?;
        self.selector.select(&id, uri)
    }

    /// Returns a sink that hashes a streamed payload with the COSE hash
    /// algorithm `cose_alg`, for comparison against `expected`.
    pub fn digest_sink(
        &mut self,
        cose_alg: i32,
        expected: &[u8],
        expected_len: Option<u32>,
    ) -> Result<DigestSink<'_, dyn hash::Engine + 'k>, sink::Error> {
        let algo = match hash::Algo::from_cose(cose_alg) {
            Some(algo) => algo,
            None => {
                return fail!(sink::Error::Digest(hash::Error::Unsupported))
            }
        };
        let pool = self.selector.contexts().digest();
        DigestSink::new(&mut *self.hash, pool, algo, expected, expected_len)
    }

    /// Returns the payload cached under `uri`.
    pub fn cached(&self, uri: &[u8]) -> Result<Region, sink::Error> {
        self.selector.cached(uri)
    }

    /// Authenticates a manifest.
    ///
    /// See [`Authenticator::authenticate()`].
    pub fn authenticate_manifest(
        &mut self,
        component_id: &[u8],
        cose_alg: i32,
        key_id: &[u8],
        signature: &[u8],
        data: &[u8],
        mode: &ExecutionMode,
    ) -> Result<(), auth::Error> {
        self.authenticator.authenticate(
            component_id,
            cose_alg,
            key_id,
            signature,
            data,
            mode.get(),
        )
    }

    /// Checks that a manifest may refer to a component.
    ///
    /// See [`Authenticator::authorize_component_id()`].
    pub fn authorize_component_id(
        &self,
        manifest_id: &[u8],
        component_id: &[u8],
    ) -> Result<(), auth::Error> {
        self.authenticator
            .authorize_component_id(manifest_id, component_id)
    }

    /// Checks that a manifest may start processor `cpu_id`.
    pub fn authorize_processor_start(
        &self,
        manifest_id: &[u8],
        cpu_id: i32,
    ) -> Result<(), auth::Error> {
        self.authenticator
            .authorize_processor_start(manifest_id, cpu_id)
    }

    /// Checks that a manifest may process one of its dependencies.
    ///
    /// See [`Authenticator::authorize_process_dependency()`].
    pub fn authorize_process_dependency(
        &self,
        parent: &[u8],
        child: &[u8],
        sequence: Sequence,
        mode: &ExecutionMode,
    ) -> Result<(), auth::Error> {
        self.authenticator.authorize_process_dependency(
            parent,
            child,
            sequence,
            mode.get(),
        )
    }

    /// Checks the digest of an in-memory payload.
    ///
    /// See [`digest::check_digest()`].
    pub fn check_digest(
        &mut self,
        cose_alg: i32,
        expected: &[u8],
        payload: &[u8],
    ) -> Result<(), digest::Error> {
        digest::check_digest(&mut *self.hash, cose_alg, expected, payload)
    }
}
