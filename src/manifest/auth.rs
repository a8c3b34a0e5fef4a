// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Manifest authentication and authorization.
//!
//! The [`Authenticator`] is the gate the manifest interpreter passes through
//! before acting on a manifest. It answers three kinds of requests, each of
//! which names manifests by their `INSTLD_MFST` component ID:
//! - [`Authenticator::authenticate()`] decides whether a manifest's
//!   signature is acceptable;
//! - [`Authenticator::authorize_component_id()`] decides whether a manifest
//!   may refer to some component;
//! - [`Authenticator::authorize_process_dependency()`] decides whether a
//!   manifest may process one of its dependencies.
//!
//! Signatures are checked against two key stores: one with built-in keys,
//! which is tried first, and a general one that is consulted only for keys
//! the first does not hold.

use crate::cbor;
use crate::component::ComponentId;
use crate::component::Uuid;
use crate::crypto::sig;
use crate::execution_mode::Mode;
use crate::hardware::flash::Region;
use crate::manifest::mci;
use crate::manifest::mci::Mci;
use crate::manifest::Sequence;
use crate::status::Classify;
use crate::status::ErrorKind;
use crate::Result;

/// An authentication or authorization error.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Error {
    /// A manifest component ID was malformed, not an `INSTLD_MFST`, or named
    /// a class that is not provisioned.
    UnsupportedComponentId,
    /// The key ID, algorithm or signature was malformed.
    Decoding,
    /// The key may not sign manifests of this class.
    UnauthorizedKey,
    /// The signature did not verify.
    BadSignature,
    /// The policy refused the request.
    Policy(mci::Error),
}

impl Error {
    /// Returns whether this error means the manifest failed authentication,
    /// as opposed to being malformed or unsupported.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::UnauthorizedKey | Self::BadSignature)
    }
}

impl Classify for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedComponentId => ErrorKind::Unsupported,
            Self::Decoding => ErrorKind::Decoding,
            Self::UnauthorizedKey => ErrorKind::Unauthorized,
            Self::BadSignature => ErrorKind::Condition,
            Self::Policy(e) => e.kind(),
        }
    }
}

impl From<mci::Error> for Error {
    fn from(e: mci::Error) -> Self {
        Self::Policy(e)
    }
}

debug_from!(Error => mci::Error);

/// Authenticates and authorizes manifests.
pub struct Authenticator<'a, 'k> {
    mci: Mci<'a>,
    builtin: &'k mut dyn sig::Provider,
    keys: &'k mut dyn sig::Provider,
}

impl<'a, 'k> Authenticator<'a, 'k> {
    /// Creates a new `Authenticator`.
    ///
    /// `builtin` is consulted first for every signature; `keys` only for key
    /// IDs `builtin` does not know.
    pub fn new(
        mci: Mci<'a>,
        builtin: &'k mut dyn sig::Provider,
        keys: &'k mut dyn sig::Provider,
    ) -> Self {
        Self { mci, builtin, keys }
    }

    /// Returns the policy this authenticator enforces.
    pub fn mci(&self) -> &Mci<'a> {
        &self.mci
    }

    /// Authenticates a manifest.
    ///
    /// `component_id` identifies the manifest, `cose_alg` and `key_id` come
    /// from the protected header of its COSE_Sign1 wrapper (`key_id` being
    /// the contents of the `kid` byte string), and `data` is the
    /// `Sig_structure` the signature covers.
    ///
    /// A manifest whose class allows unsigned manifests in `mode` is
    /// accepted without looking at the signature at all; this is decided
    /// before the key ID is even decoded.
    pub fn authenticate(
        &mut self,
        component_id: &[u8],
        cose_alg: i32,
        key_id: &[u8],
        signature: &[u8],
        data: &[u8],
        mode: Mode,
    ) -> Result<(), Error> {
        let class = manifest_class(component_id)?;

        if self.mci.validate_signing_key(&class, 0, mode).is_ok() {
            info!("class {} accepts unsigned manifests in {:?}", class, mode);
            return Ok(());
        }

        if self.mci.validate_class(&class).is_err() {
            return fail!(Error::UnsupportedComponentId);
        }

        let key = match cbor::read_one(key_id, |i| i.into_u32()) {
            Ok(key) => key,
            Err(e) => {
                return fail!(Error::Decoding, "bad key id {:02x?}: {:?}", key_id, e)
            }
        };
        if self.mci.validate_signing_key(&class, key, mode).is_err() {
            return fail!(
                Error::UnauthorizedKey,
                "key {:#010x} may not sign class {}",
                key,
                class
            );
        }

        let algo = match sig::Algo::from_cose(cose_alg) {
            Some(algo) => algo,
            None => {
                return fail!(Error::Decoding, "unknown COSE algorithm {}", cose_alg)
            }
        };
        check!(signature.len() == algo.sig_bytes(), Error::Decoding);

        let verified = match self.builtin.verify(key, algo, data, signature) {
            Err(sig::Error::UnknownKey) => {
                trace!("key {:#010x} is not built in", key);
                self.keys.verify(key, algo, data, signature)
            }
            r => r,
        };
        match verified {
            Ok(()) => {
                trace!("manifest of class {} verified with {:?}", class, algo);
                Ok(())
            }
            Err(e) => fail!(
                Error::BadSignature,
                "signature check with key {:#010x} failed: {:?}",
                key,
                e
            ),
        }
    }

    /// Checks that the manifest `manifest_id` may refer to the component
    /// `component_id`.
    ///
    /// Memory ranges and special components are checked against the class's
    /// rights, dependency manifests must be of a provisioned class, and
    /// candidate and cache components are open to every class.
    pub fn authorize_component_id(
        &self,
        manifest_id: &[u8],
        component_id: &[u8],
    ) -> Result<(), Error> {
        let class = manifest_class(manifest_id)?;
        let component = match ComponentId::decode(component_id) {
            Ok(id) => id,
            Err(_) => return fail!(Error::UnsupportedComponentId),
        };

        match component {
            ComponentId::Mem { address, size, .. } => self
                .mci
                .validate_memory_access(&class, Region::new(address, size))?,
            ComponentId::Special(n) => {
                self.mci.validate_special_component(&class, n)?
            }
            ComponentId::InstalledManifest(child) => {
                self.mci.validate_class(&class)?;
                self.mci.validate_class(&child)?;
            }
            ComponentId::CandidateImage(_)
            | ComponentId::CandidateManifest(_)
            | ComponentId::CachePool(_) => self.mci.validate_class(&class)?,
        }
        Ok(())
    }

    /// Checks that the manifest `manifest_id` may start the processor a
    /// `MEM` component is addressed to.
    pub fn authorize_processor_start(
        &self,
        manifest_id: &[u8],
        cpu_id: i32,
    ) -> Result<(), Error> {
        let class = manifest_class(manifest_id)?;
        self.mci.validate_processor_start_rights(&class, cpu_id)?;
        Ok(())
    }

    /// Checks that the manifest `parent` may run `sequence` of its
    /// dependency `child` in `mode`.
    ///
    /// The answer depends on the classes and the mode only; `sequence` is
    /// logged for context.
    pub fn authorize_process_dependency(
        &self,
        parent: &[u8],
        child: &[u8],
        sequence: Sequence,
        mode: Mode,
    ) -> Result<(), Error> {
        let parent = manifest_class(parent)?;
        let child = manifest_class(child)?;
        trace!(
            "{} wants to run {:?} of {} in {:?}",
            parent,
            sequence,
            child,
            mode
        );
        self.mci.validate_process_dependency(&parent, &child, mode)?;
        Ok(())
    }
}

/// Decodes a component ID that must name an installed manifest.
fn manifest_class(component_id: &[u8]) -> Result<Uuid, Error> {
    match ComponentId::decode(component_id) {
        Ok(ComponentId::InstalledManifest(class)) => Ok(class),
        Ok(other) => fail!(
            Error::UnsupportedComponentId,
            "expected a manifest, got a {} component",
            other.type_name()
        ),
        Err(_) => fail!(Error::UnsupportedComponentId),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::config::Layout;
    use crate::manifest::class::Role;
    use crate::manifest::class::SignatureVerificationPolicy;
    use crate::manifest::mci::Lifecycle;
    use crate::manifest::mpi::test::class;
    use crate::manifest::mpi::Provisioning;

    /// Accepts exactly one key, and one signature.
    struct OneKey {
        key_id: u32,
        signature: [u8; 64],
        calls: usize,
    }

    impl sig::Provider for OneKey {
        fn verify(
            &mut self,
            key_id: u32,
            _: sig::Algo,
            _: &[u8],
            signature: &[u8],
        ) -> core::result::Result<(), sig::Error> {
            self.calls += 1;
            if key_id != self.key_id {
                return Err(sig::Error::UnknownKey);
            }
            if signature != &self.signature[..] {
                return Err(sig::Error::BadSignature);
            }
            Ok(())
        }
    }

    fn manifest_id(class: Uuid) -> Vec<u8> {
        let mut buf = [0; 64];
        ComponentId::InstalledManifest(class)
            .encode(&mut buf)
            .unwrap()
            .to_vec()
    }

    fn encode_key(key: u32) -> Vec<u8> {
        let mut buf = [0; 8];
        let mut e = cbor::Encoder::new(&mut buf);
        e.int(cbor::Int::from_u32(key)).unwrap();
        e.finish().to_vec()
    }

    #[test]
    fn builtin_then_general_keys() {
        let mut mpi = Provisioning::new();
        mpi.insert(class(Role::AppRoot)).unwrap();
        let layout = Layout::default();
        let mci = Mci::new(&mpi, &layout, Lifecycle::default());

        let mut builtin = OneKey {
            key_id: 0x4000_aa00,
            signature: [1; 64],
            calls: 0,
        };
        let mut general = OneKey {
            key_id: 0x4000_aa01,
            signature: [2; 64],
            calls: 0,
        };
        let mut auth = Authenticator::new(mci, &mut builtin, &mut general);
        let root = manifest_id(class(Role::AppRoot).class_id);
        let run = |auth: &mut Authenticator, key, sig: &[u8; 64]| {
            auth.authenticate(&root, -7, &encode_key(key), sig, b"data", Mode::Install)
                .map_err(|e| e.into_inner())
        };

        assert_eq!(run(&mut auth, 0x4000_aa00, &[1; 64]), Ok(()));
        assert_eq!(run(&mut auth, 0x4000_aa01, &[2; 64]), Ok(()));
        assert_eq!(
            run(&mut auth, 0x4000_aa01, &[1; 64]),
            Err(Error::BadSignature)
        );
        assert_eq!(
            run(&mut auth, 0x4000_aa02, &[1; 64]),
            Err(Error::BadSignature)
        );
        assert_eq!(
            run(&mut auth, 0x4000_bb00, &[1; 64]),
            Err(Error::UnauthorizedKey)
        );
        drop(auth);
        assert_eq!(builtin.calls, 4);
        assert_eq!(general.calls, 3);
    }

    #[test]
    fn malformed_requests() {
        let mut mpi = Provisioning::new();
        mpi.insert(class(Role::AppRoot)).unwrap();
        let layout = Layout::default();
        let mci = Mci::new(&mpi, &layout, Lifecycle::default());
        let mut builtin = sig::NoKeys;
        let mut general = sig::NoKeys;
        let mut auth = Authenticator::new(mci, &mut builtin, &mut general);

        let root = manifest_id(class(Role::AppRoot).class_id);
        let key = encode_key(0x4000_aa00);
        let err = |r: Result<(), Error>| r.unwrap_err().into_inner();

        let mut buf = [0; 64];
        let cand = ComponentId::CandidateManifest(0).encode(&mut buf).unwrap();
        assert_eq!(
            err(auth.authenticate(cand, -7, &key, &[0; 64], b"", Mode::Install)),
            Error::UnsupportedComponentId
        );
        let unknown = manifest_id(Uuid([0x55; 16]));
        assert_eq!(
            err(auth.authenticate(&unknown, -7, &key, &[0; 64], b"", Mode::Install)),
            Error::UnsupportedComponentId
        );
        assert_eq!(
            err(auth.authenticate(&root, -7, &[0x41, 0], &[0; 64], b"", Mode::Install)),
            Error::Decoding
        );
        assert_eq!(
            err(auth.authenticate(&root, -35, &key, &[0; 64], b"", Mode::Install)),
            Error::Decoding
        );
        assert_eq!(
            err(auth.authenticate(&root, -8, &key, &[0; 63], b"", Mode::Install)),
            Error::Decoding
        );
        assert_eq!(
            err(auth.authenticate(&root, -8, &key, &[0; 64], b"", Mode::Install)),
            Error::BadSignature
        );
        assert_eq!(Error::BadSignature.kind(), ErrorKind::Condition);
        assert!(Error::UnauthorizedKey.is_authentication_failure());
    }

    #[test]
    fn unsigned_bypass_comes_first() {
        let mut mpi = Provisioning::new();
        let mut local = class(Role::AppLocal1);
        local.signature_verification = SignatureVerificationPolicy::Disabled;
        mpi.insert(local).unwrap();
        let layout = Layout::default();
        let mci = Mci::new(&mpi, &layout, Lifecycle::default());
        let mut builtin = sig::NoKeys;
        let mut general = sig::NoKeys;
        let mut auth = Authenticator::new(mci, &mut builtin, &mut general);

        // Neither the bogus key ID nor the missing signature are looked at.
        auth.authenticate(
            &manifest_id(local.class_id),
            0,
            b"\xff",
            b"",
            b"data",
            Mode::Install,
        )
        .unwrap();
    }

    #[test]
    fn component_rights() {
        use crate::config::Domain;

        let mut mpi = Provisioning::new();
        for role in [Role::SecSdfw, Role::AppRoot, Role::AppLocal1] {
            mpi.insert(class(role)).unwrap();
        }
        let mut layout = Layout::default();
        layout
            .owners
            .push((Region::new(0x0e0a_0000, 0x1000), Domain::Application));
        let mci = Mci::new(&mpi, &layout, Lifecycle::default());
        let mut builtin = sig::NoKeys;
        let mut general = sig::NoKeys;
        let auth = Authenticator::new(mci, &mut builtin, &mut general);

        let sdfw = manifest_id(class(Role::SecSdfw).class_id);
        let root = manifest_id(class(Role::AppRoot).class_id);
        let local = manifest_id(class(Role::AppLocal1).class_id);
        let encode = |id: ComponentId| {
            let mut buf = [0; 64];
            id.encode(&mut buf).unwrap().to_vec()
        };
        let mem = encode(ComponentId::Mem {
            cpu_id: 2,
            address: 0x0e0a_0100,
            size: 0x100,
        });
        let err = |r: Result<(), Error>| r.err().map(|e| e.into_inner());

        auth.authorize_component_id(&local, &mem).unwrap();
        assert_eq!(
            err(auth.authorize_component_id(&root, &mem)),
            Some(Error::Policy(mci::Error::NoAccess))
        );
        auth.authorize_component_id(&sdfw, &encode(ComponentId::Special(1)))
            .unwrap();
        assert_eq!(
            err(auth.authorize_component_id(&local, &encode(ComponentId::Special(1)))),
            Some(Error::Policy(mci::Error::NoAccess))
        );
        auth.authorize_component_id(&root, &encode(ComponentId::CachePool(0)))
            .unwrap();
        auth.authorize_component_id(&root, &local).unwrap();
        assert_eq!(
            err(auth.authorize_component_id(&root, &manifest_id(Uuid([3; 16])))),
            Some(Error::Policy(mci::Error::UnknownClass))
        );
        assert_eq!(
            err(auth.authorize_component_id(&root, b"\x80")),
            Some(Error::UnsupportedComponentId)
        );

        auth.authorize_process_dependency(
            &root,
            &local,
            Sequence::DependencyResolution,
            Mode::Install,
        )
        .unwrap();
        assert_eq!(
            err(auth.authorize_process_dependency(
                &local,
                &root,
                Sequence::Install,
                Mode::Install
            )),
            Some(Error::Policy(mci::Error::NoAccess))
        );
        auth.authorize_processor_start(&local, 2).unwrap();
        assert!(auth.authorize_processor_start(&root, 2).is_err());
    }
}
