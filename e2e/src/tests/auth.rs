// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Manifest authentication and the policy behind it, driven through a
//! `Platform` without running any sequences.

use suit_dfu::cbor;
use suit_dfu::component::ComponentId;
use suit_dfu::crypto::sig::Sign;
use suit_dfu::execution_mode;
use suit_dfu::execution_mode::ExecutionMode;
use suit_dfu::execution_mode::Mode;
use suit_dfu::manifest::auth;
use suit_dfu::manifest::class::IndependentUpdatePolicy;
use suit_dfu::manifest::class::Role;
use suit_dfu::manifest::class::SignatureVerificationPolicy;
use suit_dfu::manifest::mci;
use suit_dfu::manifest::mci::processor;
use suit_dfu::manifest::mpi::Provisioning;
use suit_dfu::status::ErrorKind;

use crate::device;
use crate::device::Virtual;
use crate::fakes::encode_id;
use crate::fakes::Script;
use crate::fakes::Trigger;
use crate::tests::ed25519;
use crate::tests::p256;

const ROOT_KEY: u32 = 0x4000_aa00;
const LOCAL_KEY: u32 = 0x4002_2100;

fn manifest_id(role: Role) -> Vec<u8> {
    encode_id(ComponentId::InstalledManifest(device::class_id(role)))
}

fn kid(key_id: u32) -> Vec<u8> {
    let mut buf = [0; 8];
    let mut encoder = cbor::Encoder::new(&mut buf);
    encoder.int(cbor::Int::from_u32(key_id)).unwrap();
    encoder.finish().to_vec()
}

fn sign(signer: &mut dyn Sign, data: &[u8]) -> Vec<u8> {
    let mut sig = vec![0; signer.sig_bytes()];
    signer.sign(data, &mut sig).unwrap();
    sig
}

fn mode(mode: Mode) -> ExecutionMode {
    let mut m = ExecutionMode::new();
    if mode != Mode::Startup {
        m.set(mode).unwrap();
    }
    m
}

#[test]
fn builtin_and_stored_keys() {
    // The root key is compiled in, the local keys live in the key store,
    // and one generation of local key has been rotated in.
    let mut root = ed25519();
    let mut local = p256();
    let virt = Virtual::new(device::Options {
        builtin_keys: vec![(ROOT_KEY, root.public())],
        keys: vec![
            (LOCAL_KEY, local.public()),
            (LOCAL_KEY + 2, local.public()),
        ],
        ..Default::default()
    });
    let data = b"Sig_structure";
    let install = mode(Mode::Install);

    virt.boot(Script::new(&virt.mram), Trigger::default(), |o| {
        let p = o.platform();
        let sig = sign(&mut root, data);
        p.authenticate_manifest(
            &manifest_id(Role::AppRoot),
            -8,
            &kid(ROOT_KEY),
            &sig,
            data,
            &install,
        )
        .unwrap();

        let sig = sign(&mut local, data);
        for &key in &[LOCAL_KEY, LOCAL_KEY + 2] {
            p.authenticate_manifest(
                &manifest_id(Role::AppLocal1),
                -7,
                &kid(key),
                &sig,
                data,
                &install,
            )
            .unwrap();
        }

        // Inside the window, but never provisioned.
        let e = p
            .authenticate_manifest(
                &manifest_id(Role::AppLocal1),
                -7,
                &kid(LOCAL_KEY + 1),
                &sig,
                data,
                &install,
            )
            .unwrap_err();
        assert_eq!(e.into_inner(), auth::Error::BadSignature);

        // Past the last generation.
        let e = p
            .authenticate_manifest(
                &manifest_id(Role::AppLocal1),
                -7,
                &kid(LOCAL_KEY + 3),
                &sig,
                data,
                &install,
            )
            .unwrap_err();
        assert_eq!(e.into_inner(), auth::Error::UnauthorizedKey);
        assert!(e.as_ref().is_authentication_failure());
    });
}

#[test]
fn malformed_requests() {
    let mut local = p256();
    let virt = Virtual::new(device::Options {
        keys: vec![(LOCAL_KEY, local.public())],
        ..Default::default()
    });
    let data = b"Sig_structure";
    let sig = sign(&mut local, data);
    let install = mode(Mode::Install);

    virt.boot(Script::new(&virt.mram), Trigger::default(), |o| {
        let p = o.platform();
        let local_id = manifest_id(Role::AppLocal1);

        let e = p
            .authenticate_manifest(&local_id, -7, &[0x41, 0x00], &sig, data, &install)
            .unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Decoding);
        let e = p
            .authenticate_manifest(&local_id, -99, &kid(LOCAL_KEY), &sig, data, &install)
            .unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Decoding);
        let e = p
            .authenticate_manifest(
                &local_id,
                -7,
                &kid(LOCAL_KEY),
                &sig[..32],
                data,
                &install,
            )
            .unwrap_err();
        assert_eq!(e.into_inner(), auth::Error::Decoding);

        // Not a manifest at all.
        let e = p
            .authenticate_manifest(
                &encode_id(ComponentId::CandidateImage(0)),
                -7,
                &kid(LOCAL_KEY),
                &sig,
                data,
                &install,
            )
            .unwrap_err();
        assert_eq!(e.into_inner(), auth::Error::UnsupportedComponentId);

        // A class nobody provisioned.
        let e = p
            .authenticate_manifest(
                &manifest_id(Role::AppLocal2),
                -7,
                &kid(LOCAL_KEY),
                &sig,
                data,
                &install,
            )
            .unwrap_err();
        assert_eq!(e.into_inner(), auth::Error::UnsupportedComponentId);
        assert!(!e.as_ref().is_authentication_failure());
    });
}

#[test]
fn unsigned_on_boot_only() {
    let mut mpi = Provisioning::new();
    let mut root = device::class(Role::AppRoot);
    root.signature_verification = SignatureVerificationPolicy::EnabledOnUpdate;
    mpi.insert(root).unwrap();
    mpi.insert(device::class(Role::SecTop)).unwrap();
    let virt = Virtual::new(device::Options {
        mpi,
        ..Default::default()
    });

    virt.boot(Script::new(&virt.mram), Trigger::default(), |o| {
        let p = o.platform();
        let root = manifest_id(Role::AppRoot);
        p.authenticate_manifest(&root, -7, &kid(0), &[], b"", &mode(Mode::Invoke))
            .unwrap();
        let e = p
            .authenticate_manifest(&root, -7, &kid(0), &[], b"", &mode(Mode::Install))
            .unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Unauthorized);

        let top = manifest_id(Role::SecTop);
        let e = p
            .authenticate_manifest(&top, -7, &kid(0), &[], b"", &mode(Mode::Invoke))
            .unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Unauthorized);
    });
}

#[test]
fn component_rights() {
    let virt = Virtual::new(Default::default());
    virt.boot(Script::new(&virt.mram), Trigger::default(), |o| {
        let p = o.platform();
        let app = manifest_id(Role::AppLocal1);
        let radio = manifest_id(Role::RadLocal1);
        let image = encode_id(ComponentId::Mem {
            cpu_id: processor::APPLICATION,
            address: device::APP_IMAGE.ptr.address,
            size: 0x100,
        });
        let extmem = encode_id(ComponentId::Mem {
            cpu_id: processor::RADIOCORE,
            address: device::EXT,
            size: 0x100,
        });

        p.authorize_component_id(&app, &image).unwrap();
        p.authorize_component_id(&radio, &extmem).unwrap();
        let e = p.authorize_component_id(&app, &extmem).unwrap_err();
        assert_eq!(e.into_inner(), auth::Error::Policy(mci::Error::NoAccess));
        let e = p.authorize_component_id(&radio, &image).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Unauthorized);

        // Unowned memory belongs to nobody.
        let sdfw = encode_id(ComponentId::Mem {
            cpu_id: processor::APPLICATION,
            address: device::MRAM,
            size: 0x100,
        });
        assert!(p.authorize_component_id(&app, &sdfw).is_err());
        let special = encode_id(ComponentId::Special(1));
        assert!(p.authorize_component_id(&app, &special).is_err());

        for id in &[
            ComponentId::CandidateImage(0),
            ComponentId::CandidateManifest(0),
            ComponentId::CachePool(1),
        ] {
            p.authorize_component_id(&radio, &encode_id(*id)).unwrap();
        }

        p.authorize_processor_start(&app, processor::APPLICATION)
            .unwrap();
        p.authorize_processor_start(&radio, processor::RADIOCORE)
            .unwrap();
        let e = p
            .authorize_processor_start(&app, processor::RADIOCORE)
            .unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Unauthorized);
        let root = manifest_id(Role::AppRoot);
        assert!(p
            .authorize_processor_start(&root, processor::APPLICATION)
            .is_err());
    });
}

#[test]
fn policy_by_mode() {
    let mut mpi = Provisioning::new();
    for &role in &[Role::SecTop, Role::AppRoot, Role::AppRecovery, Role::AppLocal1] {
        mpi.insert(device::class(role)).unwrap();
    }
    let virt = Virtual::new(device::Options {
        mpi,
        ..Default::default()
    });

    virt.boot(Script::new(&virt.mram), Trigger::default(), |o| {
        let mci = *o.platform().authenticator().mci();
        let id = device::class_id;

        assert_eq!(
            &mci.invoke_order(Mode::Invoke).unwrap()[..],
            &[id(Role::SecTop), id(Role::AppRoot)][..]
        );
        assert_eq!(
            &mci.invoke_order(Mode::InvokeRecovery).unwrap()[..],
            &[id(Role::SecTop), id(Role::AppRecovery)][..]
        );
        let e = mci.invoke_order(Mode::Install).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::State);

        assert_eq!(
            mci.independent_update_policy(&id(Role::AppRecovery), Mode::InstallRecovery)
                .unwrap(),
            IndependentUpdatePolicy::Denied
        );
        assert_eq!(
            mci.independent_update_policy(&id(Role::AppRecovery), Mode::Install)
                .unwrap(),
            IndependentUpdatePolicy::Allowed
        );
        assert_eq!(
            mci.independent_update_policy(&id(Role::AppLocal1), Mode::FailInstallNordicTop)
                .unwrap(),
            IndependentUpdatePolicy::Denied
        );
        assert_eq!(
            mci.independent_update_policy(&id(Role::SecTop), Mode::FailInstallNordicTop)
                .unwrap(),
            IndependentUpdatePolicy::Allowed
        );
        let e = mci
            .independent_update_policy(&id(Role::RadLocal1), Mode::Install)
            .unwrap_err();
        assert_eq!(e.into_inner(), mci::Error::UnknownClass);
    });
}

#[test]
fn execution_mode_transitions() {
    let mut m = ExecutionMode::new();
    assert_eq!(m.get(), Mode::Startup);
    assert!(m.booting() && m.updating() && !m.failed());

    m.set(Mode::Install).unwrap();
    assert!(m.updating() && !m.booting());
    assert_eq!(
        m.set(Mode::Startup).unwrap_err().into_inner(),
        execution_mode::Error::Forbidden
    );
    assert_eq!(m.get(), Mode::Install);

    m.startup_failed();
    assert_eq!(m.get(), Mode::FailStartup);
    assert!(m.failed());

    // Settled modes survive a late failure report.
    m.set(Mode::PostInvoke).unwrap();
    m.startup_failed();
    assert_eq!(m.get(), Mode::PostInvoke);

    m.set(Mode::FailInstallNordicTop).unwrap();
    assert!(m.updating() && !m.failed());
    m.startup_failed();
    assert_eq!(m.get(), Mode::FailStartup);
}
