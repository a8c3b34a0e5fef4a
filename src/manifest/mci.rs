// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Manifest configuration policy.
//!
//! [`Mci`] combines the provisioned classes, the memory layout and the
//! lifecycle state of each domain into yes-or-no answers about what a
//! manifest of a given class may do. Every check first looks the class up;
//! classes missing from the [`Provisioning`] table fail with
//! [`Error::UnknownClass`] across the board.

use arrayvec::ArrayVec;
use enumflags2::BitFlags;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::component::Uuid;
use crate::config::Domain;
use crate::config::Layout;
use crate::execution_mode::Mode;
use crate::hardware::flash::Region;
use crate::manifest::class::DowngradePolicy;
use crate::manifest::class::IndependentUpdatePolicy;
use crate::manifest::class::Lcs;
use crate::manifest::class::Role;
use crate::manifest::class::SignatureVerificationPolicy;
use crate::manifest::class::KEY_GENERATIONS;
use crate::manifest::mpi::ManifestClass;
use crate::manifest::mpi::Provisioning;
use crate::sink::select::SPECIAL_SDFW;
use crate::sink::select::SPECIAL_SDFW_RECOVERY;
use crate::status::Classify;
use crate::status::ErrorKind;
use crate::Result;

/// Processor IDs, as they appear in `MEM` component IDs.
pub mod processor {
    /// The application core.
    pub const APPLICATION: i32 = 2;
    /// The radio core.
    pub const RADIOCORE: i32 = 3;
    /// The system controller.
    pub const SYSCTRL: i32 = 12;
}

/// A policy error.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Error {
    /// The manifest class is not provisioned.
    UnknownClass,
    /// The key may not sign manifests of this class.
    WrongKeyId,
    /// The class may not perform the requested operation.
    NoAccess,
    /// The question has no answer in the current execution mode.
    IncorrectState,
    /// A class the answer depends on is not provisioned.
    NotFound,
    /// The request itself is malformed.
    Invalid,
}

impl Classify for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownClass | Self::WrongKeyId | Self::NoAccess => {
                ErrorKind::Unauthorized
            }
            Self::IncorrectState => ErrorKind::State,
            Self::NotFound => ErrorKind::Unsupported,
            Self::Invalid => ErrorKind::Decoding,
        }
    }
}

/// The lifecycle state of each domain.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Lifecycle {
    /// The secure domain.
    pub secure: Lcs,
    /// The application domain.
    pub application: Lcs,
    /// The radio domain.
    pub radio: Lcs,
}

impl Lifecycle {
    /// Returns the lifecycle state of `domain`.
    pub fn of(&self, domain: Domain) -> Lcs {
        match domain {
            Domain::Secure => self.secure,
            Domain::Application => self.application,
            Domain::Radio => self.radio,
        }
    }
}

/// The manifest configuration policy of a device.
#[derive(Copy, Clone, Debug)]
pub struct Mci<'a> {
    provisioning: &'a Provisioning,
    layout: &'a Layout,
    lifecycle: Lifecycle,
}

impl<'a> Mci<'a> {
    /// Creates a new policy over the given provisioning table and layout.
    pub fn new(
        provisioning: &'a Provisioning,
        layout: &'a Layout,
        lifecycle: Lifecycle,
    ) -> Self {
        Self {
            provisioning,
            layout,
            lifecycle,
        }
    }

    /// Returns every class this device accepts manifests of.
    pub fn supported_classes(&self) -> &'a [ManifestClass] {
        self.provisioning.classes()
    }

    /// Returns the classes whose manifests are invoked in `mode`, in order.
    pub fn invoke_order(&self, mode: Mode) -> Result<ArrayVec<Uuid, 2>, Error> {
        let roles: &[&[Role]] = match mode {
            Mode::Invoke => &[&[Role::SecTop], &[Role::AppRoot]],
            Mode::InvokeRecovery => {
                &[&[Role::SecTop], &[Role::AppRecovery, Role::AppRoot]]
            }
            _ => {
                return fail!(
                    Error::IncorrectState,
                    "no invoke order in {:?}",
                    mode
                )
            }
        };

        let mut order = ArrayVec::new();
        for candidates in roles {
            let class = candidates
                .iter()
                .find_map(|&role| self.provisioning.by_role(role));
            match class {
                Some(class) => order.push(class.class_id),
                None => {
                    return fail!(
                        Error::NotFound,
                        "no class provisioned for {:?}",
                        candidates
                    )
                }
            }
        }
        Ok(order)
    }

    /// Returns whether downgrades are prevented for `class`.
    pub fn downgrade_prevention_policy(
        &self,
        class: &Uuid,
    ) -> Result<DowngradePolicy, Error> {
        Ok(self.lookup(class)?.downgrade_prevention)
    }

    /// Returns whether `class` may be updated independently in `mode`.
    ///
    /// Recovery manifests are never updated on their own while recovery is
    /// in progress, and after a failed secure domain top install only the
    /// top manifest is.
    pub fn independent_update_policy(
        &self,
        class: &Uuid,
        mode: Mode,
    ) -> Result<IndependentUpdatePolicy, Error> {
        let entry = self.lookup(class)?;
        let denied = match mode {
            Mode::InvokeRecovery
            | Mode::InstallRecovery
            | Mode::PostInvokeRecovery => {
                matches!(entry.role, Role::AppRecovery | Role::RadRecovery)
            }
            Mode::FailInstallNordicTop => entry.role != Role::SecTop,
            _ => false,
        };
        if denied {
            return Ok(IndependentUpdatePolicy::Denied);
        }
        Ok(entry.independent_update)
    }

    /// Checks that `class` is provisioned.
    pub fn validate_class(&self, class: &Uuid) -> Result<(), Error> {
        self.lookup(class).map(|_| ())
    }

    /// Checks that `key_id` may sign manifests of `class` in `mode`.
    ///
    /// Key ID zero stands for "no signature". It is accepted while the
    /// class's domain is still being provisioned, or when the class's
    /// signature verification policy does not apply in `mode`.
    pub fn validate_signing_key(
        &self,
        class: &Uuid,
        key_id: u32,
        mode: Mode,
    ) -> Result<(), Error> {
        let entry = self.lookup(class)?;
        if key_id == 0 {
            let unsigned_ok = self
                .lifecycle
                .of(entry.role.domain())
                .is_provisioning()
                || match entry.signature_verification {
                    SignatureVerificationPolicy::Disabled => true,
                    SignatureVerificationPolicy::EnabledOnUpdate => {
                        mode == Mode::Invoke
                    }
                    SignatureVerificationPolicy::EnabledOnUpdateAndBoot => false,
                };
            check!(unsigned_ok, Error::WrongKeyId);
            return Ok(());
        }

        let first = entry.role.key_window();
        check!(
            key_id >= first && key_id - first <= KEY_GENERATIONS,
            Error::WrongKeyId
        );
        Ok(())
    }

    /// Checks that a manifest of `class` may start processor `cpu_id`.
    pub fn validate_processor_start_rights(
        &self,
        class: &Uuid,
        cpu_id: i32,
    ) -> Result<(), Error> {
        let role = self.lookup(class)?.role;
        let startable = match role {
            Role::SecTop | Role::SecSdfw | Role::AppRoot => None,
            Role::SecSysctrl => Some(processor::SYSCTRL),
            r => match r.domain() {
                Domain::Application => Some(processor::APPLICATION),
                Domain::Radio => Some(processor::RADIOCORE),
                Domain::Secure => None,
            },
        };
        check!(startable == Some(cpu_id), Error::NoAccess);
        Ok(())
    }

    /// Checks that a manifest of `class` may touch `region`.
    ///
    /// Secure domain firmware and system controller manifests may touch any
    /// memory; application and radio manifests only memory their own domain
    /// owns; top-level and root manifests none at all.
    pub fn validate_memory_access(
        &self,
        class: &Uuid,
        region: Region,
    ) -> Result<(), Error> {
        let role = self.lookup(class)?.role;
        check!(region.len > 0, Error::Invalid);

        let allowed: BitFlags<Domain> = match role {
            Role::SecTop | Role::AppRoot => BitFlags::empty(),
            Role::SecSdfw | Role::SecSysctrl => BitFlags::all(),
            r => r.domain().into(),
        };
        if allowed.is_all() {
            return Ok(());
        }
        match self.layout.owner_of(region) {
            Some(owner) if allowed.contains(owner) => Ok(()),
            _ => fail!(
                Error::NoAccess,
                "{:?} may not touch {:?}",
                role,
                region
            ),
        }
    }

    /// Checks that a manifest of `class` may use special component `n`.
    pub fn validate_special_component(
        &self,
        class: &Uuid,
        n: u32,
    ) -> Result<(), Error> {
        let role = self.lookup(class)?.role;
        check!(
            role == Role::SecSdfw
                && (n == SPECIAL_SDFW || n == SPECIAL_SDFW_RECOVERY),
            Error::NoAccess
        );
        Ok(())
    }

    /// Returns the vendor that issues manifests of `class`.
    pub fn vendor_id(&self, class: &Uuid) -> Result<Uuid, Error> {
        Ok(self.lookup(class)?.vendor_id)
    }

    /// Checks that a manifest of class `parent` may declare a manifest of
    /// class `child` as a dependency.
    pub fn validate_parent_child(
        &self,
        parent: &Uuid,
        child: &Uuid,
    ) -> Result<(), Error> {
        let parent = self.lookup(parent)?.role;
        let child = self.lookup(child)?.role;
        let ok = match parent {
            Role::AppRoot => child.is_local() || child == Role::SecTop,
            Role::SecTop => is_secure_child(child),
            Role::AppRecovery => child.is_local() || child == Role::RadRecovery,
            _ => false,
        };
        check!(ok, Error::NoAccess);
        Ok(())
    }

    /// Checks that a manifest of class `parent` may process its dependency
    /// of class `child` in `mode`.
    pub fn validate_process_dependency(
        &self,
        parent: &Uuid,
        child: &Uuid,
        mode: Mode,
    ) -> Result<(), Error> {
        let parent = self.lookup(parent)?.role;
        let child = self.lookup(child)?.role;

        let top = parent == Role::SecTop && is_secure_child(child);
        let root = parent == Role::AppRoot && child.is_local();
        let ok = match mode {
            Mode::Invoke => top || root,
            Mode::Install => {
                top || root
                    || (parent == Role::AppRoot && child == Role::SecTop)
                    || (parent == Role::AppRecovery
                        && child == Role::RadRecovery)
            }
            Mode::InstallRecovery => {
                top || root
                    || (parent == Role::AppRoot && child == Role::SecTop)
            }
            Mode::InvokeRecovery => {
                top || root
                    || (parent == Role::AppRecovery
                        && (child.is_local() || child == Role::RadRecovery))
            }
            Mode::FailInstallNordicTop => top,
            _ => false,
        };
        check!(ok, Error::NoAccess);
        Ok(())
    }

    fn lookup(&self, class: &Uuid) -> Result<&'a ManifestClass, Error> {
        match self.provisioning.by_class(class) {
            Some(entry) => Ok(entry),
            None => fail!(Error::UnknownClass, "unknown manifest class {}", class),
        }
    }
}

fn is_secure_child(role: Role) -> bool {
    matches!(role, Role::SecSysctrl | Role::SecSdfw)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::manifest::mpi::test::class;

    const APP_MEM: u32 = 0x0e0a_0000;
    const RAD_MEM: u32 = 0x0e0b_0000;

    fn setup(roles: &[Role]) -> (Provisioning, Layout) {
        let mut mpi = Provisioning::new();
        for &role in roles {
            mpi.insert(class(role)).unwrap();
        }
        let mut layout = Layout::default();
        layout
            .owners
            .push((Region::new(APP_MEM, 0x1_0000), Domain::Application));
        layout
            .owners
            .push((Region::new(RAD_MEM, 0x1_0000), Domain::Radio));
        (mpi, layout)
    }

    fn id(role: Role) -> Uuid {
        class(role).class_id
    }

    fn err<T>(r: Result<T, Error>) -> Option<Error> {
        r.err().map(|e| e.into_inner())
    }

    const ALL: &[Role] = &[
        Role::SecTop,
        Role::SecSdfw,
        Role::SecSysctrl,
        Role::AppRoot,
        Role::AppRecovery,
        Role::AppLocal1,
        Role::AppLocal2,
        Role::AppLocal3,
        Role::RadRecovery,
        Role::RadLocal1,
        Role::RadLocal2,
    ];

    #[test]
    fn signing_keys() {
        let (mut mpi, layout) = setup(&[Role::AppRoot, Role::RadLocal1]);
        let mut lenient = class(Role::AppLocal1);
        lenient.signature_verification =
            SignatureVerificationPolicy::EnabledOnUpdate;
        mpi.insert(lenient).unwrap();
        let mci = Mci::new(&mpi, &layout, Lifecycle::default());

        let root = id(Role::AppRoot);
        mci.validate_signing_key(&root, 0x4000_aa00, Mode::Install)
            .unwrap();
        mci.validate_signing_key(&root, 0x4000_aa02, Mode::Install)
            .unwrap();
        assert_eq!(
            err(mci.validate_signing_key(&root, 0x4000_aa03, Mode::Install)),
            Some(Error::WrongKeyId)
        );
        assert_eq!(
            err(mci.validate_signing_key(&root, 0x4000_bb00, Mode::Install)),
            Some(Error::WrongKeyId)
        );
        assert_eq!(
            err(mci.validate_signing_key(&root, 0, Mode::Invoke)),
            Some(Error::WrongKeyId)
        );
        mci.validate_signing_key(&id(Role::RadLocal1), 0x4003_2101, Mode::Install)
            .unwrap();

        let local = lenient.class_id;
        mci.validate_signing_key(&local, 0, Mode::Invoke).unwrap();
        assert_eq!(
            err(mci.validate_signing_key(&local, 0, Mode::Install)),
            Some(Error::WrongKeyId)
        );

        assert_eq!(
            err(mci.validate_signing_key(&id(Role::SecTop), 0, Mode::Install)),
            Some(Error::UnknownClass)
        );

        let provisioning = Lifecycle {
            application: Lcs::RotDebug,
            ..Lifecycle::default()
        };
        let mci = Mci::new(&mpi, &layout, provisioning);
        mci.validate_signing_key(&root, 0, Mode::Install).unwrap();
        assert_eq!(
            err(mci.validate_signing_key(&id(Role::RadLocal1), 0, Mode::Install)),
            Some(Error::WrongKeyId)
        );
    }

    #[test]
    fn memory_and_components() {
        let (mpi, layout) = setup(ALL);
        let mci = Mci::new(&mpi, &layout, Lifecycle::default());
        let app = Region::new(APP_MEM + 0x100, 0x100);
        let rad = Region::new(RAD_MEM, 0x100);
        let unowned = Region::new(0x2000_0000, 0x100);

        mci.validate_memory_access(&id(Role::AppLocal2), app).unwrap();
        mci.validate_memory_access(&id(Role::RadRecovery), rad).unwrap();
        mci.validate_memory_access(&id(Role::SecSdfw), unowned).unwrap();
        mci.validate_memory_access(&id(Role::SecSysctrl), rad).unwrap();
        assert_eq!(
            err(mci.validate_memory_access(&id(Role::AppLocal2), rad)),
            Some(Error::NoAccess)
        );
        assert_eq!(
            err(mci.validate_memory_access(&id(Role::RadLocal1), unowned)),
            Some(Error::NoAccess)
        );
        assert_eq!(
            err(mci.validate_memory_access(&id(Role::AppRoot), app)),
            Some(Error::NoAccess)
        );
        assert_eq!(
            err(mci.validate_memory_access(
                &id(Role::AppLocal1),
                Region::new(APP_MEM, 0)
            )),
            Some(Error::Invalid)
        );

        mci.validate_special_component(&id(Role::SecSdfw), 1).unwrap();
        mci.validate_special_component(&id(Role::SecSdfw), 2).unwrap();
        assert_eq!(
            err(mci.validate_special_component(&id(Role::SecSdfw), 3)),
            Some(Error::NoAccess)
        );
        assert_eq!(
            err(mci.validate_special_component(&id(Role::SecTop), 1)),
            Some(Error::NoAccess)
        );

        mci.validate_processor_start_rights(&id(Role::AppLocal1), 2)
            .unwrap();
        mci.validate_processor_start_rights(&id(Role::RadRecovery), 3)
            .unwrap();
        mci.validate_processor_start_rights(&id(Role::SecSysctrl), 12)
            .unwrap();
        assert_eq!(
            err(mci.validate_processor_start_rights(&id(Role::AppRoot), 2)),
            Some(Error::NoAccess)
        );
        assert_eq!(
            err(mci.validate_processor_start_rights(&id(Role::RadLocal2), 2)),
            Some(Error::NoAccess)
        );
    }

    #[test]
    fn dependencies() {
        let (mpi, layout) = setup(ALL);
        let mci = Mci::new(&mpi, &layout, Lifecycle::default());
        let ok = |p, c, mode| {
            mci.validate_process_dependency(&id(p), &id(c), mode).is_ok()
        };

        assert!(ok(Role::SecTop, Role::SecSdfw, Mode::FailInstallNordicTop));
        assert!(!ok(Role::AppRoot, Role::AppLocal1, Mode::FailInstallNordicTop));
        assert!(ok(Role::AppRoot, Role::SecTop, Mode::Install));
        assert!(ok(Role::AppRoot, Role::SecTop, Mode::InstallRecovery));
        assert!(!ok(Role::AppRoot, Role::SecTop, Mode::Invoke));
        assert!(ok(Role::AppRecovery, Role::RadRecovery, Mode::Install));
        assert!(!ok(Role::AppRecovery, Role::RadRecovery, Mode::InstallRecovery));
        assert!(ok(Role::AppRecovery, Role::RadLocal2, Mode::InvokeRecovery));
        assert!(!ok(Role::AppRecovery, Role::RadLocal2, Mode::Invoke));
        assert!(ok(Role::AppRoot, Role::RadLocal1, Mode::InvokeRecovery));
        assert!(!ok(Role::SecTop, Role::SecSdfw, Mode::PostInvoke));
        assert!(!ok(Role::AppLocal1, Role::AppLocal2, Mode::Install));

        mci.validate_parent_child(&id(Role::AppRoot), &id(Role::SecTop))
            .unwrap();
        mci.validate_parent_child(&id(Role::AppRecovery), &id(Role::AppLocal3))
            .unwrap();
        assert_eq!(
            err(mci.validate_parent_child(&id(Role::SecTop), &id(Role::AppRoot))),
            Some(Error::NoAccess)
        );
        assert_eq!(
            err(mci.validate_parent_child(&id(Role::AppRoot), &Uuid([9; 16]))),
            Some(Error::UnknownClass)
        );
    }

    #[test]
    fn invoke_order_and_updates() {
        let (mpi, layout) = setup(&[Role::SecTop, Role::AppRoot]);
        let mci = Mci::new(&mpi, &layout, Lifecycle::default());
        assert_eq!(
            mci.invoke_order(Mode::Invoke).unwrap().as_slice(),
            &[id(Role::SecTop), id(Role::AppRoot)]
        );
        // Without a recovery class, recovery boots the root manifest.
        assert_eq!(
            mci.invoke_order(Mode::InvokeRecovery).unwrap().as_slice(),
            &[id(Role::SecTop), id(Role::AppRoot)]
        );
        assert_eq!(
            err(mci.invoke_order(Mode::Install)),
            Some(Error::IncorrectState)
        );

        let (mpi, layout) = setup(ALL);
        let mci = Mci::new(&mpi, &layout, Lifecycle::default());
        assert_eq!(
            mci.invoke_order(Mode::InvokeRecovery).unwrap().as_slice(),
            &[id(Role::SecTop), id(Role::AppRecovery)]
        );
        assert_eq!(mci.supported_classes().len(), ALL.len());
        assert_eq!(mci.vendor_id(&id(Role::AppRoot)).unwrap(), Uuid([0x7e; 16]));
        assert_eq!(
            mci.downgrade_prevention_policy(&id(Role::AppRoot)).unwrap(),
            DowngradePolicy::Enabled
        );

        let policy = |role, mode| {
            mci.independent_update_policy(&id(role), mode).unwrap()
        };
        assert_eq!(
            policy(Role::AppRecovery, Mode::Install),
            IndependentUpdatePolicy::Allowed
        );
        assert_eq!(
            policy(Role::AppRecovery, Mode::InstallRecovery),
            IndependentUpdatePolicy::Denied
        );
        assert_eq!(
            policy(Role::AppRoot, Mode::FailInstallNordicTop),
            IndependentUpdatePolicy::Denied
        );
        assert_eq!(
            policy(Role::SecTop, Mode::FailInstallNordicTop),
            IndependentUpdatePolicy::Allowed
        );

        let (mpi, layout) = setup(&[Role::AppRoot]);
        let mci = Mci::new(&mpi, &layout, Lifecycle::default());
        assert_eq!(err(mci.invoke_order(Mode::Invoke)), Some(Error::NotFound));
    }
}
