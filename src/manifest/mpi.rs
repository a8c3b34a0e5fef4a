// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Manifest provisioning information.
//!
//! The MPI is the table of manifest classes a device accepts, written once
//! at provisioning time. Each entry binds a class UUID to a [`Role`] and to
//! the policies that govern manifests of that class.
//!
//! With the `serde` feature, a [`Provisioning`] table (de)serializes as a
//! list of [`ManifestClass`] records, for example:
//! ```text
//! [
//!   {
//!     "vendor_id": "7617daa5-71fd-5a85-8f94-e28d735ce9f4",
//!     "class_id": "08c1b599-55e8-5fbc-9e76-7bc29ce1b04d",
//!     "role": "AppRoot",
//!     "signature_verification": "EnabledOnUpdateAndBoot",
//!     "downgrade_prevention": "Disabled",
//!     "independent_update": "Allowed"
//!   }
//! ]
//! ```

use arrayvec::ArrayVec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::component::Uuid;
use crate::manifest::class::DowngradePolicy;
use crate::manifest::class::IndependentUpdatePolicy;
use crate::manifest::class::Role;
use crate::manifest::class::SignatureVerificationPolicy;
use crate::status::Classify;
use crate::status::ErrorKind;
use crate::Result;

/// The maximum number of manifest classes a device can be provisioned with.
pub const MAX_MANIFEST_CLASSES: usize = 11;

/// A provisioned manifest class.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ManifestClass {
    /// The vendor that issues manifests of this class.
    pub vendor_id: Uuid,
    /// The class itself.
    pub class_id: Uuid,
    /// The class's position in the manifest hierarchy.
    pub role: Role,
    /// When signatures on manifests of this class are checked.
    pub signature_verification: SignatureVerificationPolicy,
    /// Whether manifests of this class may be downgraded.
    pub downgrade_prevention: DowngradePolicy,
    /// Whether manifests of this class may be updated on their own.
    pub independent_update: IndependentUpdatePolicy,
}

/// An error building a [`Provisioning`] table.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Error {
    /// The class, or a class with the same role, is already provisioned.
    Duplicate,
    /// The table is full.
    Full,
}

impl Classify for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Duplicate => ErrorKind::Decoding,
            Self::Full => ErrorKind::Resources,
        }
    }
}

/// The table of provisioned manifest classes.
///
/// Class UUIDs and roles are both unique within a table.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Provisioning {
    classes: ArrayVec<ManifestClass, MAX_MANIFEST_CLASSES>,
}

impl Provisioning {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `class` to the table.
    pub fn insert(&mut self, class: ManifestClass) -> Result<(), Error> {
        let clash = self
            .classes
            .iter()
            .any(|c| c.class_id == class.class_id || c.role == class.role);
        if clash {
            return fail!(
                Error::Duplicate,
                "class {} ({}) is already provisioned",
                class.class_id,
                class.role
            );
        }
        if self.classes.try_push(class).is_err() {
            return fail!(Error::Full);
        }
        Ok(())
    }

    /// Looks up a class by its UUID.
    pub fn by_class(&self, class_id: &Uuid) -> Option<&ManifestClass> {
        self.classes.iter().find(|c| &c.class_id == class_id)
    }

    /// Looks up the class provisioned for `role`.
    pub fn by_role(&self, role: Role) -> Option<&ManifestClass> {
        self.classes.iter().find(|c| c.role == role)
    }

    /// Returns every provisioned class.
    pub fn classes(&self) -> &[ManifestClass] {
        &self.classes
    }
}

#[cfg(feature = "serde")]
impl Serialize for Provisioning {
    fn serialize<S: serde::Serializer>(
        &self,
        s: S,
    ) -> core::result::Result<S::Ok, S::Error> {
        s.collect_seq(self.classes.iter())
    }
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for Provisioning {
    fn deserialize<D: serde::Deserializer<'de>>(
        d: D,
    ) -> core::result::Result<Self, D::Error> {
        struct Visitor;
        impl<'de> serde::de::Visitor<'de> for Visitor {
            type Value = Provisioning;
            fn expecting(
                &self,
                f: &mut core::fmt::Formatter,
            ) -> core::fmt::Result {
                write!(
                    f,
                    "a list of at most {} unique manifest classes",
                    MAX_MANIFEST_CLASSES
                )
            }

            fn visit_seq<A: serde::de::SeqAccess<'de>>(
                self,
                mut seq: A,
            ) -> core::result::Result<Provisioning, A::Error> {
                use serde::de::Error as _;

                let mut table = Provisioning::new();
                while let Some(class) = seq.next_element::<ManifestClass>()? {
                    if let Err(e) = table.insert(class) {
                        return Err(A::Error::custom(match e.into_inner() {
                            Error::Duplicate => "duplicate manifest class",
                            Error::Full => "too many manifest classes",
                        }));
                    }
                }
                Ok(table)
            }
        }
        d.deserialize_seq(Visitor)
    }
}
