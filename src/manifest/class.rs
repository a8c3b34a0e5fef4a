// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Manifest roles and per-class policies.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::Domain;

wire_enum! {
    /// The position a manifest class occupies in the manifest hierarchy.
    ///
    /// The high nibble identifies the domain the role belongs to.
    pub enum Role: u8 {
        /// The secure domain top-level manifest.
        SecTop = 0x10,
        /// The secure domain firmware manifest.
        SecSdfw = 0x11,
        /// The system controller manifest.
        SecSysctrl = 0x12,
        /// The application domain root manifest.
        AppRoot = 0x20,
        /// The application domain recovery manifest.
        AppRecovery = 0x21,
        /// The first application-local manifest.
        AppLocal1 = 0x22,
        /// The second application-local manifest.
        AppLocal2 = 0x23,
        /// The third application-local manifest.
        AppLocal3 = 0x24,
        /// The radio domain recovery manifest.
        RadRecovery = 0x30,
        /// The first radio-local manifest.
        RadLocal1 = 0x31,
        /// The second radio-local manifest.
        RadLocal2 = 0x32,
    }
}

impl Role {
    /// Returns the domain this role belongs to.
    pub fn domain(self) -> Domain {
        match self {
            Self::SecTop | Self::SecSdfw | Self::SecSysctrl => Domain::Secure,
            Self::AppRoot
            | Self::AppRecovery
            | Self::AppLocal1
            | Self::AppLocal2
            | Self::AppLocal3 => Domain::Application,
            Self::RadRecovery | Self::RadLocal1 | Self::RadLocal2 => {
                Domain::Radio
            }
        }
    }

    /// Returns whether this is one of the application- or radio-local roles.
    pub fn is_local(self) -> bool {
        matches!(
            self,
            Self::AppLocal1
                | Self::AppLocal2
                | Self::AppLocal3
                | Self::RadLocal1
                | Self::RadLocal2
        )
    }

    /// Returns the first key ID in the generation window of keys that may
    /// sign manifests with this role.
    pub fn key_window(self) -> u32 {
        match self {
            Self::SecTop | Self::SecSdfw => 0x4000_bb00,
            Self::SecSysctrl => 0x4008_2100,
            Self::AppRoot => 0x4000_aa00,
            Self::AppRecovery
            | Self::AppLocal1
            | Self::AppLocal2
            | Self::AppLocal3 => 0x4002_2100,
            Self::RadRecovery | Self::RadLocal1 | Self::RadLocal2 => {
                0x4003_2100
            }
        }
    }
}

/// The number of key generations in each role's key window, after the
/// first.
pub const KEY_GENERATIONS: u32 = 2;

wire_enum! {
    /// When manifest signatures are checked.
    pub enum SignatureVerificationPolicy: u8 {
        /// Never; unsigned manifests are accepted.
        Disabled = 1,
        /// When installing an update, but not when booting.
        EnabledOnUpdate = 2,
        /// Always.
        EnabledOnUpdateAndBoot = 3,
    }
}

wire_enum! {
    /// Whether an older manifest may replace a newer one.
    pub enum DowngradePolicy: u8 {
        /// Downgrades are allowed.
        Disabled = 1,
        /// Downgrades are rejected.
        Enabled = 2,
    }
}

wire_enum! {
    /// Whether a manifest may be updated without its parent.
    pub enum IndependentUpdatePolicy: u8 {
        /// The manifest is only updated as part of its parent's update.
        Denied = 1,
        /// The manifest may be updated on its own.
        Allowed = 2,
    }
}

/// A domain's lifecycle state.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Lcs {
    /// Not yet provisioned.
    Empty,
    /// Root of trust provisioning.
    Rot,
    /// Root of trust provisioning, with debug enabled.
    RotDebug,
    /// Deployed in the field.
    Deployed,
    /// Decommissioned.
    Discarded,
}

impl Lcs {
    /// Returns whether the domain is still being provisioned, in which case
    /// manifests need not be signed.
    pub fn is_provisioning(self) -> bool {
        matches!(self, Self::Empty | Self::Rot | Self::RotDebug)
    }
}

impl Default for Lcs {
    fn default() -> Self {
        Self::Deployed
    }
}
