// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Execution mode tracking.
//!
//! The execution mode records where the device is in its boot and update
//! lifecycle. It starts out as [`Mode::Startup`] and is then moved along by
//! whoever owns the [`ExecutionMode`] handle; there is exactly one handle,
//! and it is passed explicitly to everything that needs to read or change
//! the mode.

use crate::status::Classify;
use crate::status::ErrorKind;
use crate::Result;

wire_enum! {
    /// A boot or update lifecycle phase.
    pub enum Mode: u32 {
        /// The device is starting up; nothing has been decided yet.
        Startup = 0,
        /// An update candidate is being installed.
        Install = 1,
        /// An update candidate is being installed by the recovery firmware.
        InstallRecovery = 2,
        /// Installed images are being booted.
        Invoke = 3,
        /// The recovery firmware is being booted.
        InvokeRecovery = 4,
        /// Installed images were booted.
        PostInvoke = 5,
        /// The recovery firmware was booted.
        PostInvokeRecovery = 6,
        /// No manifest provisioning information is present.
        FailNoMpi = 7,
        /// The manifest provisioning information is invalid.
        FailMpiInvalid = 8,
        /// Mandatory manifest provisioning information is invalid or missing.
        FailMpiInvalidMissing = 9,
        /// The manifest provisioning information is not supported.
        FailMpiUnsupported = 10,
        /// Booting the recovery firmware failed.
        FailInvokeRecovery = 11,
        /// Installing the secure domain top manifest failed; only a new top
        /// manifest will be accepted.
        FailInstallNordicTop = 12,
        /// Startup failed.
        FailStartup = 13,
    }
}

impl Mode {
    /// Returns whether this mode belongs to the boot path.
    pub fn is_booting(self) -> bool {
        matches!(self, Self::Startup | Self::Invoke | Self::InvokeRecovery)
    }

    /// Returns whether this mode belongs to the update path.
    pub fn is_updating(self) -> bool {
        matches!(
            self,
            Self::Startup
                | Self::Install
                | Self::InstallRecovery
                | Self::FailInstallNordicTop
        )
    }

    /// Returns whether this mode records a hard failure.
    ///
    /// [`Mode::FailInstallNordicTop`] is not one: the device can recover
    /// from it by installing a new top manifest.
    pub fn is_failed(self) -> bool {
        matches!(
            self,
            Self::FailNoMpi
                | Self::FailMpiInvalid
                | Self::FailMpiInvalidMissing
                | Self::FailMpiUnsupported
                | Self::FailInvokeRecovery
                | Self::FailStartup
        )
    }
}

/// An execution mode error.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The requested mode may not be entered through [`ExecutionMode::set()`].
    Forbidden,
}

impl Classify for Error {
    fn kind(&self) -> ErrorKind {
        ErrorKind::State
    }
}

/// The execution mode of this device.
#[derive(Debug, PartialEq, Eq)]
pub struct ExecutionMode {
    mode: Mode,
}

impl ExecutionMode {
    /// Creates the execution mode handle, in [`Mode::Startup`].
    pub fn new() -> Self {
        Self {
            mode: Mode::Startup,
        }
    }

    /// Returns the current mode.
    pub fn get(&self) -> Mode {
        self.mode
    }

    /// Moves to `mode`.
    ///
    /// Any mode can be entered this way, except going back to
    /// [`Mode::Startup`].
    pub fn set(&mut self, mode: Mode) -> Result<(), Error> {
        check!(mode != Mode::Startup, Error::Forbidden);
        info!("execution mode: {:?} -> {:?}", self.mode, mode);
        self.mode = mode;
        Ok(())
    }

    /// Records that startup failed.
    ///
    /// Only modes that are still in progress move to [`Mode::FailStartup`];
    /// the rest are left alone.
    pub fn startup_failed(&mut self) {
        match self.mode {
            Mode::Startup
            | Mode::FailInstallNordicTop
            | Mode::Install
            | Mode::InstallRecovery
            | Mode::Invoke
            | Mode::InvokeRecovery => {
                warn!("startup failed in {:?}", self.mode);
                self.mode = Mode::FailStartup;
            }
            _ => {}
        }
    }

    /// Returns whether the device is booting.
    pub fn booting(&self) -> bool {
        self.mode.is_booting()
    }

    /// Returns whether the device is updating.
    pub fn updating(&self) -> bool {
        self.mode.is_updating()
    }

    /// Returns whether the device has hit a hard failure.
    pub fn failed(&self) -> bool {
        self.mode.is_failed()
    }
}

impl Default for ExecutionMode {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::WireEnum as _;

    #[test]
    fn startup_failure() {
        let mut mode = ExecutionMode::new();
        assert!(mode.booting() && mode.updating() && !mode.failed());

        mode.set(Mode::Invoke).unwrap();
        mode.startup_failed();
        assert_eq!(mode.get(), Mode::FailStartup);
        assert!(mode.failed());

        mode.startup_failed();
        assert_eq!(mode.get(), Mode::FailStartup);

        mode.set(Mode::PostInvoke).unwrap();
        mode.startup_failed();
        assert_eq!(mode.get(), Mode::PostInvoke);
    }

    #[test]
    fn never_back_to_startup() {
        let mut mode = ExecutionMode::new();
        for wire in 0..=13 {
            let m = Mode::from_wire_value(wire).unwrap();
            if m == Mode::Startup {
                continue;
            }
            mode.set(m).unwrap();
            assert_eq!(
                mode.set(Mode::Startup).unwrap_err().into_inner(),
                Error::Forbidden
            );
            assert_eq!(mode.get(), m);
        }
        assert_eq!(Mode::from_wire_value(14), None);
    }

    #[test]
    fn predicates() {
        assert!(Mode::InvokeRecovery.is_booting());
        assert!(!Mode::Install.is_booting());
        assert!(Mode::FailInstallNordicTop.is_updating());
        assert!(!Mode::FailInstallNordicTop.is_failed());
        assert!(Mode::FailMpiUnsupported.is_failed());
        assert!(!Mode::PostInvokeRecovery.is_failed());
        assert!(!Mode::PostInvokeRecovery.is_updating());
    }
}
