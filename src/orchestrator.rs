// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! The update orchestrator.
//!
//! The [`Orchestrator`] drives an update candidate from "an envelope was
//! written to the DFU partition" to "the secure domain was asked to install
//! it":
//! 1. [`Orchestrator::initialize()`] sets up the DFU cache, and either wipes
//!    or picks up a previously stored candidate.
//! 2. [`Orchestrator::candidate_envelope_stored()`] is called once a new
//!    envelope has been written.
//! 3. [`Orchestrator::candidate_preprocess()`] has the manifest [`Processor`]
//!    run the envelope's dependency resolution and payload fetch sequences,
//!    which fill the DFU cache.
//! 4. [`Orchestrator::update_start()`] hands the envelope and the populated
//!    cache partitions to the [`InstallTrigger`].
//! 5. [`Orchestrator::cleanup()`] erases the candidate.
//!
//! [`Orchestrator::process()`] runs steps 3 and 4, cleaning up on failure.
//!
//! Nothing but [`Orchestrator::cleanup()`] ever erases the envelope.

use zerocopy::AsBytes;
use zerocopy::FromBytes;

use crate::cache;
use crate::cache::Cache;
use crate::config::Layout;
use crate::config::Options;
use crate::execution_mode::ExecutionMode;
use crate::hardware;
use crate::hardware::flash::FlashExt as _;
use crate::hardware::flash::Region;
use crate::hardware::flash::ERASED;
use crate::platform::Platform;
use crate::platform::Sequence;
use crate::status::Classify;
use crate::status::ErrorKind;
use crate::Result;

/// The most regions an [`UpdateRequest`] carries: the envelope, plus every
/// cache partition.
pub const MAX_UPDATE_REGIONS: usize = 1 + cache::PARTITIONS;

/// The sequences [`Orchestrator::candidate_preprocess()`] runs, in order.
const PREPROCESS: [Sequence; 2] =
    [Sequence::DependencyResolution, Sequence::PayloadFetch];

/// An orchestrator error.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Error {
    /// [`Orchestrator::initialize()`] was already called.
    AlreadyInitialized,
    /// [`Orchestrator::initialize()`] was not called yet.
    NotInitialized,
    /// There is no stored candidate.
    NoCandidate,
    /// The stored envelope could not be decoded, or does not fit into the
    /// DFU partition.
    BadEnvelope,
    /// The envelope does not contain the requested sequence.
    ///
    /// Returned by a [`Processor`]; never a failure on its own.
    SequenceUnavailable,
    /// Running a sequence failed.
    Sequence(ErrorKind),
    /// The install trigger refused the update.
    Trigger(ErrorKind),
    /// The DFU cache failed.
    Cache(cache::Error),
    /// The DFU partition failed.
    Io(hardware::Error),
}

impl From<cache::Error> for Error {
    fn from(e: cache::Error) -> Self {
        Self::Cache(e)
    }
}

impl From<hardware::Error> for Error {
    fn from(e: hardware::Error) -> Self {
        Self::Io(e)
    }
}

impl Classify for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyInitialized | Self::NotInitialized | Self::NoCandidate => {
                ErrorKind::State
            }
            Self::BadEnvelope => ErrorKind::Decoding,
            Self::SequenceUnavailable => ErrorKind::Unsupported,
            Self::Sequence(kind) | Self::Trigger(kind) => *kind,
            Self::Cache(e) => e.kind(),
            Self::Io(e) => e.kind(),
        }
    }
}

debug_from!(Error => cache::Error, hardware::Error);

impl Error {
    /// Wraps a failure a [`Processor`] ran into while running a sequence.
    pub fn sequence<E: Classify>(e: crate::Error<E>) -> Self {
        Self::Sequence(e.kind())
    }
}

/// A manifest interpreter.
pub trait Processor {
    /// Decodes the envelope stored at the start of `dfu`, returning its
    /// length in bytes.
    ///
    /// Returns [`Error::BadEnvelope`] if `dfu` does not start with a
    /// well-formed envelope.
    fn envelope_len(&mut self, dfu: Region) -> core::result::Result<u32, Error>;

    /// Runs `sequence` of the manifest in `envelope`.
    ///
    /// Returns [`Error::SequenceUnavailable`] if the manifest has no such
    /// sequence.
    fn run(
        &mut self,
        platform: &mut Platform<'_, '_>,
        envelope: Region,
        sequence: Sequence,
        mode: &ExecutionMode,
    ) -> core::result::Result<(), Error>;
}

/// What became of an update after it was handed to the secure domain.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Installation {
    /// The update will be installed on the next reboot.
    Scheduled,
    /// The update was installed already.
    Completed,
}

/// The secure domain's install entry point.
pub trait InstallTrigger {
    /// Asks the secure domain to install the update described by `request`.
    ///
    /// On success the caller is expected to reboot, unless the update
    /// was [`Installation::Completed`] in place.
    fn trigger(
        &mut self,
        request: &UpdateRequest,
    ) -> core::result::Result<Installation, Error>;
}

// Ensure object-safety.
impl dyn Processor {}
impl dyn InstallTrigger {}

/// The list of regions the secure domain treats as the update.
///
/// The first region is always the envelope; the rest are cache partitions.
/// The layout is fixed, since the request is handed over as raw bytes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, AsBytes, FromBytes)]
#[repr(C)]
pub struct UpdateRequest {
    count: u32,
    regions: [Region; MAX_UPDATE_REGIONS],
}

impl UpdateRequest {
    /// Returns the regions in this request.
    pub fn regions(&self) -> &[Region] {
        let count = (self.count as usize).min(MAX_UPDATE_REGIONS);
        &self.regions[..count]
    }

    /// Returns the envelope region.
    pub fn envelope(&self) -> Option<Region> {
        self.regions().first().copied()
    }

    fn push(&mut self, region: Region) -> bool {
        match self.regions.get_mut(self.count as usize) {
            Some(slot) => {
                *slot = region;
                self.count += 1;
                true
            }
            None => false,
        }
    }
}

/// The result of [`Orchestrator::process()`], as far as the user of a
/// device is concerned.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Outcome {
    /// The candidate was refused, for the given reason.
    Rejected(ErrorKind),
    /// The candidate will be installed on the next reboot.
    Staged,
    /// The candidate was installed.
    Applied,
}

/// Drives update candidates through preprocessing and installation.
pub struct Orchestrator<'a, 'k, P, T> {
    platform: Platform<'a, 'k>,
    processor: P,
    trigger: T,
    options: Options,
    envelope: Option<Region>,
    initialized: bool,
}

impl<'a, 'k, P: Processor, T: InstallTrigger> Orchestrator<'a, 'k, P, T> {
    /// Creates a new `Orchestrator`.
    pub fn new(
        platform: Platform<'a, 'k>,
        processor: P,
        trigger: T,
        options: Options,
    ) -> Self {
        Self {
            platform,
            processor,
            trigger,
            options,
            envelope: None,
            initialized: false,
        }
    }

    /// Returns the platform sequences run against.
    pub fn platform(&mut self) -> &mut Platform<'a, 'k> {
        &mut self.platform
    }

    /// Returns the manifest processor.
    pub fn processor(&mut self) -> &mut P {
        &mut self.processor
    }

    /// Returns the install trigger.
    pub fn trigger(&mut self) -> &mut T {
        &mut self.trigger
    }

    fn layout(&self) -> &'a Layout {
        self.platform.selector().layout()
    }

    fn cache(&self) -> &'a Cache<'a> {
        self.platform.selector().cache()
    }

    /// Initializes the DFU cache, and either cleans up or picks up the
    /// candidate stored in the DFU partition.
    ///
    /// An envelope that cannot be decoded is wiped.
    pub fn initialize(&mut self) -> Result<(), Error> {
        check!(!self.initialized, Error::AlreadyInitialized);
        self.cache()
            .initialize(self.layout(), self.options.cache_erase_on_init)?;
        self.initialized = true;

        if self.options.cleanup_on_init {
            info!("cleaning up the DFU partition on init");
            return self.cleanup();
        }
        if self.dfu_is_blank()? {
            trace!("no candidate stored");
            return Ok(());
        }
        if let Err(e) = self.pick_up(false) {
            warn!("dropping undecodable candidate: {:?}", e);
            return self.cleanup();
        }
        Ok(())
    }

    /// Records that a new envelope was written to the DFU partition.
    ///
    /// Cache partition zero is moved behind it (and erased, if so
    /// configured).
    pub fn candidate_envelope_stored(&mut self) -> Result<(), Error> {
        check!(self.initialized, Error::NotInitialized);
        self.pick_up(self.options.cache0_erase_on_envelope_stored)
    }

    /// Returns whether a candidate is stored.
    pub fn candidate_stored(&self) -> bool {
        self.envelope.is_some()
    }

    /// Runs the stored candidate's dependency resolution and payload fetch
    /// sequences.
    ///
    /// A missing sequence is skipped; any other failure aborts.
    pub fn candidate_preprocess(
        &mut self,
        mode: &ExecutionMode,
    ) -> Result<(), Error> {
        let envelope = self.candidate()?;
        for &sequence in &PREPROCESS {
            match self.processor.run(&mut self.platform, envelope, sequence, mode)
            {
                Ok(()) => {
                    trace!("{:?} done", sequence);
                }
                Err(Error::SequenceUnavailable) => {
                    info!("no {:?} sequence; skipping", sequence);
                }
                Err(e) => return fail!(e, "{:?} failed: {:?}", sequence, e),
            }
        }
        Ok(())
    }

    /// Hands the stored candidate to the secure domain for installation.
    ///
    /// The envelope is left in place whether or not this succeeds.
    pub fn update_start(&mut self) -> Result<Installation, Error> {
        let envelope = self.candidate()?;
        let mut request = UpdateRequest::default();
        request.push(envelope);
        for region in self.cache().populated() {
            if !request.push(region) {
                return fail!(Error::Trigger(ErrorKind::Resources));
            }
        }
        info!("starting update from {:?}", request.regions());
        match self.trigger.trigger(&request) {
            Ok(installation) => Ok(installation),
            Err(e) => fail!(e, "update trigger refused: {:?}", e),
        }
    }

    /// Erases the DFU partition (unless it already is) and resets the DFU
    /// cache.
    pub fn cleanup(&mut self) -> Result<(), Error> {
        check!(self.initialized, Error::NotInitialized);
        self.envelope = None;

        let layout = self.layout();
        let cache = self.cache();
        cache.deinitialize()?;
        self.erase_dfu()?;
        cache.initialize(layout, false)?;
        Ok(())
    }

    /// Preprocesses and installs the stored candidate.
    ///
    /// A rejected candidate is cleaned up, unless it was rejected for lack
    /// of resources; those may be available on a later attempt. In that
    /// case only the payloads fetched during this attempt are discarded, so
    /// that the next attempt can fetch them again.
    pub fn process(&mut self, mode: &ExecutionMode) -> Outcome {
        let mark = self.cache().mark();
        let result = self
            .candidate_preprocess(mode)
            .and_then(|_| self.update_start());
        let kind = match result {
            Ok(Installation::Scheduled) => return Outcome::Staged,
            Ok(Installation::Completed) => return Outcome::Applied,
            Err(e) => e.kind(),
        };

        warn!("candidate rejected: {:?}", kind);
        if kind == ErrorKind::Resources {
            if let Err(e) = self.cache().rollback(&mark) {
                error!("discarding fetched payloads failed: {:?}", e);
            }
        } else if self.candidate_stored() {
            if let Err(e) = self.cleanup() {
                error!("cleanup after rejection failed: {:?}", e);
            }
        }
        Outcome::Rejected(kind)
    }

    fn candidate(&self) -> Result<Region, Error> {
        check!(self.initialized, Error::NotInitialized);
        match self.envelope {
            Some(envelope) => Ok(envelope),
            None => fail!(Error::NoCandidate),
        }
    }

    fn pick_up(&mut self, erase_cache0: bool) -> Result<(), Error> {
        let dfu = self.layout().dfu_partition;
        let len = match self.processor.envelope_len(dfu) {
            Ok(len) => len,
            Err(e) => return fail!(e),
        };
        check!(len > 0 && len <= dfu.len, Error::BadEnvelope);
        self.cache().set_envelope(dfu, len, erase_cache0)?;

        let envelope = Region::new(dfu.ptr.address, len);
        info!("candidate envelope at {:?}", envelope);
        self.envelope = Some(envelope);
        Ok(())
    }

    /// Checks the first bytes of the DFU partition; an envelope never
    /// starts with an erased byte.
    fn dfu_is_blank(&self) -> Result<bool, Error> {
        let dfu = self.layout().dfu_partition;
        if dfu.len == 0 {
            return Ok(true);
        }
        let mram = self.platform.selector().mram();
        let head = mram
            .try_borrow()
            .map_err(|_| hardware::Error::Locked)
            .and_then(|mram| {
                let caps = mram.capabilities()?;
                let offset = caps
                    .offset_of(dfu.ptr.address)
                    .ok_or(hardware::Error::OutOfRange)?;
                let mut head = [0; 1];
                mram.read(offset, &mut head)?;
                Ok(head[0])
            });
        match head {
            Ok(byte) => Ok(byte == ERASED),
            Err(e) => fail!(Error::Io(e)),
        }
    }

    fn erase_dfu(&self) -> Result<(), Error> {
        let dfu = self.layout().dfu_partition;
        if dfu.len == 0 {
            return Ok(());
        }
        let mram = self.platform.selector().mram();
        let erased = mram
            .try_borrow_mut()
            .map_err(|_| hardware::Error::Locked)
            .and_then(|mut mram| {
                let local = mram
                    .capabilities()?
                    .local(dfu)
                    .ok_or(hardware::Error::OutOfRange)?;
                mram.erase_if_dirty(local)
            });
        match erased {
            Ok(true) => {
                info!("erased DFU partition {:?}", dfu);
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => fail!(Error::Io(e), "erasing the DFU partition failed"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn request_regions() {
        let mut request = UpdateRequest::default();
        assert_eq!(request.envelope(), None);
        for i in 0..MAX_UPDATE_REGIONS as u32 {
            assert!(request.push(Region::new(0x1000 * i, 0x100)));
        }
        assert!(!request.push(Region::new(0xf000, 0x100)));
        assert_eq!(request.regions().len(), MAX_UPDATE_REGIONS);
        assert_eq!(request.envelope(), Some(Region::new(0, 0x100)));

        // A request read from raw bytes may claim more regions than it has.
        let mut raw = UpdateRequest::default();
        raw.as_bytes_mut()[..4].copy_from_slice(&u32::MAX.to_ne_bytes());
        assert_eq!(raw.regions().len(), MAX_UPDATE_REGIONS);
    }
}
