// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Platform geometry and update policy knobs.
//!
//! A [`Layout`] describes where things live in the memory map; [`Options`]
//! selects between behaviors an integration may want to tune. Both are plain
//! data, filled in once by the integration and then shared by reference.
//!
//! All addresses in this module are absolute.

use arrayvec::ArrayVec;

use enumflags2::bitflags;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::hardware::flash::Region;

/// The maximum number of dedicated cache partitions, not counting the one
/// carved out of the DFU partition.
pub const MAX_CACHE_PARTITIONS: usize = 4;

/// The maximum number of RAM staging areas for candidate images (and,
/// separately, for candidate manifests).
pub const MAX_STAGING_AREAS: usize = 4;

/// The maximum number of ownership records in a [`Layout`].
pub const MAX_OWNED_REGIONS: usize = 8;

/// The processor domains memory can be assigned to.
///
/// Sets of domains are expressed as `BitFlags<Domain>`.
#[bitflags]
#[repr(u8)]
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Domain {
    /// The secure domain, which performs the actual installation.
    Secure = 0b001,
    /// The application core.
    Application = 0b010,
    /// The radio core.
    Radio = 0b100,
}

/// A dedicated DFU cache partition.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CachePartition {
    /// The partition number, as used in `CACHE_POOL` component IDs.
    ///
    /// Zero is reserved for the partition that follows the envelope in the
    /// DFU partition.
    pub id: u32,
    /// Where the partition lives.
    pub region: Region,
}

/// Where the update core's memory lives.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Layout {
    /// The partition update candidates are written to.
    ///
    /// The envelope sits at the start; whatever is left after it (aligned up
    /// to the erase block) becomes cache partition zero.
    pub dfu_partition: Region,
    /// Dedicated cache partitions, numbered from one.
    pub cache_partitions: ArrayVec<CachePartition, MAX_CACHE_PARTITIONS>,
    /// The secure domain firmware image (special component 1).
    pub sdfw: Region,
    /// The secure domain recovery firmware image (special component 2).
    pub sdfw_recovery: Region,
    /// RAM areas `CAND_IMG` components are staged in, by index.
    pub candidate_images: ArrayVec<Region, MAX_STAGING_AREAS>,
    /// RAM areas `CAND_MFST` components are staged in, by index.
    pub candidate_manifests: ArrayVec<Region, MAX_STAGING_AREAS>,
    /// Which domain owns which memory.
    pub owners: ArrayVec<(Region, Domain), MAX_OWNED_REGIONS>,
}

impl Layout {
    /// Returns the dedicated cache partition numbered `id`.
    pub fn cache_partition(&self, id: u32) -> Option<Region> {
        self.cache_partitions
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.region)
    }

    /// Returns the domain that owns all of `region`, if any single one does.
    pub fn owner_of(&self, region: Region) -> Option<Domain> {
        self.owners
            .iter()
            .find(|(owned, _)| owned.contains(region))
            .map(|&(_, domain)| domain)
    }
}

/// Behavioral options for the [`Orchestrator`] and DFU cache.
///
/// [`Orchestrator`]: crate::orchestrator::Orchestrator
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Options {
    /// Wipe the DFU partition and caches on initialization, instead of
    /// picking up a previously stored candidate.
    pub cleanup_on_init: bool,
    /// Erase dedicated cache partitions on initialization, even if they
    /// hold a well-formed cache.
    pub cache_erase_on_init: bool,
    /// Erase cache partition zero whenever a new envelope is stored.
    pub cache0_erase_on_envelope_stored: bool,
    /// The longest URI a cache slot may be keyed by, in bytes.
    pub max_uri_len: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            cleanup_on_init: false,
            cache_erase_on_init: false,
            cache0_erase_on_envelope_stored: true,
            max_uri_len: 128,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ownership() {
        let mut layout = Layout::default();
        layout
            .owners
            .push((Region::new(0x0e0a_0000, 0x1_0000), Domain::Application));
        layout
            .owners
            .push((Region::new(0x0e0b_0000, 0x1_0000), Domain::Radio));

        assert_eq!(
            layout.owner_of(Region::new(0x0e0a_1000, 0x100)),
            Some(Domain::Application)
        );
        assert_eq!(
            layout.owner_of(Region::new(0x0e0b_0000, 0x1_0000)),
            Some(Domain::Radio)
        );
        // Straddling two domains belongs to neither.
        assert_eq!(layout.owner_of(Region::new(0x0e0a_ff00, 0x200)), None);
    }

    #[test]
    #[cfg(feature = "serde")]
    fn options_from_json() {
        let options: Options = serde_json::from_str(
            r#"{
                "cleanup_on_init": true,
                "cache_erase_on_init": false,
                "cache0_erase_on_envelope_stored": true,
                "max_uri_len": 64
            }"#,
        )
        .unwrap();
        assert!(options.cleanup_on_init);
        assert_eq!(options.max_uri_len, 64);
    }
}
