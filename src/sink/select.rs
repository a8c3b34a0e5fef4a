// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Sink selection.
//!
//! The [`Selector`] maps a decoded [`ComponentId`] onto the sink backend
//! that handles it:
//! - `MEM` components go to whichever memory claims their start address,
//!   probing MRAM first, then RAM, then external memory (if present);
//! - `SPECIAL` components 1 and 2 go to the secure domain firmware and
//!   recovery firmware images in MRAM;
//! - `CAND_IMG` and `CAND_MFST` components go to their RAM staging areas;
//! - `CACHE_POOL` components open a new slot in the given cache partition.
//!
//! Anything else is [`Error::UnsupportedComponent`]; there is no fallback.

use core::cell::RefCell;

use crate::cache::Cache;
use crate::component::ComponentId;
use crate::config::Layout;
use crate::hardware::flash::Capabilities;
use crate::hardware::flash::Flash;
use crate::hardware::flash::Region;
use crate::hardware::ram::Ram;
use crate::sink::CacheSink;
use crate::sink::Contexts;
use crate::sink::Error;
use crate::sink::FlashSink;
use crate::sink::RamSink;
use crate::sink::Sink;
use crate::Result;

/// The special component number of the secure domain firmware.
pub const SPECIAL_SDFW: u32 = 1;

/// The special component number of the secure domain recovery firmware.
pub const SPECIAL_SDFW_RECOVERY: u32 = 2;

/// The memories and pools a [`Selector`] draws on.
pub struct Backends<'a> {
    /// On-chip MRAM.
    pub mram: &'a RefCell<dyn Flash + 'a>,
    /// Working RAM.
    pub ram: &'a RefCell<dyn Ram + 'a>,
    /// Memory behind another processor, if this platform has any.
    pub extmem: Option<&'a RefCell<dyn Flash + 'a>>,
    /// The DFU cache.
    pub cache: &'a Cache<'a>,
    /// The context pools.
    pub contexts: &'a Contexts,
}

/// Picks sinks for components.
pub struct Selector<'a> {
    layout: &'a Layout,
    backends: Backends<'a>,
}

impl<'a> Selector<'a> {
    /// Creates a new `Selector`.
    pub fn new(layout: &'a Layout, backends: Backends<'a>) -> Self {
        Self { layout, backends }
    }

    /// Returns the layout this selector routes by.
    pub fn layout(&self) -> &'a Layout {
        self.layout
    }

    /// Returns the DFU cache sinks write into.
    pub fn cache(&self) -> &'a Cache<'a> {
        self.backends.cache
    }

    /// Returns the MRAM device.
    pub fn mram(&self) -> &'a RefCell<dyn Flash + 'a> {
        self.backends.mram
    }

    /// Returns the context pools sinks are drawn from.
    pub fn contexts(&self) -> &'a Contexts {
        self.backends.contexts
    }

    /// Returns a sink for `id`.
    ///
    /// `uri` names the payload for `CACHE_POOL` components, and is ignored
    /// otherwise.
    pub fn select(
        &self,
        id: &ComponentId,
        uri: Option<&[u8]>,
    ) -> Result<Sink<'a>, Error> {
        let b = &self.backends;
        let sink = match *id {
            ComponentId::Mem { address, size, .. } => {
                check!(size > 0, Error::OutOfBounds);
                return self.select_mem(Region::new(address, size));
            }
            ComponentId::Special(n) => {
                let region = match n {
                    SPECIAL_SDFW => self.layout.sdfw,
                    SPECIAL_SDFW_RECOVERY => self.layout.sdfw_recovery,
                    _ => return fail!(Error::UnsupportedComponent),
                };
                Sink::Flash(FlashSink::new(b.mram, b.contexts.flash(), region)?)
            }
            ComponentId::CandidateImage(n) => {
                let region = self.staging(&self.layout.candidate_images, n)?;
                Sink::Ram(RamSink::new(b.ram, b.contexts.ram(), region)?)
            }
            ComponentId::CandidateManifest(n) => {
                let region = self.staging(&self.layout.candidate_manifests, n)?;
                Sink::Ram(RamSink::new(b.ram, b.contexts.ram(), region)?)
            }
            ComponentId::CachePool(n) => {
                let uri = match uri {
                    Some(uri) => uri,
                    None => {
                        return fail!(
                            Error::UnsupportedComponent,
                            "cache pool {} selected without a URI",
                            n
                        )
                    }
                };
                Sink::Cache(CacheSink::new(b.cache, b.contexts.cache(), n, uri)?)
            }
            ComponentId::InstalledManifest(_) => {
                return fail!(Error::UnsupportedComponent)
            }
        };
        trace!("selected a {} sink", id.type_name());
        Ok(sink)
    }

    /// Returns the payload cached under `uri`.
    pub fn cached(&self, uri: &[u8]) -> Result<Region, Error> {
        Ok(self.backends.cache.get(uri)?)
    }

    fn select_mem(&self, region: Region) -> Result<Sink<'a>, Error> {
        let b = &self.backends;
        let start = Region::new(region.ptr.address, 1);

        if let Some(caps) = claims(b.mram, start) {
            trace!("{:?} is in MRAM", region);
            return Ok(Sink::Flash(FlashSink::with_capabilities(
                b.mram,
                b.contexts.flash(),
                region,
                caps,
            )?));
        }

        let in_ram = b
            .ram
            .try_borrow()
            .map(|ram| ram.span().contains(start))
            .unwrap_or(false);
        if in_ram {
            trace!("{:?} is in RAM", region);
            return Ok(Sink::Ram(RamSink::new(b.ram, b.contexts.ram(), region)?));
        }

        if let Some(extmem) = b.extmem {
            if let Some(caps) = claims(extmem, start) {
                trace!("{:?} is in external memory", region);
                return Ok(Sink::ExtMem(FlashSink::with_capabilities(
                    extmem,
                    b.contexts.extmem(),
                    region,
                    caps,
                )?));
            }
        }

        fail!(
            Error::UnsupportedComponent,
            "no memory claims {:?}",
            region
        )
    }

    fn staging(&self, areas: &[Region], n: u32) -> Result<Region, Error> {
        match areas.get(n as usize) {
            Some(&region) if region.len > 0 => Ok(region),
            _ => fail!(Error::UnsupportedComponent, "no staging area {}", n),
        }
    }
}

/// Returns `flash`'s geometry if it contains `start`.
fn claims(flash: &RefCell<dyn Flash + '_>, start: Region) -> Option<Capabilities> {
    flash
        .try_borrow()
        .ok()
        .and_then(|f| f.capabilities().ok())
        .filter(|caps| caps.contains(start))
}
