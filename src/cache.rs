// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! The DFU cache.
//!
//! Payloads fetched while preprocessing a candidate are staged in *cache
//! partitions*, keyed by the URI they were fetched from, so that the secure
//! domain can find them again when it installs the update.
//!
//! # Partition format
//!
//! Each partition holds a single CBOR map of indefinite length, whose
//! entries map a text-string URI to a byte-string payload:
//! ```text
//! bf                      map start, only at the start of the partition
//!   7x <uri>              text string key
//!   5a <len:u32be> <data> byte string value
//!   ...
//! ff                      map end
//! ```
//! `0xff` is also the erased value, so an erased partition reads as "empty"
//! and a partition whose last slot was cleanly closed always ends in a
//! terminator.
//!
//! A slot is written with its length set to `ff ff ff ff`; only [`commit()`]
//! fills in the real value. A slot that still carries the placeholder length
//! is the remains of an interrupted write, and is erased by the next
//! allocation in that partition.
//!
//! Committed slots are padded out to the next erase block with an entry
//! keyed by the empty string, so that every slot starts on an erase block
//! boundary (except for one that directly follows the map start) and can be
//! erased without disturbing its predecessors.
//!
//! # Partition zero
//!
//! Partition zero is not configured directly: it is whatever part of the DFU
//! partition the stored envelope does not use, starting at the first erase
//! block boundary after it. See [`Cache::set_envelope()`].
//!
//! [`commit()`]: Cache::commit

use core::cell::RefCell;

use arrayvec::ArrayVec;

use byteorder::BigEndian;
use byteorder::ByteOrder as _;

use crate::config::Layout;
use crate::config::MAX_CACHE_PARTITIONS;
use crate::hardware;
use crate::hardware::flash::Flash;
use crate::hardware::flash::FlashExt as _;
use crate::hardware::flash::Region;
use crate::hardware::flash::ERASED;
use crate::mem::round_up;
use crate::status::Classify;
use crate::status::ErrorKind;

/// The number of partitions a [`Cache`] tracks, including partition zero.
pub const PARTITIONS: usize = MAX_CACHE_PARTITIONS + 1;

const MAP_START: u8 = 0xbf;
const MAP_END: u8 = 0xff;
const TSTR: u8 = 0x60;
const BSTR: u8 = 0x40;
const UNCOMMITTED: u32 = u32::MAX;

/// Partitions too small to hold a map start, a minimal entry and a map end
/// are not used.
const MIN_PARTITION_LEN: u32 = 8;

/// A DFU cache error.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The URI was empty or longer than the configured maximum.
    BadUri,
    /// A slot with this URI already exists.
    Exists,
    /// No such partition, or no slot with the requested URI.
    NotFound,
    /// The partition (or slot) does not have enough space left.
    NoSpace,
    /// The partition does not hold a well-formed cache.
    Corrupted,
    /// The slot has already been committed or dropped.
    NotWriteEnabled,
    /// The cache was already initialized.
    AlreadyInitialized,
    /// The underlying memory failed.
    Io(hardware::Error),
}

impl From<hardware::Error> for Error {
    fn from(e: hardware::Error) -> Self {
        Self::Io(e)
    }
}

impl Classify for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::BadUri => ErrorKind::Decoding,
            Self::Exists => ErrorKind::Condition,
            Self::NotFound => ErrorKind::Unsupported,
            Self::NoSpace => ErrorKind::Resources,
            Self::Corrupted | Self::Io(_) => ErrorKind::Io,
            Self::NotWriteEnabled | Self::AlreadyInitialized => ErrorKind::State,
        }
    }
}

/// A cache slot opened for writing.
///
/// A `Slot` is plain bookkeeping: dropping it does nothing to the
/// underlying partition. Use [`Cache::commit()`] or [`Cache::drop_slot()`]
/// to close it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Slot {
    partition: Region,
    start: u32,
    len_at: u32,
    data: u32,
    size: u32,
    used: u32,
    write_enabled: bool,
}

impl Slot {
    /// Returns the number of payload bytes this slot can hold.
    pub fn capacity(&self) -> u32 {
        self.size
    }

    /// Returns the number of payload bytes written so far, counting up to
    /// the furthest byte written.
    pub fn used(&self) -> u32 {
        self.used
    }

    /// Returns whether this slot still accepts writes.
    pub fn is_write_enabled(&self) -> bool {
        self.write_enabled
    }
}

/// The end of every partition's contents at some point in time.
///
/// See [`Cache::mark()`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Mark {
    ends: ArrayVec<(Region, u32), PARTITIONS>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Partition {
    id: u32,
    region: Region,
}

#[derive(Default)]
struct State {
    initialized: bool,
    partitions: ArrayVec<Partition, PARTITIONS>,
}

/// What a walk over a partition found.
#[derive(Debug)]
struct Scan {
    /// Where the next slot would go.
    free: u32,
    /// The number of committed, non-padding entries.
    committed: u32,
    /// The payload of the entry keyed by the URI being looked for.
    found: Option<Region>,
    /// The start of an uncommitted slot, if the walk ran into one.
    stale: Option<u32>,
}

/// The DFU cache, spread over one or more partitions of a [`Flash`] device.
///
/// All partitions must live on the same device, addressed absolutely. The
/// cache is not thread-safe: it tracks its partitions in a `RefCell`, so
/// that sinks holding a shared reference to it can allocate and close slots.
pub struct Cache<'a> {
    flash: &'a RefCell<dyn Flash + 'a>,
    max_uri_len: usize,
    state: RefCell<State>,
}

impl<'a> Cache<'a> {
    /// Creates a new, uninitialized cache over `flash`.
    pub fn new(flash: &'a RefCell<dyn Flash + 'a>, max_uri_len: usize) -> Self {
        Self {
            flash,
            max_uri_len: max_uri_len.min(u16::MAX as usize),
            state: RefCell::new(State::default()),
        }
    }

    /// Picks up the dedicated partitions described by `layout`.
    ///
    /// A partition that does not hold a well-formed cache is erased; with
    /// `erase`, every non-empty partition is. Partitions which cannot be
    /// prepared are still registered, so that the failure surfaces when a
    /// slot is allocated in them.
    pub fn initialize(
        &self,
        layout: &Layout,
        erase: bool,
    ) -> Result<(), crate::Error<Error>> {
        check!(!self.state.borrow().initialized, Error::AlreadyInitialized);

        let mut partitions = ArrayVec::<Partition, PARTITIONS>::new();
        for p in &layout.cache_partitions {
            if p.id == 0 {
                warn!("cache partition 0 is reserved; ignoring {:?}", p.region);
                continue;
            }
            info!("cache partition {}: {:?}", p.id, p.region);
            if let Err(e) = self.prepare(p.region, erase) {
                warn!("cache partition {} initialization failed: {:?}", p.id, e);
            }
            let _ = partitions.try_push(Partition {
                id: p.id,
                region: p.region,
            });
        }

        let mut state = self.state.borrow_mut();
        if let Some(zero) = state.partitions.iter().find(|p| p.id == 0) {
            let _ = partitions.try_insert(0, *zero);
        }
        state.partitions = partitions;
        state.initialized = true;
        Ok(())
    }

    /// Places partition zero behind an envelope of `envelope_len` bytes
    /// stored at the start of `dfu`.
    ///
    /// If the envelope leaves no room, partition zero is simply absent.
    pub fn set_envelope(
        &self,
        dfu: Region,
        envelope_len: u32,
        erase: bool,
    ) -> Result<(), crate::Error<Error>> {
        check!(envelope_len <= dfu.len, Error::NoSpace);
        self.state.borrow_mut().partitions.retain(|p| p.id != 0);

        let region = match self.partition_zero(dfu, envelope_len) {
            Ok(Some(region)) => region,
            Ok(None) => {
                warn!("no room for cache partition 0 behind the envelope");
                return Ok(());
            }
            Err(e) => return fail!(e),
        };

        if let Err(e) = self.prepare(region, erase) {
            return fail!(e, "cache partition 0 initialization failed: {:?}", e);
        }
        info!("cache partition 0: {:?}", region);
        let mut state = self.state.borrow_mut();
        match state.partitions.try_insert(0, Partition { id: 0, region }) {
            Ok(()) => Ok(()),
            Err(_) => fail!(Error::NoSpace),
        }
    }

    /// Erases every non-empty partition and forgets about all of them.
    ///
    /// Afterwards, the cache may be initialized again.
    pub fn deinitialize(&self) -> Result<(), crate::Error<Error>> {
        let partitions = {
            let mut state = self.state.borrow_mut();
            state.initialized = false;
            core::mem::take(&mut state.partitions)
        };

        let mut result = Ok(());
        for p in &partitions {
            let erased = self.is_erased(p.region).and_then(|erased| {
                if !erased {
                    self.erase(p.region)?;
                }
                Ok(())
            });
            if let Err(e) = erased {
                result = fail!(e, "erasing cache partition {} failed", p.id);
            }
        }
        result
    }

    /// Returns whether [`Cache::initialize()`] has been called.
    pub fn is_initialized(&self) -> bool {
        self.state.borrow().initialized
    }

    /// Returns the region of partition `id`.
    pub fn partition(&self, id: u32) -> Option<Region> {
        self.state
            .borrow()
            .partitions
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.region)
    }

    /// Returns every partition holding at least one committed slot.
    pub fn populated(&self) -> ArrayVec<Region, PARTITIONS> {
        let partitions = self.state.borrow().partitions.clone();
        partitions
            .iter()
            .filter(|p| match self.scan(p.region, None) {
                Ok(scan) => scan.committed > 0,
                Err(e) => {
                    warn!("skipping cache partition {}: {:?}", p.id, e);
                    false
                }
            })
            .map(|p| p.region)
            .collect()
    }

    /// Records where each partition's free space currently begins.
    ///
    /// Partitions that cannot be walked are left out.
    pub fn mark(&self) -> Mark {
        let partitions = self.state.borrow().partitions.clone();
        let mut mark = Mark::default();
        for p in &partitions {
            match self.scan(p.region, None) {
                Ok(scan) => {
                    let _ = mark.ends.try_push((p.region, scan.free));
                }
                Err(e) => {
                    warn!("not marking cache partition {}: {:?}", p.id, e);
                }
            }
        }
        mark
    }

    /// Discards every slot allocated after `mark` was taken, committed or
    /// not.
    pub fn rollback(&self, mark: &Mark) -> Result<(), crate::Error<Error>> {
        for &(region, free) in &mark.ends {
            let untouched = match self.scan(region, None) {
                Ok(scan) => scan.free == free && scan.stale.is_none(),
                Err(_) => false,
            };
            if untouched {
                continue;
            }

            info!("rolling cache partition back to {:#x}", free);
            let wiped = if free == region.ptr.address {
                self.erase(region)
            } else {
                self.wipe(region, free)
            };
            if let Err(e) = wiped {
                return fail!(e, "rolling back {:?} failed: {:?}", region, e);
            }
        }
        Ok(())
    }

    /// Finds the payload cached under `uri`.
    pub fn get(&self, uri: &[u8]) -> Result<Region, crate::Error<Error>> {
        match self.lookup(strip_nul(uri)) {
            Ok(Some(region)) => Ok(region),
            Ok(None) => fail!(Error::NotFound),
            Err(e) => fail!(e),
        }
    }

    /// Allocates a new slot keyed by `uri` at the end of partition `id`.
    ///
    /// A trailing NUL on `uri` is ignored.
    pub fn create_slot(
        &self,
        id: u32,
        uri: &[u8],
    ) -> Result<Slot, crate::Error<Error>> {
        self.create(id, strip_nul(uri))
            .or_else(|e| fail!(e, "allocating cache slot failed: {:?}", e))
    }

    /// Writes `data` at `offset` into the payload of `slot`.
    ///
    /// Writes which do not fit into the slot fail with [`Error::NoSpace`]
    /// and are not applied.
    pub fn write(
        &self,
        slot: &mut Slot,
        offset: u32,
        data: &[u8],
    ) -> Result<(), crate::Error<Error>> {
        check!(slot.write_enabled, Error::NotWriteEnabled);
        let end = match offset.checked_add(data.len() as u32) {
            Some(end) if end <= slot.size => end,
            _ => return fail!(Error::NoSpace),
        };
        self.program(slot.data + offset, data).or_else(|e| fail!(e))?;
        slot.used = slot.used.max(end);
        Ok(())
    }

    /// Durably records the length of `slot`, making its payload visible to
    /// [`Cache::get()`].
    pub fn commit(&self, slot: &mut Slot) -> Result<(), crate::Error<Error>> {
        check!(slot.write_enabled, Error::NotWriteEnabled);
        self.close(slot).or_else(|e| fail!(e))?;
        slot.write_enabled = false;
        info!("committed cache slot of {} bytes at {:#x}", slot.used, slot.data);
        Ok(())
    }

    /// Discards `slot`, freeing everything from its start to the end of its
    /// partition.
    pub fn drop_slot(&self, slot: &mut Slot) -> Result<(), crate::Error<Error>> {
        check!(slot.write_enabled, Error::NotWriteEnabled);
        slot.write_enabled = false;
        info!("dropping cache slot at {:#x}", slot.start);
        self.wipe(slot.partition, slot.start).or_else(|e| fail!(e))
    }

    fn partition_zero(
        &self,
        dfu: Region,
        envelope_len: u32,
    ) -> Result<Option<Region>, Error> {
        let eb = self.erase_block()?;
        let dfu_end = dfu.end().ok_or(Error::NoSpace)?;
        let start = dfu
            .ptr
            .address
            .checked_add(envelope_len)
            .and_then(|end| round_up(end, eb))
            .ok_or(Error::NoSpace)?;
        if start >= dfu_end {
            return Ok(None);
        }
        Ok(Some(Region::new(start, dfu_end - start)))
    }

    fn prepare(&self, region: Region, erase: bool) -> Result<(), Error> {
        if region.len < MIN_PARTITION_LEN {
            return Err(Error::NoSpace);
        }
        if self.is_erased(region)? {
            return Ok(());
        }
        if erase || self.scan(region, None).is_err() {
            info!("erasing cache partition at {:?}", region);
            self.erase(region)?;
        }
        Ok(())
    }

    fn lookup(&self, uri: &[u8]) -> Result<Option<Region>, Error> {
        let partitions = self.state.borrow().partitions.clone();
        for p in &partitions {
            match self.scan(p.region, Some(uri)) {
                Ok(Scan {
                    found: Some(region),
                    ..
                }) => return Ok(Some(region)),
                Ok(_) => {}
                Err(Error::Corrupted) => {
                    warn!("cache partition {} is corrupted", p.id);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    fn create(&self, id: u32, uri: &[u8]) -> Result<Slot, Error> {
        if uri.is_empty() || uri.len() > self.max_uri_len {
            return Err(Error::BadUri);
        }
        let partition = self.partition(id).ok_or(Error::NotFound)?;
        if self.lookup(uri)?.is_some() {
            return Err(Error::Exists);
        }

        let mut scan = self.scan(partition, None)?;
        if let Some(stale) = scan.stale {
            warn!("dropping interrupted cache slot at {:#x}", stale);
            self.wipe(partition, stale)?;
            scan = self.scan(partition, None)?;
        }

        let mut head = ArrayVec::<u8, 4>::new();
        if scan.free == partition.ptr.address {
            head.push(MAP_START);
        }
        let uri_len = uri.len() as u32;
        match uri_len {
            0..=23 => head.push(TSTR | uri_len as u8),
            24..=0xff => {
                head.push(TSTR | 24);
                head.push(uri_len as u8);
            }
            _ => {
                head.push(TSTR | 25);
                let mut len = [0; 2];
                BigEndian::write_u16(&mut len, uri_len as u16);
                let _ = head.try_extend_from_slice(&len);
            }
        }

        let end = partition.end().ok_or(Error::Corrupted)?;
        let len_at = scan.free + head.len() as u32 + uri_len + 1;
        let data = len_at.checked_add(4).ok_or(Error::NoSpace)?;
        if data >= end {
            return Err(Error::NoSpace);
        }

        self.program(scan.free, &head)?;
        self.program(scan.free + head.len() as u32, uri)?;
        self.program(len_at - 1, &[BSTR | 26, 0xff, 0xff, 0xff, 0xff])?;

        trace!("allocated cache slot at {:#x}, data at {:#x}", scan.free, data);
        Ok(Slot {
            partition,
            start: scan.free,
            len_at,
            data,
            // Leave room for the map end.
            size: end - data - 1,
            used: 0,
            write_enabled: true,
        })
    }

    fn close(&self, slot: &Slot) -> Result<(), Error> {
        let eb = self.erase_block()?;
        let end = slot.data + slot.used;
        let mut gap = round_up(end, eb).ok_or(Error::NoSpace)? - end;
        // The smallest padding entry is two bytes long.
        if gap == 1 {
            gap += eb;
        }
        let partition_end = slot.partition.end().ok_or(Error::Corrupted)?;
        match end.checked_add(gap) {
            Some(next) if next < partition_end => {}
            _ => return Err(Error::NoSpace),
        }

        // Padding goes in before the length, so that an interrupted commit
        // still reads as an uncommitted slot.
        if gap > 0 {
            self.pad(end, gap)?;
        }
        let mut len = [0; 4];
        BigEndian::write_u32(&mut len, slot.used);
        self.program(slot.len_at, &len)?;
        self.program(end + gap, &[MAP_END])
    }

    fn pad(&self, at: u32, gap: u32) -> Result<(), Error> {
        let mut head = ArrayVec::<u8, 4>::new();
        head.push(TSTR);
        if gap <= 23 {
            head.push(BSTR | (gap - 2) as u8);
        } else if gap - 4 <= u16::MAX as u32 {
            head.push(BSTR | 25);
            let mut len = [0; 2];
            BigEndian::write_u16(&mut len, (gap - 4) as u16);
            let _ = head.try_extend_from_slice(&len);
        } else {
            return Err(Error::NoSpace);
        }
        self.program(at, &head)?;

        let zeros = [0; 32];
        let mut cursor = at + head.len() as u32;
        let end = at + gap;
        while cursor < end {
            let len = (end - cursor).min(zeros.len() as u32);
            self.program(cursor, &zeros[..len as usize])?;
            cursor += len;
        }
        Ok(())
    }

    /// Erases `partition` from the erase block containing `from` onwards.
    fn wipe(&self, partition: Region, from: u32) -> Result<(), Error> {
        let eb = self.erase_block()?;
        let start = (from - from % eb).max(partition.ptr.address);
        let end = partition.end().ok_or(Error::Corrupted)?;
        self.erase(Region::new(start, end - start))?;
        if start == partition.ptr.address {
            self.program(start, &[MAP_START])?;
        }
        Ok(())
    }

    fn scan(&self, partition: Region, uri: Option<&[u8]>) -> Result<Scan, Error> {
        let end = partition.end().ok_or(Error::Corrupted)?;
        let mut at = partition.ptr.address;
        let mut scan = Scan {
            free: at,
            committed: 0,
            found: None,
            stale: None,
        };

        match self.byte(at)? {
            ERASED => return Ok(scan),
            MAP_START => at += 1,
            _ => return Err(Error::Corrupted),
        }

        loop {
            if at >= end {
                return Err(Error::Corrupted);
            }
            let entry = at;
            if self.byte(at)? == MAP_END {
                scan.free = at;
                return Ok(scan);
            }

            let (key_len, head_len) =
                self.string_head(at, TSTR, end)?.ok_or(Error::Corrupted)?;
            let key = Region::new(at + head_len, key_len);
            at = key.end().filter(|&e| e < end).ok_or(Error::Corrupted)?;

            let value = match self.string_head(at, BSTR, end)? {
                Some((len, head_len)) if len != UNCOMMITTED => {
                    Region::new(at + head_len, len)
                }
                _ => {
                    scan.stale = Some(entry);
                    scan.free = entry;
                    return Ok(scan);
                }
            };
            at = value.end().filter(|&e| e <= end).ok_or(Error::Corrupted)?;

            if key_len == 0 {
                continue;
            }
            scan.committed += 1;
            if let Some(uri) = uri {
                if scan.found.is_none() && self.matches(key, uri)? {
                    scan.found = Some(value);
                }
            }
        }
    }

    /// Decodes the head of a string of major type `major` at `at`, returning
    /// its length and the length of the head itself.
    ///
    /// Returns `None` if the head is still erased.
    fn string_head(
        &self,
        at: u32,
        major: u8,
        end: u32,
    ) -> Result<Option<(u32, u32)>, Error> {
        let head = self.byte(at)?;
        if head == ERASED {
            return Ok(None);
        }
        if head & 0xe0 != major {
            return Err(Error::Corrupted);
        }
        let arg_len = match head & 0x1f {
            0..=23 => 0,
            24 => 1,
            25 => 2,
            26 => 4,
            _ => return Err(Error::Corrupted),
        };
        if at + 1 + arg_len > end {
            return Err(Error::Corrupted);
        }

        let mut arg = [0; 4];
        let arg = &mut arg[..arg_len as usize];
        self.read(at + 1, arg)?;
        let len = match arg_len {
            0 => (head & 0x1f) as u32,
            1 => arg[0] as u32,
            2 => BigEndian::read_u16(arg) as u32,
            _ => BigEndian::read_u32(arg),
        };
        Ok(Some((len, 1 + arg_len)))
    }

    fn matches(&self, key: Region, uri: &[u8]) -> Result<bool, Error> {
        if key.len as usize != uri.len() {
            return Ok(false);
        }
        let mut chunk = [0; 32];
        for (i, expected) in uri.chunks(chunk.len()).enumerate() {
            let buf = &mut chunk[..expected.len()];
            self.read(key.ptr.address + (i * 32) as u32, buf)?;
            if buf != expected {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn byte(&self, at: u32) -> Result<u8, Error> {
        let mut b = [0];
        self.read(at, &mut b)?;
        Ok(b[0])
    }

    fn erase_block(&self) -> Result<u32, Error> {
        let flash = self.flash.try_borrow().map_err(|_| hardware::Error::Locked)?;
        Ok(flash.capabilities()?.erase_block)
    }

    fn read(&self, at: u32, out: &mut [u8]) -> Result<(), Error> {
        let flash = self.flash.try_borrow().map_err(|_| hardware::Error::Locked)?;
        let local = local(&*flash, Region::new(at, out.len() as u32))?;
        Ok(flash.read(local.ptr, out)?)
    }

    fn program(&self, at: u32, data: &[u8]) -> Result<(), Error> {
        let mut flash = self
            .flash
            .try_borrow_mut()
            .map_err(|_| hardware::Error::Locked)?;
        let local = local(&*flash, Region::new(at, data.len() as u32))?;
        Ok(flash.program(local.ptr, data)?)
    }

    fn erase(&self, region: Region) -> Result<(), Error> {
        let mut flash = self
            .flash
            .try_borrow_mut()
            .map_err(|_| hardware::Error::Locked)?;
        let local = local(&*flash, region)?;
        Ok(flash.erase(local)?)
    }

    fn is_erased(&self, region: Region) -> Result<bool, Error> {
        let flash = self.flash.try_borrow().map_err(|_| hardware::Error::Locked)?;
        let local = local(&*flash, region)?;
        Ok(flash.is_erased(local)?)
    }
}

fn local(flash: &dyn Flash, region: Region) -> Result<Region, Error> {
    flash
        .capabilities()?
        .local(region)
        .ok_or(Error::Io(hardware::Error::OutOfRange))
}

fn strip_nul(uri: &[u8]) -> &[u8] {
    match uri.split_last() {
        Some((0, rest)) => rest,
        _ => uri,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::config::CachePartition;
    use crate::hardware::flash::RamFlash;

    const BASE: u32 = 0x1000_0000;
    const EB: u32 = 0x100;
    const PART: u32 = BASE + 0x800;

    fn layout() -> Layout {
        let mut layout = Layout::default();
        layout.dfu_partition = Region::new(BASE, 0x800);
        layout.cache_partitions.push(CachePartition {
            id: 1,
            region: Region::new(PART, 0x800),
        });
        layout
    }

    fn mram() -> RefCell<RamFlash<Vec<u8>>> {
        RefCell::new(RamFlash::new(vec![0xff; 0x1000], BASE, EB))
    }

    #[test]
    fn commit_and_get() {
        let mram = mram();
        let cache = Cache::new(&mram, 64);
        cache.initialize(&layout(), false).unwrap();

        let mut slot = cache.create_slot(1, b"http://a/b\0").unwrap();
        assert_eq!(slot.capacity(), 0x800 - 17 - 1);
        cache.write(&mut slot, 0, b"hel").unwrap();
        cache.write(&mut slot, 3, b"lo").unwrap();
        assert_eq!(slot.used(), 5);
        cache.commit(&mut slot).unwrap();
        assert!(!slot.is_write_enabled());

        assert_eq!(
            cache.get(b"http://a/b").unwrap(),
            Region::new(PART + 17, 5)
        );
        {
            let mram = mram.borrow();
            let bytes = &mram.bytes()[0x800..];
            assert_eq!(&bytes[..2], &[0xbf, 0x6a]);
            assert_eq!(&bytes[12..17], &[0x5a, 0, 0, 0, 5]);
            assert_eq!(&bytes[17..22], b"hello");
            // Padding entry up to the next erase block.
            assert_eq!(&bytes[22..26], &[0x60, 0x59, 0, 230]);
            assert!(bytes[26..0x100].iter().all(|&b| b == 0));
            assert_eq!(bytes[0x100], 0xff);
        }

        // The next slot starts on the erase block boundary.
        let mut slot = cache.create_slot(1, b"u2").unwrap();
        cache.write(&mut slot, 0, &[1, 2, 3]).unwrap();
        cache.commit(&mut slot).unwrap();
        assert_eq!(
            cache.get(b"u2").unwrap(),
            Region::new(PART + 0x100 + 8, 3)
        );
        assert_eq!(cache.populated().as_slice(), &[Region::new(PART, 0x800)]);
    }

    #[test]
    fn drop_frees_slot() {
        let mram = mram();
        let cache = Cache::new(&mram, 64);
        cache.initialize(&layout(), false).unwrap();

        let mut slot = cache.create_slot(1, b"uri").unwrap();
        cache.write(&mut slot, 0, b"payload").unwrap();
        cache.drop_slot(&mut slot).unwrap();
        assert_eq!(
            cache.write(&mut slot, 0, b"x").unwrap_err().into_inner(),
            Error::NotWriteEnabled
        );
        assert_eq!(
            cache.get(b"uri").unwrap_err().into_inner(),
            Error::NotFound
        );
        assert!(cache.populated().is_empty());

        // The URI can be reused.
        let mut slot = cache.create_slot(1, b"uri").unwrap();
        cache.commit(&mut slot).unwrap();
        assert_eq!(cache.get(b"uri").unwrap().len, 0);
    }

    #[test]
    fn rejects_bad_slots() {
        let mram = mram();
        let cache = Cache::new(&mram, 8);
        cache.initialize(&layout(), false).unwrap();

        assert_eq!(
            cache.create_slot(1, b"much-too-long").unwrap_err().into_inner(),
            Error::BadUri
        );
        assert_eq!(
            cache.create_slot(1, b"\0").unwrap_err().into_inner(),
            Error::BadUri
        );
        assert_eq!(
            cache.create_slot(7, b"uri").unwrap_err().into_inner(),
            Error::NotFound
        );

        let mut slot = cache.create_slot(1, b"uri").unwrap();
        let too_much = vec![0; slot.capacity() as usize + 1];
        assert_eq!(
            cache.write(&mut slot, 0, &too_much).unwrap_err().into_inner(),
            Error::NoSpace
        );
        assert_eq!(slot.used(), 0);
        cache.commit(&mut slot).unwrap();
        assert_eq!(
            cache.create_slot(1, b"uri\0").unwrap_err().into_inner(),
            Error::Exists
        );
    }

    #[test]
    fn interrupted_slot_is_dropped() {
        let mram = mram();
        {
            let cache = Cache::new(&mram, 64);
            cache.initialize(&layout(), false).unwrap();
            let mut slot = cache.create_slot(1, b"http://a/b").unwrap();
            cache.write(&mut slot, 0, b"half a payl").unwrap();
            // Power is lost before the slot is closed.
        }

        let cache = Cache::new(&mram, 64);
        cache.initialize(&layout(), false).unwrap();
        assert_eq!(
            cache.get(b"http://a/b").unwrap_err().into_inner(),
            Error::NotFound
        );
        assert!(cache.populated().is_empty());

        let mut slot = cache.create_slot(1, b"again").unwrap();
        cache.commit(&mut slot).unwrap();
        assert_eq!(
            cache.get(b"again").unwrap(),
            Region::new(PART + 1 + 1 + 5 + 5, 0)
        );
    }

    #[test]
    fn rollback_discards_later_slots() {
        let mram = mram();
        let cache = Cache::new(&mram, 64);
        cache.initialize(&layout(), false).unwrap();

        let mut slot = cache.create_slot(1, b"kept").unwrap();
        cache.write(&mut slot, 0, b"old").unwrap();
        cache.commit(&mut slot).unwrap();
        let mark = cache.mark();
        let before = mram.borrow().bytes().to_vec();

        let mut slot = cache.create_slot(1, b"new").unwrap();
        cache.write(&mut slot, 0, b"fetched").unwrap();
        cache.commit(&mut slot).unwrap();
        let slot = cache.create_slot(1, b"open").unwrap();
        assert!(slot.is_write_enabled());

        cache.rollback(&mark).unwrap();
        assert_eq!(mram.borrow().bytes(), &before[..]);
        assert_eq!(cache.get(b"kept").unwrap().len, 3);
        assert_eq!(
            cache.get(b"new").unwrap_err().into_inner(),
            Error::NotFound
        );

        // The same URI may be fetched again.
        let mut slot = cache.create_slot(1, b"new").unwrap();
        cache.commit(&mut slot).unwrap();

        // Rolling back to an empty partition leaves it erased.
        let mram = self::mram();
        let cache = Cache::new(&mram, 64);
        cache.initialize(&layout(), false).unwrap();
        let mark = cache.mark();
        let mut slot = cache.create_slot(1, b"uri").unwrap();
        cache.commit(&mut slot).unwrap();
        cache.rollback(&mark).unwrap();
        assert!(mram.borrow().bytes()[0x800..].iter().all(|&b| b == 0xff));
        assert!(cache.populated().is_empty());
    }

    #[test]
    fn corrupted_partition_is_erased() {
        let mram = mram();
        mram.borrow_mut()
            .program(crate::hardware::flash::Ptr::new(0x800), &[0x12, 0x34])
            .unwrap();
        let cache = Cache::new(&mram, 64);
        cache.initialize(&layout(), false).unwrap();
        assert!(mram.borrow().bytes()[0x800..].iter().all(|&b| b == 0xff));
        assert_eq!(
            cache.initialize(&layout(), false).unwrap_err().into_inner(),
            Error::AlreadyInitialized
        );
    }

    #[test]
    fn partition_zero_follows_envelope() {
        let mram = mram();
        let cache = Cache::new(&mram, 64);
        cache.initialize(&layout(), false).unwrap();
        assert_eq!(cache.partition(0), None);

        cache
            .set_envelope(Region::new(BASE, 0x800), 0x234, true)
            .unwrap();
        assert_eq!(cache.partition(0), Some(Region::new(BASE + 0x300, 0x500)));

        let mut slot = cache.create_slot(0, b"fw").unwrap();
        cache.write(&mut slot, 0, &[0xaa; 16]).unwrap();
        cache.commit(&mut slot).unwrap();
        assert_eq!(cache.get(b"fw").unwrap().ptr.address, BASE + 0x300 + 9);

        // An envelope that fills the partition leaves no cache behind it.
        cache
            .set_envelope(Region::new(BASE, 0x800), 0x7ff, true)
            .unwrap();
        assert_eq!(cache.partition(0), None);

        cache.deinitialize().unwrap();
        assert!(!cache.is_initialized());
        assert!(mram.borrow().bytes()[0x800..].iter().all(|&b| b == 0xff));
    }
}
