// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! A virtual device, with every memory `suit_dfu` writes to backed by heap
//! buffers.

use std::cell::RefCell;

use suit_dfu::cache::Cache;
use suit_dfu::component::Uuid;
use suit_dfu::config;
use suit_dfu::config::CachePartition;
use suit_dfu::config::Domain;
use suit_dfu::config::Layout;
use suit_dfu::crypto::ring;
use suit_dfu::crypto::ring::sig::Keyring;
use suit_dfu::crypto::ring::sig::PublicKey;
use suit_dfu::crypto::sig;
use suit_dfu::hardware::extmem;
use suit_dfu::hardware::extmem::ExtMem;
use suit_dfu::hardware::flash::Flash as _;
use suit_dfu::hardware::flash::Ptr;
use suit_dfu::hardware::flash::RamFlash;
use suit_dfu::hardware::flash::Region;
use suit_dfu::hardware::ram::fake;
use suit_dfu::manifest::auth::Authenticator;
use suit_dfu::manifest::class::DowngradePolicy;
use suit_dfu::manifest::class::IndependentUpdatePolicy;
use suit_dfu::manifest::class::Role;
use suit_dfu::manifest::class::SignatureVerificationPolicy;
use suit_dfu::manifest::mci::Lifecycle;
use suit_dfu::manifest::mci::Mci;
use suit_dfu::manifest::mpi::ManifestClass;
use suit_dfu::manifest::mpi::Provisioning;
use suit_dfu::orchestrator::InstallTrigger;
use suit_dfu::orchestrator::Orchestrator;
use suit_dfu::orchestrator::Processor;
use suit_dfu::platform::Platform;
use suit_dfu::sink::select::Backends;
use suit_dfu::sink::Contexts;
use suit_dfu::sink::Selector;

/// Where MRAM is mapped.
pub const MRAM: u32 = 0x0e00_0000;
/// The size of MRAM.
pub const MRAM_LEN: u32 = 0x2_0000;
/// The MRAM erase block.
pub const ERASE_BLOCK: u32 = 0x400;

/// Where RAM is mapped.
pub const RAM: u32 = 0x2000_0000;
/// The size of RAM.
pub const RAM_LEN: u32 = 0x1_0000;

/// Where the radio core's memory is mapped.
pub const EXT: u32 = 0x6000_0000;
/// The size of the radio core's memory.
pub const EXT_LEN: u32 = 0x1_0000;

/// The DFU partition.
pub const DFU: Region = Region::new(MRAM + 0x1_0000, 0x8000);
/// The application image slot in MRAM.
pub const APP_IMAGE: Region = Region::new(MRAM + 0x8000, 0x8000);

/// Returns the class UUID used for `role` on the virtual device.
pub fn class_id(role: Role) -> Uuid {
    use suit_dfu::wire::WireEnum as _;
    let mut id = [0xc1; 16];
    id[15] = role.to_wire_value();
    Uuid(id)
}

/// Returns a class entry for `role` with the strictest policies.
pub fn class(role: Role) -> ManifestClass {
    ManifestClass {
        vendor_id: Uuid([0x7e; 16]),
        class_id: class_id(role),
        role,
        signature_verification: SignatureVerificationPolicy::EnabledOnUpdateAndBoot,
        downgrade_prevention: DowngradePolicy::Enabled,
        independent_update: IndependentUpdatePolicy::Allowed,
    }
}

/// Returns the layout of the virtual device.
pub fn layout() -> Layout {
    let mut layout = Layout::default();
    layout.dfu_partition = DFU;
    layout.cache_partitions.push(CachePartition {
        id: 1,
        region: Region::new(MRAM + 0x1_8000, 0x4000),
    });
    layout.cache_partitions.push(CachePartition {
        id: 2,
        region: Region::new(MRAM + 0x1_c000, 0x4000),
    });
    layout.sdfw = Region::new(MRAM, 0x4000);
    layout.sdfw_recovery = Region::new(MRAM + 0x4000, 0x4000);
    layout.candidate_images.push(Region::new(RAM + 0x8000, 0x2000));
    layout.candidate_manifests.push(Region::new(RAM + 0xa000, 0x1000));
    layout.owners.push((APP_IMAGE, Domain::Application));
    layout.owners.push((Region::new(RAM, 0x8000), Domain::Application));
    layout.owners.push((Region::new(EXT, EXT_LEN), Domain::Radio));
    layout
}

/// Options for a [`Virtual`] device.
pub struct Options {
    /// The memory layout.
    pub layout: Layout,
    /// Orchestrator and cache options.
    pub config: config::Options,
    /// The provisioned manifest classes.
    pub mpi: Provisioning,
    /// The lifecycle state of each domain.
    pub lifecycle: Lifecycle,
    /// Keys compiled into the firmware.
    pub builtin_keys: Vec<(u32, PublicKey)>,
    /// Keys held by the platform key store.
    pub keys: Vec<(u32, PublicKey)>,
}

impl Default for Options {
    fn default() -> Self {
        let mut mpi = Provisioning::new();
        for &role in &[
            Role::SecTop,
            Role::AppRoot,
            Role::AppLocal1,
            Role::RadLocal1,
        ] {
            mpi.insert(class(role)).unwrap();
        }
        Self {
            layout: layout(),
            config: config::Options::default(),
            mpi,
            lifecycle: Lifecycle::default(),
            builtin_keys: Vec::new(),
            keys: Vec::new(),
        }
    }
}

/// A virtual device.
///
/// Memory contents outlive [`Virtual::boot()`], the way they would outlive
/// a reboot.
pub struct Virtual {
    opts: Options,
    /// The device's MRAM.
    pub mram: RefCell<RamFlash<Vec<u8>>>,
    /// The device's RAM.
    pub ram: RefCell<fake::Ram>,
    /// The radio core's memory.
    pub extmem: RefCell<ExtMem<extmem::fake::Transport>>,
}

impl Virtual {
    /// Creates a new device with blank memories.
    pub fn new(opts: Options) -> Self {
        Self {
            opts,
            mram: RefCell::new(RamFlash::new(
                vec![0xff; MRAM_LEN as usize],
                MRAM,
                ERASE_BLOCK,
            )),
            ram: RefCell::new(fake::Ram::new(RAM, RAM_LEN, Some(32))),
            extmem: RefCell::new(ExtMem::new(extmem::fake::Transport::new(
                EXT,
                EXT_LEN,
                ERASE_BLOCK,
            ))),
        }
    }

    /// Returns this device's options.
    pub fn opts(&self) -> &Options {
        &self.opts
    }

    /// Writes `bytes` to MRAM at the absolute address `address`.
    pub fn write_mram(&self, address: u32, bytes: &[u8]) {
        self.mram
            .borrow_mut()
            .program(Ptr::new(address - MRAM), bytes)
            .unwrap();
    }

    /// Reads `region` of MRAM.
    pub fn read_mram(&self, region: Region) -> Vec<u8> {
        let start = (region.ptr.address - MRAM) as usize;
        self.mram.borrow().bytes()[start..start + region.len as usize].to_vec()
    }

    /// Stores an envelope in the DFU partition, the way the transport that
    /// receives it would.
    pub fn store_envelope(&self, envelope: &[u8]) {
        self.write_mram(DFU.ptr.address, envelope);
    }

    /// Boots the device: wires up an [`Orchestrator`] over its memories,
    /// and hands it to `f`.
    pub fn boot<P, T, R>(
        &self,
        processor: P,
        trigger: T,
        f: impl FnOnce(&mut Orchestrator<'_, '_, P, T>) -> R,
    ) -> R
    where
        P: Processor,
        T: InstallTrigger,
    {
        let mut builtin = Keyring::<4>::new();
        for &(id, key) in &self.opts.builtin_keys {
            assert!(builtin.insert(id, key));
        }
        let mut keys = Keyring::<8>::new();
        for &(id, key) in &self.opts.keys {
            assert!(keys.insert(id, key));
        }
        let mut hash = ring::hash::Engine::new();

        let cache = Cache::new(&self.mram, self.opts.config.max_uri_len);
        let contexts = Contexts::new();
        let selector = Selector::new(
            &self.opts.layout,
            Backends {
                mram: &self.mram,
                ram: &self.ram,
                extmem: Some(&self.extmem),
                cache: &cache,
                contexts: &contexts,
            },
        );
        let mci = Mci::new(&self.opts.mpi, &self.opts.layout, self.opts.lifecycle);
        let builtin: &mut dyn sig::Provider = &mut builtin;
        let keys: &mut dyn sig::Provider = &mut keys;
        let authenticator = Authenticator::new(mci, builtin, keys);
        let platform = Platform::new(selector, authenticator, &mut hash);

        let mut orchestrator =
            Orchestrator::new(platform, processor, trigger, self.opts.config);
        let result = f(&mut orchestrator);
        assert_eq!(contexts.in_use(), 0, "sink contexts leaked");
        result
    }
}
