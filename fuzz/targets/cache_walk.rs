// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Fuzz tests for the DFU cache walker, over partitions holding arbitrary
//! bytes.

#![no_main]

use core::cell::RefCell;

use libfuzzer_sys::fuzz_target;

use suit_dfu::cache::Cache;
use suit_dfu::config::CachePartition;
use suit_dfu::config::Layout;
use suit_dfu::hardware::flash::RamFlash;
use suit_dfu::hardware::flash::Region;
use suit_dfu::sink::StreamSink as _;

const BASE: u32 = 0x1000_0000;
const LEN: u32 = 0x1000;

fuzz_target!(|data: &[u8]| {
    let mut bytes = vec![0xff; LEN as usize];
    let n = data.len().min(bytes.len());
    bytes[..n].copy_from_slice(&data[..n]);
    let flash = RefCell::new(RamFlash::new(bytes, BASE, 0x100));

    let mut layout = Layout::default();
    layout.cache_partitions.push(CachePartition {
        id: 1,
        region: Region::new(BASE, LEN),
    });

    let cache = Cache::new(&flash, 64);
    cache.initialize(&layout, false).unwrap();
    let _ = cache.get(b"http://example.com/payload");
    let _ = cache.populated();

    // Whatever the walker made of the partition, it must still accept a
    // fresh slot, or fail cleanly.
    let contexts = suit_dfu::sink::Contexts::new();
    if let Ok(mut sink) =
        suit_dfu::sink::CacheSink::new(&cache, contexts.cache(), 1, b"fuzz")
    {
        let _ = sink.write(b"payload");
        if sink.commit().is_ok() {
            assert!(cache.get(b"fuzz").is_ok());
        }
        let _ = sink.release();
    }
});
