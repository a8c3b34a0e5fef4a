// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

#![no_main]

use libfuzzer_sys::fuzz_target;

use suit_dfu::component;
use suit_dfu::component::ComponentId;

fuzz_target!(|id: ComponentId| {
    let mut buf = [0; component::MAX_ENCODED_LEN];
    let encoded = id.encode(&mut buf).unwrap();
    assert_eq!(ComponentId::decode(encoded).unwrap(), id);
});
