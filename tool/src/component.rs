// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Component ID encoding and decoding.

use std::io::Write as _;
use std::path::PathBuf;

use serde_json::json;

use suit_dfu::component;
use suit_dfu::component::ComponentId;
use suit_dfu::component::Uuid;

use crate::util::parse_hex;
use crate::util::parse_u32;
use crate::util::parse_uuid;

/// Converts component IDs between their CBOR and human-readable forms.
#[derive(structopt::StructOpt)]
pub enum Component {
    /// Encodes a component ID, printing the CBOR as hex.
    #[structopt(name = "encode-component")]
    Encode {
        #[structopt(subcommand)]
        id: Id,

        /// Write raw CBOR instead of hex.
        #[structopt(long)]
        raw: bool,

        /// Output file, defaults to stdout.
        #[structopt(short = "o", long, parse(from_os_str))]
        output: Option<PathBuf>,
    },

    /// Decodes a CBOR component ID, printing it as JSON.
    #[structopt(name = "decode-component")]
    Decode {
        /// The CBOR encoding, in hex.
        cbor: String,

        /// Whether to pretty-print the resulting JSON.
        #[structopt(long)]
        pretty: bool,
    },
}

/// A component ID, spelled out on the command line.
#[derive(structopt::StructOpt)]
pub enum Id {
    /// A range of memory.
    Mem {
        /// The processor the address is relative to.
        #[structopt(long)]
        cpu: i32,
        /// The first byte of the range.
        #[structopt(long, parse(try_from_str = parse_u32))]
        address: u32,
        /// The length of the range.
        #[structopt(long, parse(try_from_str = parse_u32))]
        size: u32,
    },
    /// A staged candidate image.
    CandImg {
        #[structopt(parse(try_from_str = parse_u32))]
        index: u32,
    },
    /// A staged candidate manifest.
    CandMfst {
        #[structopt(parse(try_from_str = parse_u32))]
        index: u32,
    },
    /// A DFU cache partition.
    CachePool {
        #[structopt(parse(try_from_str = parse_u32))]
        index: u32,
    },
    /// A special component.
    Special {
        #[structopt(parse(try_from_str = parse_u32))]
        index: u32,
    },
    /// An installed manifest.
    InstldMfst {
        /// The manifest's class.
        #[structopt(parse(try_from_str = parse_uuid))]
        class: Uuid,
    },
}

impl From<Id> for ComponentId {
    fn from(id: Id) -> Self {
        match id {
            Id::Mem { cpu, address, size } => ComponentId::Mem {
                cpu_id: cpu,
                address,
                size,
            },
            Id::CandImg { index } => ComponentId::CandidateImage(index),
            Id::CandMfst { index } => ComponentId::CandidateManifest(index),
            Id::CachePool { index } => ComponentId::CachePool(index),
            Id::Special { index } => ComponentId::Special(index),
            Id::InstldMfst { class } => ComponentId::InstalledManifest(class),
        }
    }
}

fn to_json(id: &ComponentId) -> serde_json::Value {
    let fields = match *id {
        ComponentId::Mem {
            cpu_id,
            address,
            size,
        } => json!({
            "cpu_id": cpu_id,
            "address": format!("{:#010x}", address),
            "size": size,
        }),
        ComponentId::CandidateImage(n)
        | ComponentId::CandidateManifest(n)
        | ComponentId::CachePool(n)
        | ComponentId::Special(n) => json!({ "index": n }),
        ComponentId::InstalledManifest(class) => {
            json!({ "class": class.to_string() })
        }
    };
    json!({ "type": id.type_name(), "id": fields })
}

impl Component {
    pub fn run(self) {
        match self {
            Self::Encode { id, raw, output } => {
                let id = ComponentId::from(id);
                let mut buf = [0; component::MAX_ENCODED_LEN];
                let cbor = check!(id.encode(&mut buf), "failed to encode {:?}", id);

                let (_, mut w) = crate::util::stdio(None::<PathBuf>, output);
                if raw {
                    check!(w.write_all(cbor), "failed to write output");
                } else {
                    check!(
                        writeln!(w, "{}", hex::encode(cbor)),
                        "failed to write output"
                    );
                }
            }

            Self::Decode { cbor, pretty } => {
                let cbor = check!(parse_hex(&cbor), "bad input");
                let id = check!(
                    ComponentId::decode(&cbor),
                    "failed to decode component ID"
                );
                let json = to_json(&id);
                if pretty {
                    check!(
                        serde_json::to_writer_pretty(std::io::stdout(), &json),
                        "failed to write JSON"
                    );
                } else {
                    check!(
                        serde_json::to_writer(std::io::stdout(), &json),
                        "failed to write JSON"
                    );
                }
                println!();
            }
        }
    }
}
