// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Payload digests, as a manifest would carry them.

use std::path::PathBuf;

use suit_dfu::crypto::hash;
use suit_dfu::crypto::hash::EngineExt as _;
use suit_dfu::crypto::ring;
use suit_dfu::digest;

use crate::util::parse_hex;

/// Computes and checks payload digests.
#[derive(structopt::StructOpt)]
pub enum Digest {
    /// Hashes a payload, printing the digest as hex.
    ///
    /// With `--expect`, compares the digest against the given one instead,
    /// exiting with an error if they differ.
    Digest {
        /// The COSE hash algorithm to use.
        #[structopt(long, default_value = "-16", allow_hyphen_values = true)]
        alg: i32,

        /// The digest to compare against, in hex.
        #[structopt(long)]
        expect: Option<String>,

        /// Input file, defaults to stdin.
        #[structopt(short = "i", long, parse(from_os_str))]
        input: Option<PathBuf>,
    },
}

impl Digest {
    pub fn run(self) {
        match self {
            Self::Digest { alg, expect, input } => {
                let (r, _) = crate::util::stdio(input, None::<PathBuf>);
                let payload = crate::util::read_all(r);
                let mut engine = ring::hash::Engine::new();

                if let Some(expect) = expect {
                    let expected = check!(parse_hex(&expect), "bad digest");
                    check!(
                        digest::check_digest(
                            &mut engine,
                            alg,
                            &expected,
                            &payload
                        ),
                        "digest check failed"
                    );
                    eprintln!("ok");
                    return;
                }

                let algo = check!(
                    hash::Algo::from_cose(alg).ok_or(alg),
                    "unknown COSE hash algorithm"
                );
                let mut out = vec![0; algo.bytes()];
                check!(
                    engine.contiguous_hash(algo, &payload, &mut out),
                    "hashing failed"
                );
                println!("{}", hex::encode(out));
            }
        }
    }
}
