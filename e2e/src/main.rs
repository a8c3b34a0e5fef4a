// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

#![deny(warnings)]
#![deny(unused)]
#![deny(unsafe_code)]
//#![deny(missing_docs)]

use std::fs;
use std::path::PathBuf;

use structopt::StructOpt;

use suit_dfu::component::ComponentId;
use suit_dfu::crypto::ring::sig::SignP256;
use suit_dfu::crypto::sig;
use suit_dfu::execution_mode::ExecutionMode;
use suit_dfu::execution_mode::Mode;
use suit_dfu::manifest::class::Role;
use suit_dfu::platform::Sequence;

pub mod device;
pub mod fakes;

#[cfg(test)]
mod tests;

#[derive(Debug, StructOpt)]
enum Options {
    /// Runs a signed update through a virtual device, and prints the
    /// request it hands to the secure domain.
    Update {
        /// Payloads to fetch into cache partition 1.
        #[structopt(long = "payload", parse(from_os_str))]
        payloads: Vec<PathBuf>,
        /// An image to stage in RAM.
        #[structopt(long, parse(from_os_str))]
        image: Option<PathBuf>,
        /// The key ID to sign the manifest with.
        #[structopt(long, default_value = "1073881344")]
        key_id: u32,
    },
}

fn main() {
    env_logger::init();
    match Options::from_args() {
        Options::Update {
            payloads,
            image,
            key_id,
        } => {
            let mut fetch = Vec::new();
            for path in &payloads {
                let payload = fs::read(path).unwrap();
                let digest =
                    ring::digest::digest(&ring::digest::SHA256, &payload);
                fetch.push(fakes::Step::Fetch {
                    pool: 1,
                    uri: format!("file://{}", path.display()),
                    digest: digest.as_ref().to_vec(),
                    payload,
                });
            }
            if let Some(path) = image {
                fetch.push(fakes::Step::Write {
                    component: fakes::encode_id(ComponentId::CandidateImage(0)),
                    payload: fs::read(path).unwrap(),
                });
            }
            let manifest = fakes::Manifest {
                class_id: device::class_id(Role::AppLocal1),
                sequences: vec![(Sequence::PayloadFetch, fetch)],
            };

            let pkcs8 = SignP256::generate_pkcs8().unwrap();
            let mut signer = SignP256::from_pkcs8(&pkcs8).unwrap();
            let opts = device::Options {
                keys: vec![(key_id, signer.public())],
                ..Default::default()
            };
            let envelope = fakes::Envelope::new(
                &manifest,
                Some((key_id, &mut signer as &mut dyn sig::Sign, -7)),
            );

            let virt = device::Virtual::new(opts);
            virt.store_envelope(&envelope.to_bytes());

            let mut mode = ExecutionMode::new();
            mode.set(Mode::Install).unwrap();
            let processor = fakes::Script::new(&virt.mram);
            let trigger = fakes::Trigger::default();
            virt.boot(processor, trigger, |orchestrator| {
                orchestrator.initialize().unwrap();
                let outcome = orchestrator.process(&mode);
                eprintln!("outcome: {:?}", outcome);
                for request in &orchestrator.trigger().requests {
                    for region in request.regions() {
                        println!("{:#010x} +{:#x}", region.ptr.address, region.len);
                    }
                }
            });
        }
    }
}
