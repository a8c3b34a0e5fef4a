// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Manifest provisioning tables, and the policy they imply.

use std::path::Path;
use std::path::PathBuf;

use serde_json::json;

use suit_dfu::component::Uuid;
use suit_dfu::config::Layout;
use suit_dfu::execution_mode::Mode;
use suit_dfu::manifest::class::Lcs;
use suit_dfu::manifest::class::KEY_GENERATIONS;
use suit_dfu::manifest::mci::Lifecycle;
use suit_dfu::manifest::mci::Mci;
use suit_dfu::manifest::mpi::Provisioning;

use crate::util::parse_u32;
use crate::util::parse_uuid;

/// Inspects provisioning tables and asks policy questions of them.
#[derive(structopt::StructOpt)]
pub enum Mpi {
    /// Validates a JSON provisioning table and prints each class along with
    /// the key IDs that may sign it.
    ShowMpi {
        /// Whether to pretty-print the resulting JSON.
        #[structopt(long)]
        pretty: bool,

        /// Input file, defaults to stdin.
        #[structopt(short = "i", long, parse(from_os_str))]
        input: Option<PathBuf>,
    },

    /// Checks whether a key may sign manifests of a class.
    CheckKey {
        /// The provisioning table, as JSON.
        #[structopt(long, parse(from_os_str))]
        mpi: PathBuf,

        /// The manifest class.
        #[structopt(long, parse(try_from_str = parse_uuid))]
        class: Uuid,

        /// The signing key ID; zero asks about unsigned manifests.
        #[structopt(long, parse(try_from_str = parse_u32))]
        key_id: u32,

        /// The execution mode to ask in.
        #[structopt(long, default_value = "Install")]
        mode: Mode,

        /// The lifecycle state of every domain.
        #[structopt(long, default_value = "Deployed", parse(try_from_str = parse_lcs))]
        lcs: Lcs,
    },

    /// Prints the classes invoked at boot, in order.
    InvokeOrder {
        /// The provisioning table, as JSON.
        #[structopt(long, parse(from_os_str))]
        mpi: PathBuf,

        /// The execution mode to ask in.
        #[structopt(long, default_value = "Invoke")]
        mode: Mode,
    },
}

fn parse_lcs(s: &str) -> Result<Lcs, String> {
    serde_json::from_value(json!(s)).map_err(|e| e.to_string())
}

fn load(path: Option<impl AsRef<Path>>) -> Provisioning {
    let (r, _) = crate::util::stdio(path, None::<PathBuf>);
    let bytes = crate::util::read_all(r);
    check!(
        serde_json::from_slice(&bytes),
        "failed to parse provisioning table"
    )
}

impl Mpi {
    pub fn run(self) {
        match self {
            Self::ShowMpi { pretty, input } => {
                let mpi = load(input);
                let classes = mpi
                    .classes()
                    .iter()
                    .map(|c| {
                        let first = c.role.key_window();
                        let keys = (first..=first + KEY_GENERATIONS)
                            .map(|k| format!("{:#010x}", k))
                            .collect::<Vec<_>>();
                        json!({
                            "class": c,
                            "domain": format!("{:?}", c.role.domain()),
                            "key_ids": keys,
                        })
                    })
                    .collect::<Vec<_>>();
                let json = json!(classes);
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

            Self::CheckKey {
                mpi,
                class,
                key_id,
                mode,
                lcs,
            } => {
                let mpi = load(Some(mpi));
                let layout = Layout::default();
                let lifecycle = Lifecycle {
                    secure: lcs,
                    application: lcs,
                    radio: lcs,
                };
                let mci = Mci::new(&mpi, &layout, lifecycle);
                check!(
                    mci.validate_signing_key(&class, key_id, mode),
                    "key {:#010x} may not sign class {} in {}",
                    key_id,
                    class,
                    mode
                );
                println!("ok");
            }

            Self::InvokeOrder { mpi, mode } => {
                let mpi = load(Some(mpi));
                let layout = Layout::default();
                let mci = Mci::new(&mpi, &layout, Lifecycle::default());
                let order =
                    check!(mci.invoke_order(mode), "no invoke order in {}", mode);
                for class in order {
                    let role = mpi.by_class(&class).map(|c| c.role);
                    match role {
                        Some(role) => println!("{} {}", class, role),
                        None => println!("{}", class),
                    }
                }
            }
        }
    }
}
