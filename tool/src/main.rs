// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! `suit-dfu-tool` is a simple command-line tool for working with the data
//! `suit-dfu` consumes: component IDs, payload digests and provisioning
//! tables.

#![deny(missing_docs)]
#![deny(warnings)]
#![deny(unused)]
#![deny(unsafe_code)]

use structopt::StructOpt as _;

#[macro_use]
mod util;

mod component;
mod digest;
mod mpi;

/// A command-line tool for working with suit-dfu data.
#[allow(missing_docs)]
#[derive(structopt::StructOpt)]
#[structopt(author)]
enum CliCommand {
    #[structopt(flatten)]
    Component(component::Component),
    #[structopt(flatten)]
    Digest(digest::Digest),
    #[structopt(flatten)]
    Mpi(mpi::Mpi),
}

fn main() {
    match CliCommand::from_args() {
        CliCommand::Component(c) => c.run(),
        CliCommand::Digest(d) => d.run(),
        CliCommand::Mpi(m) => m.run(),
    }
}
