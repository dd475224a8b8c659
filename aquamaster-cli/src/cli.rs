// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright OXIDOS AUTOMOTIVE 2024.

use clap::{Arg, Command};

pub fn make_cli() -> Command {
    Command::new("aquamaster")
        .about("Software bus master for Jandy Aqualink RS-485 pool equipment")
        .arg(
            Arg::new("tty")
                .long("tty")
                .value_name("PATH")
                .default_value("/dev/ttyS0")
                .help("Serial device wired to the RS-485 transceiver"),
        )
}
