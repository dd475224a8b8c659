// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright OXIDOS AUTOMOTIVE 2024.

mod cli;

use anyhow::{Context, Result};
use aquamaster_lib::connection;
use aquamaster_lib::devices::jxi_heater::JxiHeater;
use aquamaster_lib::devices::rs_panel::RsPanel;
use aquamaster_lib::master::Master;
use aquamaster_lib::registry::DeviceRegistry;
use aquamaster_lib::settings::BusSettings;

// The protocol engine is strictly single-threaded; one reactor thread is all
// a 9600 baud bus deserves.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = cli::make_cli().get_matches();
    let tty = matches
        .get_one::<String>("tty")
        .expect("--tty has a default value")
        .clone();

    let settings = BusSettings::default();

    let mut registry = DeviceRegistry::new();
    registry
        .insert(0x68, Box::new(JxiHeater::new()))
        .context("Failed to register the JXi heater")?;
    registry
        .insert(0x40, Box::new(RsPanel::new()))
        .context("Failed to register the RS panel")?;

    let stream = connection::open(&tty, &settings)
        .with_context(|| format!("Failed to open serial port {tty}"))?;

    log::info!("Starting up as bus master on {tty}");

    let mut master = Master::new(stream, registry, settings);
    tokio::select! {
        res = master.run() => res.context("Bus master terminated"),
        _ = tokio::signal::ctrl_c() => {
            log::info!("Interrupted. shutting down");
            Ok(())
        }
    }
}
