// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright OXIDOS AUTOMOTIVE 2024.

// Software bus master for the Aqualink RS-485 protocol.
//
// The master owns the serial link and is the only node that initiates
// traffic: it probes for registered slaves, polls each one in turn, matches
// replies to the single in-flight request, and folds reply payloads into a
// per-device property store.

pub mod connection;
pub mod device;
pub mod devices;
pub mod errors;
pub mod master;
pub mod property;
pub mod registry;
pub mod settings;

pub use errors::MasterError;
pub use master::Master;
pub use registry::DeviceRegistry;
pub use settings::BusSettings;
