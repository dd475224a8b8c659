// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright OXIDOS AUTOMOTIVE 2024.

use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};

use crate::errors::SerialError;
use crate::settings::BusSettings;

/// Open the tty wired to the RS-485 transceiver: 8N1, no flow control.
///
/// RS-485 transmitter-enable (RTS on send) is driver configuration done on
/// the host (TIOCSRS485 or device tree); the master only consumes the byte
/// stream.
pub fn open(path: &str, settings: &BusSettings) -> Result<SerialStream, SerialError> {
    let stream = tokio_serial::new(path, settings.baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .open_native_async()?;

    Ok(stream)
}
