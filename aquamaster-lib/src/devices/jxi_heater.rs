// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright OXIDOS AUTOMOTIVE 2024.

// Jandy JXi/LXi pool heater, spoken to through its RS-485 interface board.

use byteorder::{ByteOrder, LittleEndian};

use crate::device::SlaveOps;
use crate::errors::{PropertyError, SlaveError};
use crate::property::{PropertyStore, PropertyType};

/// Control request: setpoints and mode bits toward the heater.
pub const JXI_COMMAND: u8 = 0x0c;
/// Reply to [`JXI_COMMAND`]: status, reserved, and error flag bytes.
pub const JXI_COMMAND_REPLY: u8 = 0x0d;
/// Measurements request and reply: runtime counters and water temperature.
pub const JXI_GET_MEASUREMENTS: u8 = 0x25;

const SCHEMA: &[(&str, PropertyType)] = &[
    ("celsius", PropertyType::Bool),
    ("ext_temp_valid", PropertyType::Bool),
    ("external_temp_reading", PropertyType::Int),
    ("gv_on_time", PropertyType::Int),
    ("heater_error", PropertyType::Bool),
    ("heater_on", PropertyType::Bool),
    ("ignition_cycles", PropertyType::Int),
    ("last_fault", PropertyType::Int),
    ("pool", PropertyType::Bool),
    ("prev_fault", PropertyType::Int),
    ("remote_rs485_disabled", PropertyType::Bool),
    ("setpoint_pool", PropertyType::Int),
    ("setpoint_spa", PropertyType::Int),
    ("spa", PropertyType::Bool),
    ("timeout", PropertyType::Int),
    ("water_temp", PropertyType::Int),
];

#[derive(Debug, Default)]
pub struct JxiHeater;

impl JxiHeater {
    pub fn new() -> Self {
        Self
    }

    fn handle_control_reply(
        &self,
        props: &mut PropertyStore,
        msg: &[u8],
    ) -> Result<(), SlaveError> {
        if msg.len() < 5 {
            return Err(SlaveError::ShortReply {
                cmd: JXI_COMMAND_REPLY,
                want: 5,
                got: msg.len(),
            });
        }

        let status = msg[2];
        // msg[3] is always zero in captures; meaning unknown.
        let errors = msg[4];

        props.set_bool("heater_on", status & 0x08 != 0)?;
        props.set_bool("remote_rs485_disabled", status & 0x10 != 0)?;
        props.set_bool("heater_error", errors & 0x08 != 0)?;

        log::info!("sflags={status:#04x}, eflags={errors:#04x}");
        if status & 0x08 != 0 {
            log::info!("Heater is on or in the process of igniting");
        }
        if status & 0x10 != 0 {
            log::info!("Remote RS-485 is disabled at the panel");
        }
        if errors & 0x08 != 0 {
            log::error!("Heater reports a burner fault");
        }

        Ok(())
    }

    fn handle_measurements(
        &self,
        props: &mut PropertyStore,
        ctx: &mut PropertyStore,
        msg: &[u8],
    ) -> Result<(), SlaveError> {
        if msg.len() < 9 {
            return Err(SlaveError::ShortReply {
                cmd: JXI_GET_MEASUREMENTS,
                want: 9,
                got: msg.len(),
            });
        }

        let gv_on_time = LittleEndian::read_u16(&msg[2..4]);
        let cycles = LittleEndian::read_u16(&msg[4..6]);
        let temperature = i32::from(msg[8]) - 20;

        props.set_int("gv_on_time", gv_on_time.into())?;
        props.set_int("ignition_cycles", cycles.into())?;
        props.set_int("water_temp", temperature)?;
        // The heater's sensor is the authoritative pool temperature; publish
        // it for the panel display and the exporters.
        ctx.set_int("pool_temp", temperature)?;

        log::info!(
            "{cycles} ignition cycles, {gv_on_time} hours of gas valve on-time, \
             water temperature {temperature}"
        );

        Ok(())
    }
}

impl SlaveOps for JxiHeater {
    fn kind(&self) -> &'static str {
        "jxi-heater"
    }

    fn init_properties(&self, props: &mut PropertyStore) -> Result<(), PropertyError> {
        for (name, ty) in SCHEMA {
            props.declare(name, *ty);
        }
        Ok(())
    }

    fn next_request(
        &mut self,
        addr: u8,
        _props: &mut PropertyStore,
        _ctx: &PropertyStore,
        buf: &mut [u8],
    ) -> Result<usize, SlaveError> {
        buf[0] = addr;
        buf[1] = JXI_GET_MEASUREMENTS;
        Ok(2)
    }

    fn handle_reply(
        &mut self,
        props: &mut PropertyStore,
        ctx: &mut PropertyStore,
        reply: &[u8],
    ) -> Result<(), SlaveError> {
        match reply[1] {
            JXI_COMMAND_REPLY => self.handle_control_reply(props, reply),
            JXI_GET_MEASUREMENTS => self.handle_measurements(props, ctx, reply),
            other => Err(SlaveError::UnknownCommand(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heater_props() -> PropertyStore {
        let mut props = PropertyStore::new();
        JxiHeater.init_properties(&mut props).unwrap();
        props
    }

    fn context() -> PropertyStore {
        let mut ctx = PropertyStore::new();
        ctx.declare("pool_temp", PropertyType::Int);
        ctx.declare("spa_temp", PropertyType::Int);
        ctx
    }

    #[test]
    fn measurements_fill_the_property_store() {
        let mut heater = JxiHeater::new();
        let mut props = heater_props();
        let mut ctx = context();

        // 1000 hours of gas valve on-time, 42 cycles, 0x5a - 20 = 70 degrees.
        let reply = [0x68, 0x25, 0xe8, 0x03, 0x2a, 0x00, 0x00, 0x00, 0x5a];
        heater.handle_reply(&mut props, &mut ctx, &reply).unwrap();

        assert_eq!(props.get_int("gv_on_time"), Ok(1000));
        assert_eq!(props.get_int("ignition_cycles"), Ok(42));
        assert_eq!(props.get_int("water_temp"), Ok(70));
        assert_eq!(ctx.get_int("pool_temp"), Ok(70));
    }

    #[test]
    fn control_reply_decodes_the_flag_bytes() {
        let mut heater = JxiHeater::new();
        let mut props = heater_props();
        let mut ctx = context();

        let reply = [0x68, 0x0d, 0x18, 0x00, 0x08];
        heater.handle_reply(&mut props, &mut ctx, &reply).unwrap();

        assert_eq!(props.get_bool("heater_on"), Ok(true));
        assert_eq!(props.get_bool("remote_rs485_disabled"), Ok(true));
        assert_eq!(props.get_bool("heater_error"), Ok(true));

        let reply = [0x68, 0x0d, 0x00, 0x00, 0x00];
        heater.handle_reply(&mut props, &mut ctx, &reply).unwrap();

        assert_eq!(props.get_bool("heater_on"), Ok(false));
        assert_eq!(props.get_bool("remote_rs485_disabled"), Ok(false));
        assert_eq!(props.get_bool("heater_error"), Ok(false));
    }

    #[test]
    fn truncated_replies_are_rejected() {
        let mut heater = JxiHeater::new();
        let mut props = heater_props();
        let mut ctx = context();

        let err = heater
            .handle_reply(&mut props, &mut ctx, &[0x68, 0x25, 0xe8, 0x03])
            .unwrap_err();
        assert_eq!(
            err,
            SlaveError::ShortReply {
                cmd: JXI_GET_MEASUREMENTS,
                want: 9,
                got: 4,
            }
        );

        let err = heater
            .handle_reply(&mut props, &mut ctx, &[0x68, 0x0d, 0x18])
            .unwrap_err();
        assert_eq!(
            err,
            SlaveError::ShortReply {
                cmd: JXI_COMMAND_REPLY,
                want: 5,
                got: 3,
            }
        );
    }

    #[test]
    fn unknown_commands_are_rejected() {
        let mut heater = JxiHeater::new();
        let mut props = heater_props();
        let mut ctx = context();

        let err = heater
            .handle_reply(&mut props, &mut ctx, &[0x68, 0x77, 0x00])
            .unwrap_err();
        assert_eq!(err, SlaveError::UnknownCommand(0x77));
    }

    #[test]
    fn polls_for_measurements_every_cycle() {
        let mut heater = JxiHeater::new();
        let mut props = heater_props();
        let ctx = context();
        let mut buf = [0u8; 16];

        for _ in 0..3 {
            let len = heater.next_request(0x68, &mut props, &ctx, &mut buf).unwrap();
            assert_eq!(&buf[..len], &[0x68, JXI_GET_MEASUREMENTS]);
        }
    }
}
