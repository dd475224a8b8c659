// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright OXIDOS AUTOMOTIVE 2024.

// Jandy RS control panel: a button pad, an LED field, and a one-line text
// display. The master pushes display text and LED state to it and learns
// about button presses from the acknowledgment replies.

use byteorder::{BigEndian, ByteOrder};

use crate::device::SlaveOps;
use crate::errors::{PropertyError, SlaveError};
use crate::property::{PropertyStore, PropertyType};

/// Acknowledgment reply; carries the last pressed button code.
pub const PANEL_ACK: u8 = 0x01;
/// Set the LED field: four big-endian mask bytes plus a complement byte.
pub const PANEL_SET_LEDS: u8 = 0x02;
/// Write the text line: a flag byte, then the ASCII text.
pub const PANEL_DISPLAY: u8 = 0x03;

/// Longest text the panel's display line accepts.
const MAX_DISPLAY_LEN: usize = 13;

const BUTTON_NAMES: &[(u8, &str)] = &[
    (0x01, "spa"),
    (0x02, "pump"),
    (0x05, "aux1"),
    (0x06, "aux4"),
    (0x0a, "aux2"),
    (0x0b, "aux5"),
    (0x0f, "aux3"),
    (0x10, "aux6"),
    (0x12, "pool heat"),
    (0x15, "aux7"),
    (0x17, "spa heat"),
    (0x1c, "aux extra"),
];

fn button_name(code: u8) -> &'static str {
    BUTTON_NAMES
        .iter()
        .find(|(candidate, _)| *candidate == code)
        .map(|(_, name)| *name)
        .unwrap_or("unknown")
}

const SCHEMA: &[(&str, PropertyType)] = &[
    ("celsius", PropertyType::Bool),
    ("last_button", PropertyType::Int),
    ("led_mask", PropertyType::Int),
];

/// The panel is write-mostly: requests rotate through display and LED
/// updates, two of which render the temperatures other slaves published to
/// the shared store.
#[derive(Debug, Default)]
pub struct RsPanel {
    cycle: u32,
    led_mask: u32,
}

impl RsPanel {
    pub fn new() -> Self {
        Self::default()
    }

    fn display_request(&self, addr: u8, buf: &mut [u8], text: &str) -> Result<usize, SlaveError> {
        if text.len() > MAX_DISPLAY_LEN {
            return Err(SlaveError::TextTooLong(text.len()));
        }

        buf[0] = addr;
        buf[1] = PANEL_DISPLAY;
        buf[2] = 0;
        buf[3..3 + text.len()].copy_from_slice(text.as_bytes());

        Ok(3 + text.len())
    }

    fn led_request(&mut self, addr: u8, buf: &mut [u8]) -> usize {
        // Walk a single lit LED across the field, restarting once the bit
        // shifts out.
        self.led_mask = if self.led_mask == 0 { 1 } else { self.led_mask << 1 };

        buf[0] = addr;
        buf[1] = PANEL_SET_LEDS;
        BigEndian::write_u32(&mut buf[2..6], self.led_mask);
        buf[6] = !(self.led_mask as u8);

        7
    }
}

impl SlaveOps for RsPanel {
    fn kind(&self) -> &'static str {
        "rs-panel"
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
        props: &mut PropertyStore,
        ctx: &PropertyStore,
        buf: &mut [u8],
    ) -> Result<usize, SlaveError> {
        let case = self.cycle % 4;
        self.cycle = self.cycle.wrapping_add(1);

        match case {
            0 => {
                let text = format!("LED {:08x}", self.led_mask);
                self.display_request(addr, buf, &text)
            }
            1 => {
                let len = self.led_request(addr, buf);
                props.set_int("led_mask", self.led_mask as i32)?;
                Ok(len)
            }
            2 => {
                let temp = ctx.get_int("pool_temp")?;
                self.display_request(addr, buf, &format!("POOL TEMP {temp}F"))
            }
            _ => {
                let temp = ctx.get_int("spa_temp")?;
                self.display_request(addr, buf, &format!("SPA TEMP {temp}F"))
            }
        }
    }

    fn handle_reply(
        &mut self,
        props: &mut PropertyStore,
        _ctx: &mut PropertyStore,
        reply: &[u8],
    ) -> Result<(), SlaveError> {
        match reply[1] {
            PANEL_ACK => {
                if reply.len() < 4 {
                    return Err(SlaveError::ShortReply {
                        cmd: PANEL_ACK,
                        want: 4,
                        got: reply.len(),
                    });
                }

                // reply[2] carries flag bits we have no decoding for.
                let button = reply[3];
                if button != 0 {
                    log::info!("Button {button:#04x} ({}) pressed", button_name(button));
                    props.set_int("last_button", button.into())?;
                }

                Ok(())
            }
            other => Err(SlaveError::UnknownCommand(other)),
        }
    }
}
