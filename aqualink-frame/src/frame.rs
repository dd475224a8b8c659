// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright OXIDOS AUTOMOTIVE 2024.

// Packet framer for the RS-485 protocol spoken by Jandy pool equipment,
// commonly marketed as "Aqualink".
//
// On the wire a frame is `10 02 <escaped payload> <escaped checksum> 10 03`.
// The byte 0x10 is ambiguous because it also starts the header and footer,
// so the sender stuffs a 0x00 after every 0x10 that is not part of either
// delimiter. The checksum is the low byte of the sum of everything from the
// first header byte through the last payload byte, and it is escaped too.

use thiserror::Error;

pub const HEADER: [u8; 2] = [0x10, 0x02];
pub const FOOTER: [u8; 2] = [0x10, 0x03];
pub const ESCAPE: u8 = 0x10;

/// Header, one payload byte, checksum, footer, no escapes.
pub const MIN_FRAME_LEN: usize = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame of {0} bytes is shorter than the {MIN_FRAME_LEN} byte minimum")]
    TooShort(usize),

    #[error("Frame does not start with the 10 02 header")]
    BadHeader,

    #[error("Frame does not end with the 10 03 footer")]
    BadFooter,

    #[error("Checksum mismatch: frame carries {carried:#04x}, calculated {calculated:#04x}")]
    BadChecksum { carried: u8, calculated: u8 },
}

fn mod256_sum(buf: &[u8]) -> u8 {
    buf.iter().fold(0u8, |sum, byte| sum.wrapping_add(*byte))
}

/// Escape `10` to `10 00`.
pub fn pack(src: &[u8]) -> Vec<u8> {
    let mut dest = Vec::with_capacity(src.len() * 2);

    for &byte in src {
        dest.push(byte);
        if byte == ESCAPE {
            dest.push(0x00);
        }
    }

    dest
}

/// Unescape `10 00` to just `10`.
///
/// Position-agnostic: lone `10` bytes (header, footer, a trailing escape
/// char) pass through untouched. Only the exact `10 00` pairs collapse.
pub fn unpack(src: &[u8]) -> Vec<u8> {
    let mut dest = Vec::with_capacity(src.len());
    let mut i = 0;

    while i < src.len() {
        let byte = src[i];
        dest.push(byte);
        i += 1;
        if byte == ESCAPE && i < src.len() && src[i] == 0x00 {
            i += 1;
        }
    }

    dest
}

/// [`unpack`] with source and destination coinciding. Unescaping never
/// expands, so writing left to right stays behind the read cursor.
///
/// Returns the unescaped length; the tail of `buf` beyond it is garbage.
pub fn unpack_in_place(buf: &mut [u8]) -> usize {
    let mut write = 0;
    let mut read = 0;

    while read < buf.len() {
        let byte = buf[read];
        buf[write] = byte;
        write += 1;
        read += 1;
        if byte == ESCAPE && read < buf.len() && buf[read] == 0x00 {
            read += 1;
        }
    }

    write
}

/// Encode an unescaped message into a complete on-wire frame.
pub fn encode(msg: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(msg.len() * 2 + MIN_FRAME_LEN);

    frame.extend_from_slice(&HEADER);
    frame.extend_from_slice(&pack(msg));

    // The stuffed 0x00 bytes add nothing to the sum, so summing the
    // unescaped message is the same as summing what is on the wire.
    let sum = mod256_sum(&HEADER).wrapping_add(mod256_sum(msg));
    frame.push(sum);
    if sum == ESCAPE {
        frame.push(0x00);
    }

    frame.extend_from_slice(&FOOTER);

    frame
}

/// Decode a complete frame back into the unescaped message, without the
/// trailing checksum byte.
pub fn decode(frame: &[u8]) -> Result<Vec<u8>, FrameError> {
    if frame.len() < MIN_FRAME_LEN {
        return Err(FrameError::TooShort(frame.len()));
    }

    if frame[..HEADER.len()] != HEADER {
        return Err(FrameError::BadHeader);
    }

    if frame[frame.len() - FOOTER.len()..] != FOOTER {
        return Err(FrameError::BadFooter);
    }

    let mut body = unpack(&frame[HEADER.len()..frame.len() - FOOTER.len()]);

    let carried = match body.pop() {
        Some(byte) => byte,
        None => return Err(FrameError::TooShort(frame.len())),
    };
    let calculated = mod256_sum(&HEADER).wrapping_add(mod256_sum(&body));
    if calculated != carried {
        return Err(FrameError::BadChecksum { carried, calculated });
    }

    Ok(body)
}
