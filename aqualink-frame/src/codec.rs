// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright OXIDOS AUTOMOTIVE 2024.

// Streaming extraction of Aqualink frames from a serial byte stream.
//
// The bus is noisy: a read may start mid-frame, carry line garbage between
// frames, or deliver a frame in several chunks. The decoder scans the
// accumulated buffer for a `10 02` header, throws away whatever precedes it,
// and waits for the `10 03` footer before handing the complete frame to
// [`frame::decode`].

use std::io;

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{self, FrameError, FOOTER, HEADER};

/// An unescaped message: slave address, command, command-specific payload.
pub type Message = Vec<u8>;

#[derive(Debug, Default)]
pub struct FrameCodec;

fn find_pair(haystack: &[u8], needle: [u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|window| window == needle)
}

impl Decoder for FrameCodec {
    // Corrupt frames come out as items rather than stream errors, so one bad
    // checksum does not tear down the serial session.
    type Item = Result<Message, FrameError>;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, io::Error> {
        let Some(start) = find_pair(src, HEADER) else {
            return Ok(None);
        };

        if start > 0 {
            // The bytes before the header are junk.
            log::debug!("Discarding {start} junk bytes ahead of frame header");
            src.advance(start);
        }

        // The footer search must begin past the header; payload escaping
        // guarantees no `10 03` can occur in between.
        let Some(footer) = find_pair(&src[HEADER.len()..], FOOTER) else {
            return Ok(None);
        };

        let frame_len = HEADER.len() + footer + FOOTER.len();
        let frame = src.split_to(frame_len);

        Ok(Some(frame::decode(&frame)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, io::Error> {
        let item = self.decode(src)?;
        if item.is_none() {
            // A partial frame at EOF is never going to complete.
            src.clear();
        }
        Ok(item)
    }
}

impl Encoder<Message> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> Result<(), io::Error> {
        dst.extend_from_slice(&frame::encode(&msg));
        Ok(())
    }
}
