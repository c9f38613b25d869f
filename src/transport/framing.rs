//! Incremental frame accumulator.
//!
//! The bus may deliver data one byte at a time, so framing is a push
//! parser: bytes go in as they arrive, complete frames come out once the
//! header table says enough have accumulated. Bytes before a start marker
//! are dropped, not buffered; an unknown header byte drops the start
//! marker and rescans from the next byte.

use bytes::{Buf, BytesMut};
use tracing::debug;

use crate::{
    constants::{MAX_FRAME_LEN, STX},
    message::{length_rule, LengthRule, RawFrame},
};

pub struct FrameReader {
    buf: BytesMut,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReader {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(1024),
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pull the next complete frame out of the buffer, if one has fully
    /// arrived. Junk between frames is discarded along the way.
    pub fn next_frame(&mut self) -> Option<RawFrame> {
        loop {
            // Drop everything before the start marker.
            while !self.buf.is_empty() && self.buf[0] != STX {
                self.buf.advance(1);
            }
            // Start marker, header, length-or-type.
            if self.buf.len() < 3 {
                return None;
            }

            let header = self.buf[1];
            let len = match length_rule(header) {
                Some(LengthRule::Fixed(len)) => len,
                Some(LengthRule::Variable) => self.buf[2] as usize,
                None => {
                    debug!(header = format_args!("{header:#04x}"), "unknown header, rescanning");
                    self.buf.advance(1);
                    continue;
                }
            };
            if len < 4 || len > MAX_FRAME_LEN {
                debug!(header = format_args!("{header:#04x}"), len, "implausible frame length");
                self.buf.advance(1);
                continue;
            }
            if self.buf.len() < len {
                return None;
            }

            // from_slice cannot fail: len is bounded above.
            let frame = RawFrame::from_slice(&self.buf[..len]).ok();
            self.buf.advance(len);
            if frame.is_some() {
                return frame;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{frame_template, seal};

    fn light_frame() -> RawFrame {
        let mut bytes = frame_template(0x31, 14).unwrap();
        bytes[3] = 0x91;
        bytes[5] = 0x01;
        bytes[6] = 0x03;
        seal(bytes)
    }

    #[test]
    fn test_whole_frame_at_once() {
        let frame = light_frame();
        let mut reader = FrameReader::new();
        reader.extend(&frame);
        assert_eq!(reader.next_frame().as_ref(), Some(&frame));
        assert!(reader.next_frame().is_none());
    }

    #[test]
    fn test_byte_at_a_time_matches_whole() {
        let frame = light_frame();
        let mut reader = FrameReader::new();
        for (i, byte) in frame.iter().enumerate() {
            reader.extend(&[*byte]);
            if i < frame.len() - 1 {
                assert!(reader.next_frame().is_none());
            }
        }
        assert_eq!(reader.next_frame(), Some(frame));
    }

    #[test]
    fn test_junk_before_start_marker_is_dropped() {
        let frame = light_frame();
        let mut reader = FrameReader::new();
        reader.extend(&[0xFF, 0x00, 0x13]);
        reader.extend(&frame);
        assert_eq!(reader.next_frame(), Some(frame));
    }

    #[test]
    fn test_unknown_header_resyncs() {
        let frame = light_frame();
        let mut reader = FrameReader::new();
        // 0x02 followed by a header outside every known range.
        reader.extend(&[STX, 0xEE, 0x10]);
        reader.extend(&frame);
        assert_eq!(reader.next_frame(), Some(frame));
    }

    #[test]
    fn test_zero_length_is_rejected() {
        let mut reader = FrameReader::new();
        // Variable-length family claiming 0 bytes.
        reader.extend(&[STX, 0x31, 0x00, 0x91]);
        assert!(reader.next_frame().is_none());
    }

    #[test]
    fn test_back_to_back_frames() {
        let frame = light_frame();
        let mut reader = FrameReader::new();
        reader.extend(&frame);
        reader.extend(&frame);
        assert_eq!(reader.next_frame().as_ref(), Some(&frame));
        assert_eq!(reader.next_frame(), Some(frame));
        assert!(reader.next_frame().is_none());
    }

    #[test]
    fn test_fixed_length_family_ignores_length_slot() {
        // Ventilation frames are always 10 bytes; byte 2 is the type.
        let mut bytes = frame_template(0x2B, 10).unwrap();
        bytes[2] = 0x80;
        let frame = seal(bytes);
        let mut reader = FrameReader::new();
        reader.extend(&frame);
        assert_eq!(reader.next_frame(), Some(frame));
    }
}
