//! Raw frame representation and the bus checksum.
//!
//! Frame format
//! - 01 STX (0x02)
//! - 01 Header (device family; AIO headers carry the room in the low nibble)
//! - 01 Length (variable families) or Type (fixed families)
//! - 01 Type (variable families) or Sequence (fixed families)
//! - vr Payload
//! - 01 Checksum

use heapless::Vec as HVec;

use crate::{
    constants::{
        ACK_GENERIC, CHECKSUM_SEED, HEADER_AIO_RANGE, HEADER_DOORLOCK, HEADER_ELEVATOR,
        HEADER_ENERGY, HEADER_GAS, HEADER_COOKTOP, HEADER_LIGHT_RANGE, HEADER_THERMOSTAT,
        HEADER_VENTILATION, LEN_COOKTOP, LEN_DOORLOCK, LEN_ELEVATOR, LEN_GAS, LEN_VENTILATION,
        MAX_FRAME_LEN, STX,
    },
    error::{Error, Result},
};

/// How the true length of a frame is found once its header byte is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthRule {
    /// Control families: the whole frame is this many bytes and the byte
    /// after the header is the type byte.
    Fixed(usize),
    /// The byte after the header is the total frame length.
    Variable,
}

/// Header lookup used by the framer. `None` means the byte is not a known
/// header and scanning should resume at the next start marker.
pub fn length_rule(header: u8) -> Option<LengthRule> {
    match header {
        HEADER_THERMOSTAT | HEADER_ENERGY => Some(LengthRule::Variable),
        h if HEADER_LIGHT_RANGE.contains(&h) => Some(LengthRule::Variable),
        h if HEADER_AIO_RANGE.contains(&h) => Some(LengthRule::Variable),
        HEADER_VENTILATION => Some(LengthRule::Fixed(LEN_VENTILATION)),
        HEADER_GAS => Some(LengthRule::Fixed(LEN_GAS)),
        HEADER_COOKTOP => Some(LengthRule::Fixed(LEN_COOKTOP)),
        HEADER_DOORLOCK => Some(LengthRule::Fixed(LEN_DOORLOCK)),
        HEADER_ELEVATOR => Some(LengthRule::Fixed(LEN_ELEVATOR)),
        _ => None,
    }
}

/// Bus checksum: seed 3, then per byte XOR followed by a wrapping +1.
/// Not a standard CRC; must match the wallpad bit-for-bit.
pub fn checksum(bytes: &[u8]) -> u8 {
    let mut value = CHECKSUM_SEED;
    for byte in bytes {
        value ^= byte;
        value = value.wrapping_add(1);
    }
    value
}

/// One complete checksum-delimited unit of the wire protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    bytes: HVec<u8, MAX_FRAME_LEN>,
}

impl RawFrame {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes = HVec::from_slice(bytes)
            .map_err(|_| Error::Framing(format!("frame longer than {MAX_FRAME_LEN} bytes")))?;
        Ok(Self { bytes })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn header(&self) -> u8 {
        self.bytes[1]
    }

    /// Type byte position differs between the fixed and variable families.
    pub fn type_byte(&self) -> u8 {
        match length_rule(self.header()) {
            Some(LengthRule::Fixed(_)) => self.bytes[2],
            _ => *self.bytes.get(3).unwrap_or(&0),
        }
    }

    /// Index of the type byte, used by ack matching.
    pub fn type_index(&self) -> usize {
        match length_rule(self.header()) {
            Some(LengthRule::Fixed(_)) => 2,
            _ => 3,
        }
    }

    /// Whether this frame is the generic acknowledgment for its family.
    pub fn is_generic_ack(&self) -> bool {
        self.type_byte() == ACK_GENERIC
    }

    /// Checksum verification. Anything shorter than 4 bytes is not
    /// checksum-checkable and never valid.
    pub fn verify(&self) -> bool {
        if self.bytes.len() < 4 {
            return false;
        }
        let (body, tail) = self.bytes.split_at(self.bytes.len() - 1);
        checksum(body) == tail[0]
    }

    /// Recompute the checksum into the trailing byte.
    pub fn finalize(&mut self) {
        let last = self.bytes.len() - 1;
        self.bytes[last] = checksum(&self.bytes[..last]);
    }

    pub fn verify_strict(&self) -> Result<()> {
        if self.bytes.len() < 4 {
            return Err(Error::Framing("frame shorter than 4 bytes".into()));
        }
        let expected = checksum(&self.bytes[..self.bytes.len() - 1]);
        let actual = self.bytes[self.bytes.len() - 1];
        if expected == actual {
            Ok(())
        } else {
            Err(Error::Checksum { expected, actual })
        }
    }
}

impl core::ops::Deref for RawFrame {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.bytes
    }
}

/// Fixed-capacity buffer frames are assembled in.
pub type FrameBuf = HVec<u8, MAX_FRAME_LEN>;

/// Builder-side helper: lay out a frame of `len` bytes with the common
/// prefix filled in, leaving payload and checksum for the caller.
pub fn frame_template(header: u8, len: usize) -> Result<FrameBuf> {
    let mut bytes: FrameBuf = HVec::new();
    bytes
        .resize(len, 0)
        .map_err(|_| Error::Framing(format!("frame length {len} exceeds {MAX_FRAME_LEN} bytes")))?;
    bytes[0] = STX;
    bytes[1] = header;
    if matches!(length_rule(header), Some(LengthRule::Variable) | None) {
        bytes[2] = len as u8;
    }
    Ok(bytes)
}

/// Finish a template into a checksum-valid frame.
pub fn seal(bytes: FrameBuf) -> RawFrame {
    let mut frame = RawFrame { bytes };
    frame.finalize();
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_seed_and_step() {
        // Empty input is just the seed.
        assert_eq!(checksum(&[]), 3);
        // One zero byte: 3 ^ 0 = 3, +1 = 4.
        assert_eq!(checksum(&[0x00]), 4);
        // 3 ^ 0x02 = 1, +1 = 2; 2 ^ 0x28 = 0x2A, +1 = 0x2B.
        assert_eq!(checksum(&[0x02, 0x28]), 0x2B);
    }

    #[test]
    fn test_finalize_then_verify() {
        let mut frame = RawFrame::from_slice(&[0x02, 0x28, 0x0B, 0x92, 0x00, 0x03, 0x01, 0x15, 0x00, 0xDF, 0x00]).unwrap();
        frame.finalize();
        assert!(frame.verify());
        assert!(frame.verify_strict().is_ok());
    }

    #[test]
    fn test_single_byte_mutation_fails_verify() {
        let mut frame = RawFrame::from_slice(&[0x02, 0x31, 0x0E, 0x91, 0, 1, 3, 1, 0, 0, 0, 0, 0, 0]).unwrap();
        frame.finalize();
        let reference = frame.clone();
        for i in 0..frame.len() - 1 {
            let mut mutated = reference.clone();
            mutated.bytes[i] ^= 0x40;
            assert!(!mutated.verify(), "mutation at byte {i} still verified");
        }
    }

    #[test]
    fn test_short_frame_never_verifies() {
        let frame = RawFrame::from_slice(&[0x02, 0x28, 0x00]).unwrap();
        assert!(!frame.verify());
    }

    #[test]
    fn test_length_rule_table() {
        assert_eq!(length_rule(0x28), Some(LengthRule::Variable));
        assert_eq!(length_rule(0x31), Some(LengthRule::Variable));
        assert_eq!(length_rule(0x53), Some(LengthRule::Variable));
        assert_eq!(length_rule(0x2B), Some(LengthRule::Fixed(10)));
        assert_eq!(length_rule(0xC1), Some(LengthRule::Fixed(12)));
        assert_eq!(length_rule(0x41), Some(LengthRule::Fixed(19)));
        assert_eq!(length_rule(0xFE), None);
        assert_eq!(length_rule(0x00), None);
    }

    #[test]
    fn test_oversized_template_is_rejected() {
        let err = frame_template(0x31, MAX_FRAME_LEN + 15).unwrap_err();
        assert!(matches!(err, Error::Framing(_)));
        assert!(frame_template(0x31, MAX_FRAME_LEN).is_ok());
    }

    #[test]
    fn test_type_byte_position() {
        // Variable family: type at index 3.
        let mut light = RawFrame::from_slice(&[0x02, 0x31, 0x0E, 0x91, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        light.finalize();
        assert_eq!(light.type_byte(), 0x91);
        // Fixed family: type at index 2.
        let mut vent = RawFrame::from_slice(&[0x02, 0x2B, 0x80, 0, 0, 1, 2, 0, 0, 0]).unwrap();
        vent.finalize();
        assert_eq!(vent.type_byte(), 0x80);
        assert_eq!(vent.type_index(), 2);
    }
}
