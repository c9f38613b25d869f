//! HEMS energy metering (header 0xD1).
//!
//! The reply embeds a small element table: a 0x80 sentinel somewhere in
//! bytes 5..=9, an element count right after it, then per-element entries.
//! A used entry is 8 bytes `[id, status, total(4, BE), realtime(2, BE)]`;
//! an entry whose id has bit 7 set is unused and only 2 bytes long.
//! Malformed or truncated tables yield an empty result, never an error.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;

use crate::{
    device::{DeviceState, DeviceSubType, DeviceType, Value},
    message::RawFrame,
};

const ELEMENT_SENTINEL: u8 = 0x80;
const MAX_ELEMENTS: usize = 5;
const USED_ENTRY_LEN: usize = 8;
const UNUSED_ENTRY_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
enum EnergyElement {
    Electric = 1,
    Water = 2,
    HotWater = 3,
    Gas = 4,
    Heat = 5,
}

impl EnergyElement {
    fn name(&self) -> &'static str {
        match self {
            EnergyElement::Electric => "electric",
            EnergyElement::Water => "water",
            EnergyElement::HotWater => "hotwater",
            EnergyElement::Gas => "gas",
            EnergyElement::Heat => "heat",
        }
    }
}

pub fn parse(frame: &RawFrame) -> Vec<DeviceState> {
    if frame.len() < 4 {
        return Vec::new();
    }
    let Some(sentinel) = (5..=9)
        .filter(|&i| i + 1 < frame.len() - 1)
        .find(|&i| frame[i] == ELEMENT_SENTINEL)
    else {
        return Vec::new();
    };

    let count = (frame[sentinel + 1] as usize).min(MAX_ELEMENTS);
    let mut states = Vec::new();
    let mut pos = sentinel + 2;

    for _ in 0..count {
        if pos >= frame.len() - 1 {
            break;
        }
        let id = frame[pos];
        if id & 0x80 != 0 {
            pos += UNUSED_ENTRY_LEN;
            continue;
        }
        if pos + USED_ENTRY_LEN > frame.len() - 1 {
            break;
        }
        let total = u32::from_be_bytes([
            frame[pos + 2],
            frame[pos + 3],
            frame[pos + 4],
            frame[pos + 5],
        ]);
        let realtime = u16::from_be_bytes([frame[pos + 6], frame[pos + 7]]);
        if let Some(element) = EnergyElement::from_u8(id & 0x7F) {
            states.push(
                DeviceState::new(
                    DeviceType::Energy,
                    1,
                    element as u8,
                    DeviceSubType::None,
                    Value::Int(realtime as i64),
                )
                .with_attribute("total", Value::Int(total as i64))
                .with_attribute("name", Value::Str(element.name().to_string())),
            );
        }
        pos += USED_ENTRY_LEN;
    }

    states
}
