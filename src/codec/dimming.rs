//! Dimming light layouts (header 0x32, plus every 0x30-range frame on a
//! Gen2 installation).
//!
//! Two record schemes exist:
//!
//! Gen1 (General-generation dimming panels): counts at bytes 10/11, then
//! 13-byte light records followed by 14-byte outlet records from offset 12.
//!
//! Gen2: room at byte 4, light count at byte 5, packed records from byte 6
//! with a stride of 3 (on/off panels, header 0x31) or 4 (dimming panels,
//! header 0x32, extra colour-temperature byte), then an outlet count byte
//! and 3-byte outlet records.
//!
//! In both schemes a record whose leading byte has 0x8 in the high nibble
//! is an unused slot and is skipped without producing a state.

use crate::{
    codec::{ack_code, read_be16, BuiltCommand},
    constants::{
        HEADER_DIMMING, HEADER_LIGHT, SLOT_UNUSED_NIBBLE, TYPE_STATE_CONTROL,
        TYPE_STATE_CONTROL_ACK, TYPE_STATE_QUERY_ACK,
    },
    detect::HardwareGeneration,
    device::{CommandValue, DeviceState, DeviceSubType, DeviceType, Value},
    error::{Error, Result},
    message::{frame_template, seal, FrameBuf, RawFrame},
};

const GEN1_HEADER_LEN: usize = 12;
const GEN1_LIGHT_RECORD: usize = 13;
const GEN1_OUTLET_RECORD: usize = 14;

const GEN2_RECORDS_START: usize = 6;
const GEN2_OUTLET_RECORD: usize = 3;

/// Circuits per dimming panel. Also keeps every built frame inside the
/// Gen1 record budget (12 + 13 * 8 + 1 bytes).
const MAX_SLOTS: u8 = 8;

fn check_slot(device_index: u8) -> Result<()> {
    if device_index >= MAX_SLOTS {
        return Err(Error::UnsupportedCommand(format!(
            "dimming panels expose {MAX_SLOTS} circuits, index {device_index} is out of range"
        )));
    }
    Ok(())
}

fn accepted_type(type_byte: u8) -> bool {
    matches!(
        type_byte,
        TYPE_STATE_QUERY_ACK | TYPE_STATE_CONTROL_ACK | TYPE_STATE_CONTROL
    )
}

fn slot_unused(lead: u8) -> bool {
    lead >> 4 == SLOT_UNUSED_NIBBLE
}

pub fn parse_gen1(frame: &RawFrame) -> Vec<DeviceState> {
    if frame.len() < GEN1_HEADER_LEN || !accepted_type(frame.type_byte()) {
        return Vec::new();
    }
    let room = frame[5] & 0x0F;
    let light_count = frame[10] as usize;
    let outlet_count = frame[11] as usize;
    let mut states = Vec::new();

    for i in 0..light_count {
        let off = GEN1_HEADER_LEN + GEN1_LIGHT_RECORD * i;
        if off + GEN1_LIGHT_RECORD > frame.len() - 1 {
            break;
        }
        if slot_unused(frame[off]) {
            continue;
        }
        let on = frame[off + 1] & 0x01 == 0x01;
        let level = if on { frame[off + 2] } else { 0 };
        states.push(DeviceState::new(
            DeviceType::DimmingLight,
            room,
            i as u8,
            DeviceSubType::None,
            Value::Int(level as i64),
        ));
    }

    let outlets_base = GEN1_HEADER_LEN + GEN1_LIGHT_RECORD * light_count;
    for i in 0..outlet_count {
        let off = outlets_base + GEN1_OUTLET_RECORD * i;
        if off + GEN1_OUTLET_RECORD > frame.len() - 1 {
            break;
        }
        if slot_unused(frame[off]) {
            continue;
        }
        states.push(DeviceState::new(
            DeviceType::Outlet,
            room,
            i as u8,
            DeviceSubType::None,
            Value::Bool(frame[off + 1] & 0x01 == 0x01),
        ));
        if let Some(raw) = read_be16(frame, off + 2) {
            states.push(DeviceState::new(
                DeviceType::Outlet,
                room,
                i as u8,
                DeviceSubType::PowerUsage,
                Value::Float(raw as f64 / 10.0),
            ));
        }
    }

    states
}

const fn gen2_stride(header: u8) -> usize {
    if header == HEADER_DIMMING {
        4
    } else {
        3
    }
}

pub fn parse_gen2(frame: &RawFrame) -> Vec<DeviceState> {
    if frame.len() < GEN2_RECORDS_START + 1 || !accepted_type(frame.type_byte()) {
        return Vec::new();
    }
    let header = frame.header();
    let stride = gen2_stride(header);
    let room = frame[4] & 0x0F;
    let light_count = frame[5] as usize;
    let mut states = Vec::new();

    for i in 0..light_count {
        let off = GEN2_RECORDS_START + stride * i;
        if off + stride > frame.len() - 1 {
            return states;
        }
        let lead = frame[off];
        if slot_unused(lead) {
            continue;
        }
        let on = lead & 0x01 == 0x01;
        if header == HEADER_DIMMING {
            let level = if on { frame[off + 1] } else { 0 };
            states.push(DeviceState::new(
                DeviceType::DimmingLight,
                room,
                i as u8,
                DeviceSubType::None,
                Value::Int(level as i64),
            ));
        } else {
            states.push(DeviceState::new(
                DeviceType::Light,
                room,
                i as u8,
                DeviceSubType::None,
                Value::Bool(on),
            ));
        }
    }

    // Outlet block sits after the last light record.
    let block = GEN2_RECORDS_START + stride * light_count;
    if block >= frame.len() - 1 {
        return states;
    }
    let outlet_count = frame[block] as usize;
    for i in 0..outlet_count {
        let off = block + 1 + GEN2_OUTLET_RECORD * i;
        if off + GEN2_OUTLET_RECORD > frame.len() - 1 {
            break;
        }
        let status = frame[off];
        if slot_unused(status) {
            continue;
        }
        states.push(DeviceState::new(
            DeviceType::Outlet,
            room,
            i as u8,
            DeviceSubType::None,
            Value::Bool(status & 0x01 == 0x01),
        ));
        if let Some(raw) = read_be16(frame, off + 1) {
            states.push(DeviceState::new(
                DeviceType::Outlet,
                room,
                i as u8,
                DeviceSubType::PowerUsage,
                Value::Float(raw as f64 / 10.0),
            ));
        }
    }

    states
}

fn level_from(value: &CommandValue) -> Result<u8> {
    match value {
        CommandValue::Level(level) => Ok(*level),
        CommandValue::Switch(true) => Ok(0xFF),
        CommandValue::Switch(false) => Ok(0),
        other => Err(Error::UnsupportedCommand(format!(
            "dimming light expects a level, got {other:?}"
        ))),
    }
}

pub fn build_gen1(room_id: u8, device_index: u8, value: &CommandValue) -> Result<BuiltCommand> {
    check_slot(device_index)?;
    let level = level_from(value)?;
    let slots = device_index as usize + 1;
    let len = GEN1_HEADER_LEN + GEN1_LIGHT_RECORD * slots + 1;
    let mut bytes = frame_template(HEADER_DIMMING, len)?;
    bytes[3] = TYPE_STATE_CONTROL;
    bytes[5] = room_id & 0x0F;
    bytes[10] = slots as u8;
    for i in 0..slots {
        let off = GEN1_HEADER_LEN + GEN1_LIGHT_RECORD * i;
        if i == device_index as usize {
            bytes[off] = i as u8;
            bytes[off + 1] = u8::from(level > 0);
            bytes[off + 2] = level;
        } else {
            bytes[off] = SLOT_UNUSED_NIBBLE << 4;
        }
    }
    Ok(BuiltCommand {
        frame: seal(bytes),
        ack_header: HEADER_DIMMING,
        ack_index: 3,
        expected_ack: ack_code(HardwareGeneration::General) | (TYPE_STATE_CONTROL & 0x0F),
    })
}

fn gen2_template(header: u8, room_id: u8, len: usize) -> Result<FrameBuf> {
    let mut bytes = frame_template(header, len)?;
    bytes[3] = TYPE_STATE_CONTROL;
    bytes[4] = room_id & 0x0F;
    Ok(bytes)
}

fn gen2_command(frame_bytes: FrameBuf, header: u8) -> BuiltCommand {
    BuiltCommand {
        frame: seal(frame_bytes),
        ack_header: header,
        ack_index: 3,
        expected_ack: ack_code(HardwareGeneration::Gen2) | (TYPE_STATE_CONTROL & 0x0F),
    }
}

pub fn build_gen2_light(room_id: u8, device_index: u8, value: &CommandValue) -> Result<BuiltCommand> {
    let CommandValue::Switch(on) = value else {
        return Err(Error::UnsupportedCommand(format!(
            "light expects a switch value, got {value:?}"
        )));
    };
    check_slot(device_index)?;
    let stride = gen2_stride(HEADER_LIGHT);
    let slots = device_index as usize + 1;
    // Light records, empty outlet block, checksum.
    let len = GEN2_RECORDS_START + stride * slots + 1 + 1;
    let mut bytes = gen2_template(HEADER_LIGHT, room_id, len)?;
    bytes[5] = slots as u8;
    for i in 0..slots {
        let off = GEN2_RECORDS_START + stride * i;
        bytes[off] = if i == device_index as usize {
            u8::from(*on)
        } else {
            SLOT_UNUSED_NIBBLE << 4
        };
    }
    Ok(gen2_command(bytes, HEADER_LIGHT))
}

pub fn build_gen2_dimming(
    room_id: u8,
    device_index: u8,
    value: &CommandValue,
) -> Result<BuiltCommand> {
    check_slot(device_index)?;
    let level = level_from(value)?;
    let stride = gen2_stride(HEADER_DIMMING);
    let slots = device_index as usize + 1;
    let len = GEN2_RECORDS_START + stride * slots + 1 + 1;
    let mut bytes = gen2_template(HEADER_DIMMING, room_id, len)?;
    bytes[5] = slots as u8;
    for i in 0..slots {
        let off = GEN2_RECORDS_START + stride * i;
        if i == device_index as usize {
            bytes[off] = u8::from(level > 0);
            bytes[off + 1] = level;
        } else {
            bytes[off] = SLOT_UNUSED_NIBBLE << 4;
        }
    }
    Ok(gen2_command(bytes, HEADER_DIMMING))
}

pub fn build_gen2_outlet(
    room_id: u8,
    device_index: u8,
    value: &CommandValue,
) -> Result<BuiltCommand> {
    let CommandValue::Switch(on) = value else {
        return Err(Error::UnsupportedCommand(format!(
            "outlet expects a switch value, got {value:?}"
        )));
    };
    check_slot(device_index)?;
    let slots = device_index as usize + 1;
    // No light records: count 0, then the outlet block.
    let len = GEN2_RECORDS_START + 1 + GEN2_OUTLET_RECORD * slots + 1;
    let mut bytes = gen2_template(HEADER_LIGHT, room_id, len)?;
    bytes[5] = 0;
    bytes[GEN2_RECORDS_START] = slots as u8;
    for i in 0..slots {
        let off = GEN2_RECORDS_START + 1 + GEN2_OUTLET_RECORD * i;
        bytes[off] = if i == device_index as usize {
            u8::from(*on)
        } else {
            SLOT_UNUSED_NIBBLE << 4
        };
    }
    Ok(gen2_command(bytes, HEADER_LIGHT))
}
