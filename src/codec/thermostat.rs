//! Thermostat family (header 0x28).
//!
//! Frame layout
//! - 04 common prefix (STX, header, length, type)
//! - 01 sequence
//! - 01 room (low nibble)
//! - 01 flags (bit0: heating)
//! - 01 target temperature (low 6 bits whole degrees, bit6 adds 0.5)
//! - 02 current temperature (big-endian, tenths of a degree)
//! - 01 checksum

use crate::{
    codec::{ack_code, read_be16, BuiltCommand},
    constants::{
        HEADER_THERMOSTAT, TYPE_STATE_CONTROL, TYPE_STATE_CONTROL_ACK, TYPE_STATE_QUERY_ACK,
    },
    detect::HardwareGeneration,
    device::{CommandValue, DeviceState, DeviceSubType, DeviceType, ThermostatState, Value},
    error::{Error, Result},
    message::{frame_template, seal, RawFrame},
};

const FRAME_LEN: usize = 11;

/// Control requests share the ack layout, so sniffing our own transmission
/// parses the same as the wallpad's reply.
fn accepted_type(type_byte: u8) -> bool {
    matches!(
        type_byte,
        TYPE_STATE_QUERY_ACK | TYPE_STATE_CONTROL_ACK | TYPE_STATE_CONTROL
    )
}

pub fn parse(frame: &RawFrame) -> Vec<DeviceState> {
    if frame.len() < FRAME_LEN || !accepted_type(frame.type_byte()) {
        return Vec::new();
    }
    let room = frame[5] & 0x0F;
    let heating = frame[6] & 0x01 == 0x01;
    let target = (frame[7] & 0x3F) as f32 + if frame[7] & 0x40 != 0 { 0.5 } else { 0.0 };
    let Some(current_raw) = read_be16(frame, 8) else {
        return Vec::new();
    };

    vec![DeviceState::new(
        DeviceType::Thermostat,
        room,
        0,
        DeviceSubType::None,
        Value::Climate(ThermostatState {
            heating,
            target_temperature: target,
            current_temperature: current_raw as f32 / 10.0,
        }),
    )]
}

pub fn build(room_id: u8, value: &CommandValue) -> Result<BuiltCommand> {
    let CommandValue::Climate {
        heating,
        target_temperature,
    } = value
    else {
        return Err(Error::UnsupportedCommand(format!(
            "thermostat expects a climate value, got {value:?}"
        )));
    };

    let mut bytes = frame_template(HEADER_THERMOSTAT, FRAME_LEN)?;
    bytes[3] = TYPE_STATE_CONTROL;
    bytes[5] = room_id & 0x0F;
    bytes[6] = u8::from(*heating);
    let whole = (*target_temperature as u8) & 0x3F;
    let half = if target_temperature.fract() >= 0.5 { 0x40 } else { 0x00 };
    bytes[7] = whole | half;

    Ok(BuiltCommand {
        frame: seal(bytes),
        ack_header: HEADER_THERMOSTAT,
        ack_index: 3,
        expected_ack: ack_code(HardwareGeneration::General) | (TYPE_STATE_CONTROL & 0x0F),
    })
}
