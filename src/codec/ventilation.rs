//! Ventilation family (header 0x2B, fixed 10-byte frames).
//!
//! Room-independent: there is one ERV unit per installation. The short
//! query-ack family ({0x80, 0x81, 0x83, 0x84, 0x87}) carries power at byte
//! 5 and speed at byte 6; control frames carry them one byte later.

use crate::{
    codec::{ack_code, BuiltCommand},
    constants::{HEADER_VENTILATION, LEN_VENTILATION, TYPE_STATE_CONTROL},
    detect::HardwareGeneration,
    device::{CommandValue, DeviceState, DeviceSubType, DeviceType, FanMode, Value},
    error::{Error, Result},
    message::{frame_template, seal, RawFrame},
};

const QUERY_ACK_TYPES: [u8; 5] = [0x80, 0x81, 0x83, 0x84, 0x87];

pub fn parse(frame: &RawFrame) -> Vec<DeviceState> {
    if frame.len() < LEN_VENTILATION {
        return Vec::new();
    }
    let type_byte = frame.type_byte();
    let (power_off, speed_off) = if QUERY_ACK_TYPES.contains(&type_byte) {
        (5, 6)
    } else {
        (6, 7)
    };
    let power_on = frame[power_off] & 0x01 == 0x01;
    let speed = frame[speed_off];

    vec![DeviceState::new(
        DeviceType::Ventilation,
        1,
        0,
        DeviceSubType::None,
        Value::Fan(FanMode::from_speed(power_on, speed)),
    )]
}

pub fn build(value: &CommandValue) -> Result<BuiltCommand> {
    let mode = match value {
        CommandValue::Fan(mode) => *mode,
        CommandValue::Switch(true) => FanMode::Low,
        CommandValue::Switch(false) => FanMode::Off,
        other => {
            return Err(Error::UnsupportedCommand(format!(
                "ventilation expects a fan mode, got {other:?}"
            )))
        }
    };

    let mut bytes = frame_template(HEADER_VENTILATION, LEN_VENTILATION)?;
    bytes[2] = TYPE_STATE_CONTROL;
    bytes[6] = u8::from(mode != FanMode::Off);
    bytes[7] = mode.speed();
    Ok(BuiltCommand {
        frame: seal(bytes),
        ack_header: HEADER_VENTILATION,
        ack_index: 2,
        expected_ack: ack_code(HardwareGeneration::General) | (TYPE_STATE_CONTROL & 0x0F),
    })
}
