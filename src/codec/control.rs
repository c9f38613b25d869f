//! Fixed-length control families: gas valve, cooktop, doorlock and the
//! shared elevator/batch-switch frame.
//!
//! These are one-state-per-frame families. Gas valve and doorlock are
//! one-shot on the command side: the bus accepts "close" and "unlock" but
//! has no packet for the opposite request.

use crate::{
    codec::{ack_code, BuiltCommand},
    constants::{
        HEADER_DOORLOCK, HEADER_ELEVATOR, HEADER_GAS, LEN_DOORLOCK, LEN_ELEVATOR, LEN_GAS,
        TYPE_STATE_CONTROL,
    },
    detect::HardwareGeneration,
    device::{CommandValue, DeviceState, DeviceSubType, DeviceType, Value},
    error::{Error, Result},
    message::{frame_template, seal, RawFrame},
};

const ELEVATOR_MOVING_DOWN: u8 = 0x10;
const ELEVATOR_MOVING_UP: u8 = 0x20;
/// Floor byte: bit 7 marks a basement floor, encoded in the low 7 bits.
const FLOOR_BASEMENT: u8 = 0x80;

/// Gas valve and cooktop replies share a layout; the cooktop cutoff is
/// surfaced as a second gas valve at device index 1.
pub fn parse_gas(frame: &RawFrame, device_index: u8) -> Vec<DeviceState> {
    if frame.len() < LEN_GAS {
        return Vec::new();
    }
    vec![DeviceState::new(
        DeviceType::GasValve,
        1,
        device_index,
        DeviceSubType::None,
        Value::Bool(frame[5] & 0x01 == 0x01),
    )]
}

pub fn parse_doorlock(frame: &RawFrame) -> Vec<DeviceState> {
    if frame.len() < LEN_DOORLOCK {
        return Vec::new();
    }
    let mut states = vec![DeviceState::new(
        DeviceType::Doorlock,
        1,
        0,
        DeviceSubType::None,
        Value::Bool(frame[5] & 0x01 == 0x01),
    )];
    // Entrance-call facets ride along in the doorlock reply.
    let facets = [
        (DeviceSubType::HomeEntrance, frame[6] & 0x01 == 0x01),
        (DeviceSubType::CommonEntrance, frame[7] & 0x01 == 0x01),
        (DeviceSubType::HomeEntranceSchedule, frame[8] & 0x01 == 0x01),
        (DeviceSubType::CommonEntranceSchedule, frame[8] & 0x02 == 0x02),
    ];
    for (sub_type, active) in facets {
        states.push(DeviceState::new(
            DeviceType::Intercom,
            1,
            0,
            sub_type,
            Value::Bool(active),
        ));
    }
    states
}

/// Elevator movement and the batch switch share header 0xC1 and are told
/// apart by payload bytes: a direction marker or a nonzero floor byte means
/// elevator, an all-zero pair means batch switch.
pub fn parse_elevator(frame: &RawFrame) -> Vec<DeviceState> {
    if frame.len() < LEN_ELEVATOR {
        return Vec::new();
    }
    let direction_byte = frame[5];
    let floor_byte = frame[6];

    if direction_byte == ELEVATOR_MOVING_DOWN
        || direction_byte == ELEVATOR_MOVING_UP
        || floor_byte != 0
    {
        let direction = match direction_byte {
            ELEVATOR_MOVING_DOWN => "down",
            ELEVATOR_MOVING_UP => "up",
            _ => "idle",
        };
        let floor = if floor_byte & FLOOR_BASEMENT != 0 {
            -((floor_byte & 0x7F) as i64)
        } else {
            floor_byte as i64
        };
        return vec![
            DeviceState::new(
                DeviceType::Elevator,
                1,
                0,
                DeviceSubType::Direction,
                Value::Str(direction.to_string()),
            ),
            DeviceState::new(
                DeviceType::Elevator,
                1,
                0,
                DeviceSubType::Floor,
                Value::Int(floor),
            ),
        ];
    }

    vec![DeviceState::new(
        DeviceType::BatchSwitch,
        1,
        0,
        DeviceSubType::None,
        Value::Bool(frame[7] & 0x01 == 0x01),
    )]
}

fn fixed_command(header: u8, len: usize) -> Result<crate::message::FrameBuf> {
    let mut bytes = frame_template(header, len)?;
    bytes[2] = TYPE_STATE_CONTROL;
    Ok(bytes)
}

fn command(frame_bytes: crate::message::FrameBuf, header: u8) -> BuiltCommand {
    BuiltCommand {
        frame: seal(frame_bytes),
        ack_header: header,
        ack_index: 2,
        expected_ack: ack_code(HardwareGeneration::General) | (TYPE_STATE_CONTROL & 0x0F),
    }
}

/// The bus only accepts closing the valve; opening is manual at the valve.
pub fn build_gas_close(value: &CommandValue) -> Result<BuiltCommand> {
    match value {
        CommandValue::GasClose | CommandValue::Switch(false) => {}
        other => {
            return Err(Error::UnsupportedCommand(format!(
                "gas valve only closes, got {other:?}"
            )))
        }
    }
    let bytes = fixed_command(HEADER_GAS, LEN_GAS)?;
    Ok(command(bytes, HEADER_GAS))
}

/// The bus only accepts unlocking; locking happens at the door.
pub fn build_unlock(value: &CommandValue) -> Result<BuiltCommand> {
    match value {
        CommandValue::Unlock | CommandValue::Switch(false) => {}
        other => {
            return Err(Error::UnsupportedCommand(format!(
                "doorlock only unlocks, got {other:?}"
            )))
        }
    }
    let bytes = fixed_command(HEADER_DOORLOCK, LEN_DOORLOCK)?;
    Ok(command(bytes, HEADER_DOORLOCK))
}

pub fn build_elevator_call(value: &CommandValue) -> Result<BuiltCommand> {
    if !matches!(value, CommandValue::ElevatorCall) {
        return Err(Error::UnsupportedCommand(format!(
            "elevator only accepts a call, got {value:?}"
        )));
    }
    let mut bytes = fixed_command(HEADER_ELEVATOR, LEN_ELEVATOR)?;
    // A call requests the car downward to the apartment floor.
    bytes[5] = ELEVATOR_MOVING_DOWN;
    Ok(command(bytes, HEADER_ELEVATOR))
}

pub fn build_batch(value: &CommandValue) -> Result<BuiltCommand> {
    let CommandValue::Switch(on) = value else {
        return Err(Error::UnsupportedCommand(format!(
            "batch switch expects a switch value, got {value:?}"
        )));
    };
    let mut bytes = fixed_command(HEADER_ELEVATOR, LEN_ELEVATOR)?;
    bytes[7] = u8::from(*on);
    Ok(command(bytes, HEADER_ELEVATOR))
}
