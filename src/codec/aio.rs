//! Light/outlet family, AIO (all-in-one) generation (headers 0x50..=0x55).
//!
//! The header's low nibble carries the room number. Frame layout
//! - 04 common prefix (header = 0x50 | room)
//! - 01 sequence
//! - 01 light count (up to 8)
//! - 01 light bits
//! - 02 reserved
//! - 01 outlet 0 status
//! - 02 outlet 0 power usage (big-endian, tenths of a watt)
//! - 02 reserved
//! - 01 outlet 1 status
//! - 02 outlet 1 power usage
//! - vr reserved
//! - 01 checksum
//!
//! An outlet status byte encodes both facets: low nibble 0x1 means powered,
//! the whole value in {0x11, 0x12, 0x13} means the standby cutoff is
//! engaged.

use crate::{
    codec::{ack_code, read_be16, BuiltCommand},
    constants::{
        HEADER_AIO_BASE, TYPE_AIO_CONTROL_ACK, TYPE_STATE_CONTROL, TYPE_STATE_QUERY_ACK,
    },
    detect::HardwareGeneration,
    device::{CommandValue, DeviceState, DeviceSubType, DeviceType, Value},
    error::{Error, Result},
    message::{frame_template, seal, RawFrame},
};

const FRAME_LEN: usize = 20;
/// Status byte offsets for the two outlet slots.
const OUTLET_OFFSETS: [usize; 2] = [9, 14];

fn accepted_type(type_byte: u8) -> bool {
    matches!(
        type_byte,
        TYPE_STATE_QUERY_ACK | TYPE_AIO_CONTROL_ACK | TYPE_STATE_CONTROL
    )
}

fn outlet_on(status: u8) -> bool {
    status & 0x0F == 0x01
}

fn outlet_standby_cutoff(status: u8) -> bool {
    matches!(status, 0x11 | 0x12 | 0x13)
}

pub fn parse(frame: &RawFrame) -> Vec<DeviceState> {
    if frame.len() < 8 || !accepted_type(frame.type_byte()) {
        return Vec::new();
    }
    let room = frame.header() & 0x0F;
    let mut states = Vec::new();

    let light_count = frame[5].min(8);
    let light_bits = frame[6];
    for i in 0..light_count {
        states.push(DeviceState::new(
            DeviceType::Light,
            room,
            i,
            DeviceSubType::None,
            Value::Bool(light_bits >> i & 0x01 == 0x01),
        ));
    }

    for (i, offset) in OUTLET_OFFSETS.into_iter().enumerate() {
        if offset >= frame.len() - 1 {
            break;
        }
        let status = frame[offset];
        states.push(DeviceState::new(
            DeviceType::Outlet,
            room,
            i as u8,
            DeviceSubType::None,
            Value::Bool(outlet_on(status)),
        ));
        states.push(DeviceState::new(
            DeviceType::Outlet,
            room,
            i as u8,
            DeviceSubType::StandbyCutoff,
            Value::Bool(outlet_standby_cutoff(status)),
        ));
        if let Some(raw) = read_be16(frame, offset + 1) {
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

fn template(room_id: u8) -> Result<(crate::message::FrameBuf, u8)> {
    let header = HEADER_AIO_BASE | (room_id & 0x0F);
    let mut bytes = frame_template(header, FRAME_LEN)?;
    bytes[3] = TYPE_STATE_CONTROL;
    Ok((bytes, header))
}

pub fn build_light(room_id: u8, device_index: u8, value: &CommandValue) -> Result<BuiltCommand> {
    let CommandValue::Switch(on) = value else {
        return Err(Error::UnsupportedCommand(format!(
            "light expects a switch value, got {value:?}"
        )));
    };
    if device_index >= 8 {
        return Err(Error::UnsupportedCommand(format!(
            "AIO rooms expose eight lights, index {device_index} is out of range"
        )));
    }
    let (mut bytes, header) = template(room_id)?;
    bytes[5] = 8;
    if *on {
        bytes[6] = 1 << device_index;
    }
    Ok(BuiltCommand {
        frame: seal(bytes),
        ack_header: header,
        ack_index: 3,
        expected_ack: ack_code(HardwareGeneration::Aio) | (TYPE_STATE_CONTROL & 0x0F),
    })
}

pub fn build_outlet(room_id: u8, device_index: u8, value: &CommandValue) -> Result<BuiltCommand> {
    let CommandValue::Switch(on) = value else {
        return Err(Error::UnsupportedCommand(format!(
            "outlet expects a switch value, got {value:?}"
        )));
    };
    let Some(offset) = OUTLET_OFFSETS.get(device_index as usize) else {
        return Err(Error::UnsupportedCommand(format!(
            "AIO rooms expose two outlets, index {device_index} is out of range"
        )));
    };
    let (mut bytes, header) = template(room_id)?;
    bytes[*offset] = if *on { 0x01 } else { 0x00 };
    Ok(BuiltCommand {
        frame: seal(bytes),
        ack_header: header,
        ack_index: 3,
        expected_ack: ack_code(HardwareGeneration::Aio) | (TYPE_STATE_CONTROL & 0x0F),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(states: &[DeviceState], t: DeviceType, idx: u8, sub: DeviceSubType) -> &DeviceState {
        states
            .iter()
            .find(|s| s.device_type == t && s.device_index == idx && s.sub_type == sub)
            .expect("state missing")
    }

    #[test]
    fn test_parse_status() {
        // Room 3, 6 lights with 0 and 5 on, outlet 0 on with 45.6 W,
        // outlet 1 in standby cutoff.
        let mut bytes = frame_template(0x53, 20).unwrap();
        bytes[3] = TYPE_STATE_QUERY_ACK;
        bytes[5] = 6;
        bytes[6] = 0b0010_0001;
        bytes[9] = 0x01;
        bytes[10] = 0x01;
        bytes[11] = 0xC8; // 456
        bytes[14] = 0x12;
        let states = parse(&seal(bytes));

        assert_eq!(states[0].room_id, 3);
        let lights = states
            .iter()
            .filter(|s| s.device_type == DeviceType::Light)
            .count();
        assert_eq!(lights, 6);
        assert_eq!(
            find(&states, DeviceType::Light, 5, DeviceSubType::None).state,
            Value::Bool(true)
        );
        assert_eq!(
            find(&states, DeviceType::Outlet, 0, DeviceSubType::None).state,
            Value::Bool(true)
        );
        assert_eq!(
            find(&states, DeviceType::Outlet, 0, DeviceSubType::PowerUsage).state,
            Value::Float(45.6)
        );
        // 0x12: low nibble 2, so not powered, but cutoff engaged.
        assert_eq!(
            find(&states, DeviceType::Outlet, 1, DeviceSubType::None).state,
            Value::Bool(false)
        );
        assert_eq!(
            find(&states, DeviceType::Outlet, 1, DeviceSubType::StandbyCutoff).state,
            Value::Bool(true)
        );
    }

    #[test]
    fn test_light_count_is_capped() {
        let mut bytes = frame_template(0x51, 20).unwrap();
        bytes[3] = TYPE_STATE_QUERY_ACK;
        bytes[5] = 0x7F;
        let states = parse(&seal(bytes));
        let lights = states
            .iter()
            .filter(|s| s.device_type == DeviceType::Light)
            .count();
        assert_eq!(lights, 8);
    }

    #[test]
    fn test_build_parse_round_trip() {
        let built = build_light(4, 3, &CommandValue::Switch(true)).unwrap();
        assert!(built.frame.verify());
        assert_eq!(built.frame.header(), 0x54);
        let states = parse(&built.frame);
        assert_eq!(
            find(&states, DeviceType::Light, 3, DeviceSubType::None).state,
            Value::Bool(true)
        );

        let built = build_outlet(2, 1, &CommandValue::Switch(true)).unwrap();
        let states = parse(&built.frame);
        assert_eq!(
            find(&states, DeviceType::Outlet, 1, DeviceSubType::None).state,
            Value::Bool(true)
        );
    }

    #[test]
    fn test_out_of_range_index_is_rejected() {
        let err = build_light(1, 8, &CommandValue::Switch(true)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedCommand(_)));
        assert!(build_light(1, 7, &CommandValue::Switch(true)).is_ok());
        assert!(build_outlet(1, 2, &CommandValue::Switch(true)).is_err());
    }

    #[test]
    fn test_aio_ack_overview() {
        let built = build_light(1, 0, &CommandValue::Switch(false)).unwrap();
        assert_eq!(built.expected_ack, 0xB2);
        let mut ack = frame_template(0x51, 20).unwrap();
        ack[3] = TYPE_AIO_CONTROL_ACK;
        assert!(built.is_acked_by(&seal(ack)));
    }
}
