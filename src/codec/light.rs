//! Light/outlet family, General generation (header 0x31).
//!
//! Frame layout (status and control share it)
//! - 04 common prefix
//! - 01 sequence
//! - 01 room (low nibble)
//! - 01 light bits (bit i = light i on)
//! - 01 outlet bits (bit i = outlet i on, bit4 = standby cutoff engaged)
//! - 04 outlet cutoff thresholds (two big-endian values, tenths of a watt)
//! - 02 shared light power usage (big-endian, tenths of a watt)
//! - vr per-outlet power usage (big-endian pairs from offset 14)
//! - 01 checksum
//!
//! Room 1 is the living room with 4 light and 3 outlet circuits; every
//! other room has 2 of each.

use bitflags::bitflags;

use crate::{
    codec::{ack_code, read_be16, BuiltCommand},
    constants::{
        HEADER_LIGHT, TYPE_STATE_CONTROL, TYPE_STATE_CONTROL_ACK, TYPE_STATE_QUERY_ACK,
    },
    detect::HardwareGeneration,
    device::{CommandValue, DeviceState, DeviceSubType, DeviceType, Value},
    error::{Error, Result},
    message::{frame_template, seal, RawFrame},
};

pub(crate) const MIN_FRAME_LEN: usize = 14;

bitflags! {
    /// Outlet status byte. Low bits are per-outlet power states, bit4 is
    /// the room-wide standby cutoff engage flag.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OutletFlags: u8 {
        const OUTLET_0 = 0b0000_0001;
        const OUTLET_1 = 0b0000_0010;
        const OUTLET_2 = 0b0000_0100;
        const STANDBY_CUTOFF = 0b0001_0000;
    }
}

fn accepted_type(type_byte: u8) -> bool {
    matches!(
        type_byte,
        TYPE_STATE_QUERY_ACK | TYPE_STATE_CONTROL_ACK | TYPE_STATE_CONTROL
    )
}

/// Circuit counts per room. Room 1 is the wallpad's own room.
pub(crate) const fn circuit_counts(room: u8) -> (u8, u8) {
    if room == 1 {
        (4, 3)
    } else {
        (2, 2)
    }
}

pub fn parse(frame: &RawFrame) -> Vec<DeviceState> {
    if frame.len() < MIN_FRAME_LEN || !accepted_type(frame.type_byte()) {
        return Vec::new();
    }
    let room = frame[5] & 0x0F;
    let (light_count, outlet_count) = circuit_counts(room);
    let mut states = Vec::new();

    // Lights: one bit per circuit, plus the shared power reading when the
    // frame extends past the cutoff fields and the reading is nonzero.
    let light_bits = frame[6];
    let shared_power = read_be16(frame, 12).map(|raw| raw as f64 / 10.0);
    for i in 0..light_count {
        states.push(DeviceState::new(
            DeviceType::Light,
            room,
            i,
            DeviceSubType::None,
            Value::Bool(light_bits >> i & 0x01 == 0x01),
        ));
        if let Some(power) = shared_power {
            if power != 0.0 {
                states.push(DeviceState::new(
                    DeviceType::Light,
                    room,
                    i,
                    DeviceSubType::PowerUsage,
                    Value::Float(power),
                ));
            }
        }
    }

    let outlet_flags = OutletFlags::from_bits_retain(frame[7]);
    let standby = outlet_flags.contains(OutletFlags::STANDBY_CUTOFF);
    for i in 0..outlet_count {
        states.push(DeviceState::new(
            DeviceType::Outlet,
            room,
            i,
            DeviceSubType::None,
            Value::Bool(frame[7] >> i & 0x01 == 0x01),
        ));
        states.push(DeviceState::new(
            DeviceType::Outlet,
            room,
            i,
            DeviceSubType::StandbyCutoff,
            Value::Bool(standby),
        ));
        // Cutoff thresholds exist for the first two outlets only.
        if i < 2 {
            if let Some(raw) = read_be16(frame, 8 + 2 * i as usize) {
                states.push(DeviceState::new(
                    DeviceType::Outlet,
                    room,
                    i,
                    DeviceSubType::CutoffValue,
                    Value::Float(raw as f64 / 10.0),
                ));
            }
        }
        if let Some(raw) = read_be16(frame, 14 + 2 * i as usize) {
            states.push(DeviceState::new(
                DeviceType::Outlet,
                room,
                i,
                DeviceSubType::PowerUsage,
                Value::Float(raw as f64 / 10.0),
            ));
        }
    }

    states
}

fn build_switch(room_id: u8, bit_index: u8, byte_offset: usize, on: bool) -> Result<BuiltCommand> {
    let mut bytes = frame_template(HEADER_LIGHT, MIN_FRAME_LEN)?;
    bytes[3] = TYPE_STATE_CONTROL;
    bytes[5] = room_id & 0x0F;
    if on {
        bytes[byte_offset] = 1 << bit_index;
    }
    Ok(BuiltCommand {
        frame: seal(bytes),
        ack_header: HEADER_LIGHT,
        ack_index: 3,
        expected_ack: ack_code(HardwareGeneration::General) | (TYPE_STATE_CONTROL & 0x0F),
    })
}

pub fn build_light(room_id: u8, device_index: u8, value: &CommandValue) -> Result<BuiltCommand> {
    let CommandValue::Switch(on) = value else {
        return Err(Error::UnsupportedCommand(format!(
            "light expects a switch value, got {value:?}"
        )));
    };
    let (light_count, _) = circuit_counts(room_id);
    if device_index >= light_count {
        return Err(Error::UnsupportedCommand(format!(
            "room {room_id} has {light_count} light circuits, index {device_index} is out of range"
        )));
    }
    build_switch(room_id, device_index, 6, *on)
}

pub fn build_outlet(room_id: u8, device_index: u8, value: &CommandValue) -> Result<BuiltCommand> {
    let CommandValue::Switch(on) = value else {
        return Err(Error::UnsupportedCommand(format!(
            "outlet expects a switch value, got {value:?}"
        )));
    };
    let (_, outlet_count) = circuit_counts(room_id);
    if device_index >= outlet_count {
        return Err(Error::UnsupportedCommand(format!(
            "room {room_id} has {outlet_count} outlet circuits, index {device_index} is out of range"
        )));
    }
    build_switch(room_id, device_index, 7, *on)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_frame(room: u8, light_bits: u8, outlet_bits: u8, len: usize) -> RawFrame {
        let mut bytes = frame_template(HEADER_LIGHT, len).unwrap();
        bytes[3] = TYPE_STATE_QUERY_ACK;
        bytes[5] = room;
        bytes[6] = light_bits;
        bytes[7] = outlet_bits;
        seal(bytes)
    }

    fn find(states: &[DeviceState], t: DeviceType, idx: u8, sub: DeviceSubType) -> &DeviceState {
        states
            .iter()
            .find(|s| s.device_type == t && s.device_index == idx && s.sub_type == sub)
            .expect("state missing")
    }

    #[test]
    fn test_room1_counts_and_bits() {
        // 14-byte frame, room 1, light 0 and outlet 0 on.
        let frame = status_frame(1, 0b0001, 0b0001, 14);
        let states = parse(&frame);

        let lights = states
            .iter()
            .filter(|s| s.device_type == DeviceType::Light && s.sub_type == DeviceSubType::None)
            .count();
        let outlets = states
            .iter()
            .filter(|s| s.device_type == DeviceType::Outlet && s.sub_type == DeviceSubType::None)
            .count();
        assert_eq!((lights, outlets), (4, 3));

        assert_eq!(
            find(&states, DeviceType::Light, 0, DeviceSubType::None).state,
            Value::Bool(true)
        );
        assert_eq!(
            find(&states, DeviceType::Light, 1, DeviceSubType::None).state,
            Value::Bool(false)
        );
        assert_eq!(
            find(&states, DeviceType::Outlet, 0, DeviceSubType::None).state,
            Value::Bool(true)
        );
    }

    #[test]
    fn test_other_rooms_have_two_circuits() {
        let states = parse(&status_frame(2, 0b10, 0b10, 14));
        let lights = states
            .iter()
            .filter(|s| s.device_type == DeviceType::Light && s.sub_type == DeviceSubType::None)
            .count();
        assert_eq!(lights, 2);
        assert_eq!(
            find(&states, DeviceType::Light, 1, DeviceSubType::None).state,
            Value::Bool(true)
        );
    }

    #[test]
    fn test_shared_light_power_needs_longer_frame() {
        // In a 14-byte frame bytes 12..14 would overlap the checksum, so no
        // power states may be produced.
        let states = parse(&status_frame(2, 0, 0, 14));
        assert!(states
            .iter()
            .all(|s| !(s.device_type == DeviceType::Light && s.sub_type == DeviceSubType::PowerUsage)));

        // 16-byte frame with 35.1 W shared across lights.
        let mut bytes = frame_template(HEADER_LIGHT, 16).unwrap();
        bytes[3] = TYPE_STATE_QUERY_ACK;
        bytes[5] = 2;
        bytes[12] = 0x01;
        bytes[13] = 0x5F;
        let states = parse(&seal(bytes));
        let power = find(&states, DeviceType::Light, 0, DeviceSubType::PowerUsage);
        assert_eq!(power.state, Value::Float(35.1));
    }

    #[test]
    fn test_standby_cutoff_and_thresholds() {
        let mut bytes = frame_template(HEADER_LIGHT, 14).unwrap();
        bytes[3] = TYPE_STATE_QUERY_ACK;
        bytes[5] = 2;
        bytes[7] = 0b0001_0001; // outlet 0 on, cutoff engaged
        bytes[8] = 0x00;
        bytes[9] = 0x64; // 10.0 W threshold for outlet 0
        let states = parse(&seal(bytes));
        assert_eq!(
            find(&states, DeviceType::Outlet, 0, DeviceSubType::StandbyCutoff).state,
            Value::Bool(true)
        );
        assert_eq!(
            find(&states, DeviceType::Outlet, 1, DeviceSubType::StandbyCutoff).state,
            Value::Bool(true)
        );
        assert_eq!(
            find(&states, DeviceType::Outlet, 0, DeviceSubType::CutoffValue).state,
            Value::Float(10.0)
        );
    }

    #[test]
    fn test_per_outlet_power_usage() {
        // 18-byte frame: power fields for outlets 0 and 1 fit.
        let mut bytes = frame_template(HEADER_LIGHT, 19).unwrap();
        bytes[3] = TYPE_STATE_QUERY_ACK;
        bytes[5] = 2;
        bytes[14] = 0x00;
        bytes[15] = 0x7B; // 12.3
        bytes[16] = 0x04;
        bytes[17] = 0x00; // 102.4
        let states = parse(&seal(bytes));
        assert_eq!(
            find(&states, DeviceType::Outlet, 0, DeviceSubType::PowerUsage).state,
            Value::Float(12.3)
        );
        assert_eq!(
            find(&states, DeviceType::Outlet, 1, DeviceSubType::PowerUsage).state,
            Value::Float(102.4)
        );
    }

    #[test]
    fn test_build_parse_round_trip() {
        let built = build_light(1, 2, &CommandValue::Switch(true)).unwrap();
        assert!(built.frame.verify());
        let states = parse(&built.frame);
        assert_eq!(
            find(&states, DeviceType::Light, 2, DeviceSubType::None).state,
            Value::Bool(true)
        );

        let built = build_outlet(3, 1, &CommandValue::Switch(false)).unwrap();
        let states = parse(&built.frame);
        assert_eq!(
            find(&states, DeviceType::Outlet, 1, DeviceSubType::None).state,
            Value::Bool(false)
        );
    }

    #[test]
    fn test_out_of_range_index_is_rejected() {
        // Room 1 has 4 lights and 3 outlets; everything else 2/2.
        let err = build_light(1, 8, &CommandValue::Switch(true)).unwrap_err();
        assert!(matches!(err, crate::error::Error::UnsupportedCommand(_)));
        assert!(build_light(1, 4, &CommandValue::Switch(true)).is_err());
        assert!(build_light(1, 3, &CommandValue::Switch(true)).is_ok());
        assert!(build_light(2, 2, &CommandValue::Switch(true)).is_err());
        assert!(build_outlet(1, 3, &CommandValue::Switch(false)).is_err());
        assert!(build_outlet(2, 1, &CommandValue::Switch(false)).is_ok());
    }

    #[test]
    fn test_short_frame_is_ignored() {
        let mut bytes = frame_template(HEADER_LIGHT, 10).unwrap();
        bytes[3] = TYPE_STATE_QUERY_ACK;
        assert!(parse(&seal(bytes)).is_empty());
    }
}
