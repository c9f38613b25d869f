use std::time::Duration;

/// Start-of-frame marker.
pub const STX: u8 = 0x02;

/// Largest frame the bus produces (Gen2 status dumps top out at 98 bytes).
pub const MAX_FRAME_LEN: usize = 128;

/// Checksum seed. The bus scheme is XOR-then-increment starting from 3,
/// not a standard CRC.
pub const CHECKSUM_SEED: u8 = 3;

/// Generic acknowledgment type byte, accepted for any pending command.
pub const ACK_GENERIC: u8 = 0x81;

// Type bytes shared by the variable-length families. Control requests reuse
// the ack payload layout; only the high nibble differs on the wire.
pub const TYPE_STATE_QUERY: u8 = 0x11;
pub const TYPE_STATE_CONTROL: u8 = 0x12;
pub const TYPE_STATE_QUERY_ACK: u8 = 0x91;
pub const TYPE_STATE_CONTROL_ACK: u8 = 0x92;
pub const TYPE_AIO_CONTROL_ACK: u8 = 0xB2;

// Family header bytes. AIO headers carry the room number in the low nibble.
pub const HEADER_THERMOSTAT: u8 = 0x28;
pub const HEADER_LIGHT: u8 = 0x31;
pub const HEADER_DIMMING: u8 = 0x32;
pub const HEADER_LIGHT_RANGE: core::ops::RangeInclusive<u8> = 0x30..=0x3F;
pub const HEADER_AIO_RANGE: core::ops::RangeInclusive<u8> = 0x50..=0x55;
pub const HEADER_AIO_BASE: u8 = 0x50;
pub const HEADER_VENTILATION: u8 = 0x2B;
pub const HEADER_GAS: u8 = 0x12;
pub const HEADER_COOKTOP: u8 = 0x71;
pub const HEADER_DOORLOCK: u8 = 0x41;
pub const HEADER_ELEVATOR: u8 = 0xC1;
pub const HEADER_ENERGY: u8 = 0xD1;

// Fixed frame lengths for the control families whose length byte slot is
// the type byte instead.
pub const LEN_VENTILATION: usize = 10;
pub const LEN_GAS: usize = 10;
pub const LEN_COOKTOP: usize = 10;
pub const LEN_DOORLOCK: usize = 19;
pub const LEN_ELEVATOR: usize = 12;

/// Slot sentinel in dimming records: a leading byte with this high nibble
/// marks the slot unused.
pub const SLOT_UNUSED_NIBBLE: u8 = 0x08;

/// Bytes of traffic to sniff before classifying the hardware generation.
pub const DETECT_WINDOW_BYTES: usize = 1024;

/// Inter-frame settle delay after every write. Without it consecutive
/// command frames corrupt each other on the physical bus.
pub const SEND_SETTLE: Duration = Duration::from_millis(50);

/// Pause between transmissions of the head-of-queue command.
pub const DISPATCH_INTERVAL: Duration = Duration::from_millis(250);

/// Send attempts per command before it is dropped.
pub const MAX_SEND_ATTEMPTS: u32 = 5;

/// Reconnect backoff cap in seconds; delay is min(2^attempt, this).
pub const RECONNECT_CAP_SECS: u64 = 60;
