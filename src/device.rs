//! Typed read model for everything the bus reports.
//!
//! Identity of a state record is `(device_type, room_id, device_index,
//! sub_type)`; an outlet's on/off switch, its power-usage reading and its
//! standby-cutoff flag are three records sharing the first three fields.

/// Closed set of device classes carried by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    Light,
    DimmingLight,
    Outlet,
    Thermostat,
    Ventilation,
    GasValve,
    Doorlock,
    Elevator,
    BatchSwitch,
    Energy,
    Intercom,
}

/// Outward domain category the host collaborator subscribes by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Switch,
    Sensor,
    Climate,
    Fan,
}

impl DeviceType {
    /// Each device class maps to exactly one outward category.
    pub const fn category(&self) -> Category {
        match self {
            DeviceType::Light
            | DeviceType::DimmingLight
            | DeviceType::Outlet
            | DeviceType::GasValve
            | DeviceType::Doorlock
            | DeviceType::BatchSwitch => Category::Switch,
            DeviceType::Thermostat => Category::Climate,
            DeviceType::Ventilation => Category::Fan,
            DeviceType::Elevator | DeviceType::Energy | DeviceType::Intercom => Category::Sensor,
        }
    }
}

/// Qualifier for devices exposing more than one observable facet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceSubType {
    #[default]
    None,
    PowerUsage,
    StandbyCutoff,
    CutoffValue,
    Direction,
    Floor,
    HomeEntrance,
    CommonEntrance,
    HomeEntranceSchedule,
    CommonEntranceSchedule,
}

/// Ventilator speed, decoded from the 3-level speed byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanMode {
    Off,
    Low,
    Medium,
    High,
}

impl FanMode {
    pub fn from_speed(power_on: bool, speed: u8) -> Self {
        if !power_on {
            return FanMode::Off;
        }
        match speed {
            1 => FanMode::Low,
            2 => FanMode::Medium,
            3 => FanMode::High,
            _ => FanMode::Off,
        }
    }

    pub const fn speed(&self) -> u8 {
        match self {
            FanMode::Off => 0,
            FanMode::Low => 1,
            FanMode::Medium => 2,
            FanMode::High => 3,
        }
    }
}

/// Thermostat facet: mode plus targets travel together in one record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermostatState {
    pub heating: bool,
    pub target_temperature: f32,
    pub current_temperature: f32,
}

/// Tagged state value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Climate(ThermostatState),
    Fan(FanMode),
}

/// Registry identity of a state record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceKey {
    pub device_type: DeviceType,
    pub room_id: u8,
    pub device_index: u8,
    pub sub_type: DeviceSubType,
}

/// One parsed observation from the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    pub device_type: DeviceType,
    pub room_id: u8,
    pub device_index: u8,
    pub sub_type: DeviceSubType,
    pub state: Value,
    pub attributes: Vec<(&'static str, Value)>,
}

impl DeviceState {
    pub fn new(
        device_type: DeviceType,
        room_id: u8,
        device_index: u8,
        sub_type: DeviceSubType,
        state: Value,
    ) -> Self {
        Self {
            device_type,
            room_id,
            device_index,
            sub_type,
            state,
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, name: &'static str, value: Value) -> Self {
        self.attributes.push((name, value));
        self
    }

    pub fn key(&self) -> DeviceKey {
        DeviceKey {
            device_type: self.device_type,
            room_id: self.room_id,
            device_index: self.device_index,
            sub_type: self.sub_type,
        }
    }
}

/// Requested value attached to an outbound command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandValue {
    /// On/off for lights, outlets, batch switch, ventilation power.
    Switch(bool),
    /// Dimming level (0 turns the light off).
    Level(u8),
    /// Ventilator speed.
    Fan(FanMode),
    /// Thermostat heat flag + target temperature.
    Climate { heating: bool, target_temperature: f32 },
    /// One-shot: close the gas valve.
    GasClose,
    /// One-shot: unlock the doorlock.
    Unlock,
    /// Call the elevator to this floor.
    ElevatorCall,
}
