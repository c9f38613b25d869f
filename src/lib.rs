//! Protocol engine for Kocom-style wallpad RS-485 buses.
//!
//! The engine owns one bus connection (serial device or socket bridge),
//! frames and checks the byte stream, decodes per-family packets into typed
//! device states, and runs a paced, acknowledged command queue in the other
//! direction. Hosts integrate through three surfaces: category
//! subscriptions for state changes, [`Controller::submit_command`] for
//! control, and the command report channel for terminal outcomes.
//!
//! ```no_run
//! use wallpad_controller::{Category, CommandValue, Config, Controller, DeviceSubType, DeviceType};
//!
//! # async fn run() -> wallpad_controller::Result<()> {
//! let controller = Controller::connect(Config::new("/dev/ttyUSB0")).await?;
//! let mut lights = controller.subscribe(Category::Switch);
//! controller.submit_command(
//!     DeviceType::Light,
//!     1,
//!     0,
//!     DeviceSubType::None,
//!     CommandValue::Switch(true),
//! )?;
//! while let Some(state) = lights.recv().await {
//!     println!("{:?} {:?}", state.key(), state.state);
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod constants;
pub mod controller;
pub mod detect;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod registry;
pub mod transport;

pub use controller::{Config, Controller};
pub use detect::HardwareGeneration;
pub use device::{
    Category, CommandValue, DeviceKey, DeviceState, DeviceSubType, DeviceType, FanMode,
    ThermostatState, Value,
};
pub use dispatch::{CommandOutcome, CommandReport, DispatchConfig};
pub use error::{Error, Result};
pub use registry::Registry;
pub use transport::ConnectionState;
