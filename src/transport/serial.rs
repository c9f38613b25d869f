//! RS-485 line driver attached through a local serial device.

use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::info;

use crate::error::{Error, Result};

/// Wallpad buses run 9600 8N1.
pub const BAUD_RATE: u32 = 9600;

pub async fn open(path: &str) -> Result<SerialStream> {
    let stream = tokio_serial::new(path, BAUD_RATE)
        .open_native_async()
        .map_err(|e| Error::Connection(format!("serial open {path}: {e}")))?;
    info!(path, baud = BAUD_RATE, "serial line opened");
    Ok(stream)
}
