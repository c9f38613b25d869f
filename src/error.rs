use thiserror::Error;

/// Engine errors, split by how they are recovered.
///
/// Everything except `Detection` is absorbed close to where it happens:
/// framing and checksum failures discard a single frame, connection failures
/// drive the reconnect machine, an exhausted command is dropped and logged.
/// Only generation detection failure aborts session setup.
#[derive(Error, Debug)]
pub enum Error {
    /// Unrecognized header byte or a non-positive computed length.
    /// The frame is discarded and scanning resumes at the next start marker.
    #[error("framing error: {0}")]
    Framing(String),

    /// Trailing checksum byte does not match the computed value.
    #[error("checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    Checksum { expected: u8, actual: u8 },

    /// Transport-level I/O failure; triggers the reconnect state machine and
    /// never propagates past the transport layer.
    #[error("connection error: {0}")]
    Connection(String),

    /// The sniffed startup window could not be classified. Fatal: surfaces
    /// to session setup and aborts startup. Carries the observed bytes for
    /// diagnostics.
    #[error("hardware generation detection failed after {} bytes", sample.len())]
    Detection { sample: Vec<u8> },

    /// A command ran out of send attempts without a matching ack.
    #[error("command exhausted after {attempts} attempts")]
    CommandExhausted { attempts: u32 },

    /// A command was submitted for a device/value the codec has no builder
    /// for (e.g. gas valve "open", which the bus does not accept).
    #[error("unsupported command: {0}")]
    UnsupportedCommand(String),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Connection(value.to_string())
    }
}

pub type Result<T> = core::result::Result<T, Error>;
