//! Hardware generation detection.
//!
//! Installations speak one of three payload dialects. The engine sniffs a
//! window of startup traffic and classifies it once per connection session;
//! the chosen generation gates which codec branches run afterwards.

use tracing::{debug, info};

use crate::{
    constants::{DETECT_WINDOW_BYTES, STX, TYPE_AIO_CONTROL_ACK, TYPE_STATE_QUERY_ACK},
    error::{Error, Result},
    message::{length_rule, LengthRule},
};

/// Payload-layout dialect of the installed wallpad. Immutable for the
/// lifetime of a connection session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareGeneration {
    General,
    Aio,
    Gen2,
}

/// Frame lengths that mark the AIO dialect when paired with an ack type.
const AIO_LENGTHS: [usize; 2] = [20, 22];
/// Frame lengths that mark the Gen2 dialect.
const GEN2_LENGTHS: [usize; 3] = [59, 72, 98];

/// Classify a sniffed traffic sample.
///
/// The sample must cover the full detection window; a shorter sample means
/// the stream closed early and detection cannot be trusted. That failure is
/// fatal to session setup and carries the offending bytes for diagnostics.
///
/// AIO is checked before Gen2: if both signatures appear in one window the
/// sample classifies as AIO. Policy choice, not a bus guarantee.
pub fn classify(sample: &[u8]) -> Result<HardwareGeneration> {
    if sample.len() < DETECT_WINDOW_BYTES {
        return Err(Error::Detection {
            sample: sample.to_vec(),
        });
    }

    let mut saw_aio = false;
    let mut saw_gen2 = false;

    let mut pos = 0;
    while pos + 4 <= sample.len() {
        if sample[pos] != STX {
            pos += 1;
            continue;
        }
        let header = sample[pos + 1];
        let (len, type_byte) = match length_rule(header) {
            Some(LengthRule::Fixed(len)) => (len, sample[pos + 2]),
            Some(LengthRule::Variable) => (sample[pos + 2] as usize, sample[pos + 3]),
            None => {
                pos += 1;
                continue;
            }
        };
        if len < 4 || pos + len > sample.len() {
            // Truncated tail or garbage length; keep scanning.
            pos += 1;
            continue;
        }

        if AIO_LENGTHS.contains(&len)
            && (type_byte == TYPE_STATE_QUERY_ACK || type_byte == TYPE_AIO_CONTROL_ACK)
        {
            saw_aio = true;
        } else if GEN2_LENGTHS.contains(&len) && type_byte == TYPE_STATE_QUERY_ACK {
            saw_gen2 = true;
        }
        pos += len;
    }

    let generation = if saw_aio {
        HardwareGeneration::Aio
    } else if saw_gen2 {
        HardwareGeneration::Gen2
    } else {
        HardwareGeneration::General
    };
    debug!(saw_aio, saw_gen2, "generation signatures in sniff window");
    info!(?generation, "hardware generation detected");
    Ok(generation)
}
