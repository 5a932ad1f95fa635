use thiserror::Error;

use super::device_type::DeviceKind;

/// Fixed leading byte marking the start of every frame.
pub const FRAME_SENTINEL: u8 = 0xFF;

/// Smallest decodable frame: sentinel, device code, length, checksum,
/// command, and two parameter bytes.
pub const MIN_FRAME_LEN: usize = 7;

/// Offset of the checksum byte within a frame.
const CHECKSUM_OFFSET: usize = 3;

/// Start continuous measurement.
pub const CMD_START_MEASUREMENT: u8 = 0xA0;
/// Stop continuous measurement.
pub const CMD_STOP_MEASUREMENT: u8 = 0xA1;
/// Set the breath amplitude level (one parameter byte).
pub const CMD_SET_AMPLITUDE: u8 = 0xA4;

/// Device code of the respiration belt (HKH-11C).
pub const DEVICE_RESPIRATION_BELT: u8 = 0xCC;

/// Frame decode faults. All are non-fatal at the session level: the caller
/// resynchronizes byte by byte and keeps scanning.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("header mismatch: expected sentinel 0xFF, got {found:#04x}")]
    HeaderMismatch { found: u8 },

    #[error("length mismatch: frame needs {needed} bytes, have {have}")]
    LengthMismatch { needed: usize, have: usize },

    #[error("checksum mismatch: computed {computed:#04x}, embedded {embedded:#04x}")]
    ChecksumMismatch { computed: u8, embedded: u8 },
}

impl FrameError {
    /// A length mismatch on a well-headed buffer just means more bytes are
    /// in flight; the other faults require discarding a byte and rescanning.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, FrameError::LengthMismatch { .. })
    }
}

/// One complete, checksum-validated protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub device_code: u8,
    pub command: u8,
    pub parameters: Vec<u8>,
    /// Big-endian accumulation of the parameter bytes.
    pub value: i64,
}

impl Frame {
    /// Look up the sensor class for this frame's device code.
    pub fn device_kind(&self) -> Option<DeviceKind> {
        DeviceKind::from_code(self.device_code)
    }
}

/// A decoded frame plus the number of buffered bytes it consumed. The caller
/// must advance its buffer by exactly `consumed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub frame: Frame,
    pub consumed: usize,
}

/// Sum of all bytes, modulo 256.
pub fn checksum<I>(bytes: I) -> u8
where
    I: IntoIterator<Item = u8>,
{
    bytes.into_iter().fold(0u8, |acc, b| acc.wrapping_add(b))
}

/// Build an outgoing command frame.
///
/// Layout: `[0xFF, device_code, L, checksum, command, parameters...]` where
/// `L = parameters.len() + 3` and the checksum covers `[L, command,
/// parameters...]`.
pub fn encode(device_code: u8, command: u8, parameters: &[u8]) -> Vec<u8> {
    let length = (parameters.len() + 3) as u8;

    let mut frame = Vec::with_capacity(parameters.len() + 5);
    frame.push(FRAME_SENTINEL);
    frame.push(device_code);
    frame.push(length);
    frame.push(0); // checksum spliced in below
    frame.push(command);
    frame.extend_from_slice(parameters);

    frame[CHECKSUM_OFFSET] = checksum(
        std::iter::once(length).chain(frame[CHECKSUM_OFFSET + 1..].iter().copied()),
    );
    frame
}

/// Try to decode one frame from the front of `buffer`.
///
/// The length byte is only trusted after the checksum validates; on any
/// fault other than [`FrameError::LengthMismatch`] the caller discards a
/// single byte and rescans for the next sentinel.
pub fn decode(buffer: &[u8]) -> Result<Decoded, FrameError> {
    let first = match buffer.first() {
        Some(&b) => b,
        None => {
            return Err(FrameError::LengthMismatch {
                needed: MIN_FRAME_LEN,
                have: 0,
            })
        }
    };
    if first != FRAME_SENTINEL {
        return Err(FrameError::HeaderMismatch { found: first });
    }
    if buffer.len() < MIN_FRAME_LEN {
        return Err(FrameError::LengthMismatch {
            needed: MIN_FRAME_LEN,
            have: buffer.len(),
        });
    }

    let length = buffer[2] as usize;
    let total = length + 2;
    if buffer.len() < total {
        return Err(FrameError::LengthMismatch {
            needed: total,
            have: buffer.len(),
        });
    }

    let computed = checksum(
        std::iter::once(buffer[2]).chain(buffer[4..total].iter().copied()),
    );
    let embedded = buffer[CHECKSUM_OFFSET];
    if computed != embedded {
        return Err(FrameError::ChecksumMismatch { computed, embedded });
    }

    let parameters = buffer[5..total].to_vec();
    let value = parameters
        .iter()
        .fold(0i64, |acc, &b| (acc << 8) | i64::from(b));

    Ok(Decoded {
        frame: Frame {
            device_code: buffer[1],
            command: buffer[4],
            parameters,
            value,
        },
        consumed: total,
    })
}
