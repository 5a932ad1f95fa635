pub mod codec;
pub mod device_type;

pub use codec::{
    checksum, decode, encode, Decoded, Frame, FrameError, CMD_SET_AMPLITUDE,
    CMD_START_MEASUREMENT, CMD_STOP_MEASUREMENT, DEVICE_RESPIRATION_BELT, FRAME_SENTINEL,
    MIN_FRAME_LEN,
};
pub use device_type::DeviceKind;
