//! Domain layer: frame layout and errors. No I/O.

pub mod errors;
pub mod frame;

pub use errors::FrameError;
pub use frame::{
    frame_aad, frame_iv, max_payload_length, FrameHeader, DEFAULT_FRAME_LENGTH, HEADER_LENGTH,
    MAX_FRAMES, MAX_FRAME_LENGTH, MIN_FRAME_LENGTH,
};
