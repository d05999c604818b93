//! Protocol module - wire format, framing, and frame classification.
//!
//! This module implements the controller framing:
//! - 4-byte big-endian length prefix encoding/decoding
//! - Frame buffer for accumulating partial reads
//! - Frame struct and the frame-type / sub-type classification

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{build_frame, ActionSubtype, Frame, FrameKind, GasKind};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    frame_types, subtypes, LengthPrefix, ACTION_SUBTYPE_OFFSET, LENGTH_PREFIX_SIZE,
    MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE,
};
