//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForLength`: Need at least 4 bytes
//! - `WaitingForBody`: Length parsed, need N more bytes (type + payload)
//!
//! A declared length of zero or above the configured maximum is a protocol
//! violation; the buffer refuses to continue and the caller tears the link
//! down. Frames completed ahead of the bad prefix are still handed out first.

use bytes::BytesMut;

use super::wire_format::{LengthPrefix, LENGTH_PREFIX_SIZE, MAX_FRAME_SIZE};
use super::Frame;
use crate::error::{AgentError, Result};

/// State machine for frame parsing.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for the 4-byte length prefix.
    WaitingForLength,
    /// Length parsed, waiting for the type byte and payload.
    WaitingForBody { frame_length: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed frame length (type byte + payload).
    max_frame_size: u32,
    /// Framing error found after frames that were already returned.
    pending_error: Option<AgentError>,
}

impl FrameBuffer {
    /// Create a new frame buffer with the default maximum (8192 bytes).
    pub fn new() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }

    /// Create a new frame buffer with custom max frame size.
    pub fn with_max_frame_size(max_frame_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(MAX_FRAME_SIZE as usize + LENGTH_PREFIX_SIZE),
            state: State::WaitingForLength,
            max_frame_size,
            pending_error: None,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Partial data is buffered internally for the next push.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Protocol`] if a declared length is zero or
    /// exceeds the maximum. When frames were completed before the bad prefix
    /// they are returned first and the error is held for
    /// [`take_error`](Self::take_error) or the next push.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        if let Some(err) = self.pending_error.take() {
            return Err(err);
        }
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        loop {
            match self.try_extract_one() {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => break,
                Err(e) if frames.is_empty() => return Err(e),
                Err(e) => {
                    self.pending_error = Some(e);
                    break;
                }
            }
        }

        Ok(frames)
    }

    /// Framing error held back by the last push, if any.
    pub fn take_error(&mut self) -> Option<AgentError> {
        self.pending_error.take()
    }

    /// Try to extract a single frame from the buffer.
    fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        match self.state {
            State::WaitingForLength => {
                let prefix = match LengthPrefix::decode(&self.buffer) {
                    Some(prefix) => prefix,
                    None => return Ok(None),
                };

                prefix.validate(self.max_frame_size)?;

                let _ = self.buffer.split_to(LENGTH_PREFIX_SIZE);
                self.state = State::WaitingForBody {
                    frame_length: prefix.frame_length as usize,
                };

                self.try_extract_one()
            }

            State::WaitingForBody { frame_length } => {
                if self.buffer.len() < frame_length {
                    return Ok(None);
                }

                let mut body = self.buffer.split_to(frame_length);
                let frame_type = body[0];
                let payload = body.split_off(1).freeze();

                self.state = State::WaitingForLength;

                Ok(Some(Frame::new(frame_type, payload)))
            }
        }
    }

    /// Whether a frame is partially assembled.
    pub fn has_partial_frame(&self) -> bool {
        !self.buffer.is_empty() || matches!(self.state, State::WaitingForBody { .. })
    }

    /// Whether the length prefix has been read and the body is incomplete.
    pub fn is_reading_body(&self) -> bool {
        matches!(self.state, State::WaitingForBody { .. })
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.pending_error = None;
        self.state = State::WaitingForLength;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::WaitingForLength => "WaitingForLength",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
