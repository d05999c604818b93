//! Wire format encoding and decoding.
//!
//! Every message exchanged with the controller is:
//! ```text
//! ┌──────────┬────────┬──────────────┐
//! │ Length   │ Type   │ Payload      │
//! │ 4 bytes  │ 1 byte │ Length - 1   │
//! │ uint32 BE│        │              │
//! └──────────┴────────┴──────────────┘
//! ```
//!
//! `Length` counts the type byte plus the payload, so it is never zero.

use crate::error::{AgentError, Result};

/// Length prefix size in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Maximum value of the length prefix (type byte + payload).
pub const MAX_FRAME_SIZE: u32 = 8192;

/// Maximum payload carried by a single frame.
pub const MAX_PAYLOAD_SIZE: usize = MAX_FRAME_SIZE as usize - 1;

/// Offset of the DPP/PKEX sub-type inside a vendor public-action payload
/// (after the 3-byte OUI, the OUI type and the crypto suite).
pub const ACTION_SUBTYPE_OFFSET: usize = 5;

/// Outer frame type codes.
pub mod frame_types {
    /// Vendor-specific public action frame (carries PKEX and DPP auth/discovery).
    pub const PUB_ACTION_VENDOR: u8 = 9;
    /// GAS initial request.
    pub const GAS_INITIAL_REQUEST: u8 = 10;
    /// GAS initial response.
    pub const GAS_INITIAL_RESPONSE: u8 = 11;
    /// GAS comeback request.
    pub const GAS_COMEBACK_REQUEST: u8 = 12;
    /// GAS comeback response.
    pub const GAS_COMEBACK_RESPONSE: u8 = 13;
}

/// DPP and PKEX sub-type codes found inside vendor public-action frames.
pub mod subtypes {
    pub const DPP_AUTH_REQUEST: u8 = 0;
    pub const DPP_AUTH_RESPONSE: u8 = 1;
    pub const DPP_AUTH_CONFIRM: u8 = 2;
    pub const DPP_PEER_DISCOVER_REQ: u8 = 5;
    pub const DPP_PEER_DISCOVER_RESP: u8 = 6;
    pub const PKEX_EXCH_REQ: u8 = 7;
    pub const PKEX_EXCH_RESP: u8 = 8;
    pub const PKEX_COM_REV_REQ: u8 = 9;
    pub const PKEX_COM_REV_RESP: u8 = 10;
}

/// Decoded length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthPrefix {
    /// Number of bytes that follow (type byte + payload).
    pub frame_length: u32,
}

impl LengthPrefix {
    /// Create a prefix for a frame carrying `payload_len` payload bytes.
    pub fn for_payload(payload_len: usize) -> Self {
        Self {
            frame_length: payload_len as u32 + 1,
        }
    }

    /// Encode to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use dpp_agent::protocol::LengthPrefix;
    ///
    /// let prefix = LengthPrefix::for_payload(4);
    /// assert_eq!(prefix.encode(), [0, 0, 0, 5]);
    /// ```
    pub fn encode(&self) -> [u8; LENGTH_PREFIX_SIZE] {
        self.frame_length.to_be_bytes()
    }

    /// Decode from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < LENGTH_PREFIX_SIZE {
            return None;
        }
        Some(Self {
            frame_length: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
        })
    }

    /// Validate the declared length.
    ///
    /// Checks:
    /// - Length is at least 1 (the type byte)
    /// - Length doesn't exceed `max_frame_size`
    pub fn validate(&self, max_frame_size: u32) -> Result<()> {
        if self.frame_length < 1 {
            return Err(AgentError::Protocol(
                "Declared frame length 0 is invalid".to_string(),
            ));
        }

        if self.frame_length > max_frame_size {
            return Err(AgentError::Protocol(format!(
                "Declared frame length {} exceeds maximum {}",
                self.frame_length, max_frame_size
            )));
        }

        Ok(())
    }

    /// Payload length implied by this prefix.
    #[inline]
    pub fn payload_length(&self) -> usize {
        self.frame_length.saturating_sub(1) as usize
    }
}
