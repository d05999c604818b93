//! Frame struct and classification.
//!
//! A [`Frame`] is one reassembled message from the controller: the outer type
//! byte and its payload. [`Frame::kind`] classifies it into a [`FrameKind`]
//! the dispatcher can match on.
//!
//! # Example
//!
//! ```
//! use dpp_agent::protocol::{frame_types, subtypes, Frame, FrameKind, ActionSubtype};
//! use bytes::Bytes;
//!
//! let payload = Bytes::from_static(&[0x50, 0x6f, 0x9a, 0x1a, 0x01, subtypes::DPP_AUTH_REQUEST]);
//! let frame = Frame::new(frame_types::PUB_ACTION_VENDOR, payload);
//!
//! assert_eq!(frame.kind(), FrameKind::VendorAction(ActionSubtype::AuthRequest));
//! ```

use bytes::Bytes;

use super::wire_format::{
    frame_types, subtypes, LengthPrefix, ACTION_SUBTYPE_OFFSET, LENGTH_PREFIX_SIZE,
};

/// A complete frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Outer frame type byte.
    pub frame_type: u8,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from type and payload.
    pub fn new(frame_type: u8, payload: Bytes) -> Self {
        Self {
            frame_type,
            payload,
        }
    }

    /// Create a frame from type and raw bytes (copies data).
    #[cfg(test)]
    pub(crate) fn from_parts(frame_type: u8, payload: &[u8]) -> Self {
        Self {
            frame_type,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Classify this frame.
    pub fn kind(&self) -> FrameKind {
        FrameKind::classify(self.frame_type, &self.payload)
    }
}

/// GAS (configuration protocol) frame variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasKind {
    InitialRequest,
    InitialResponse,
    ComebackRequest,
    ComebackResponse,
}

impl GasKind {
    /// Wire value of this GAS frame type.
    pub fn code(self) -> u8 {
        match self {
            GasKind::InitialRequest => frame_types::GAS_INITIAL_REQUEST,
            GasKind::InitialResponse => frame_types::GAS_INITIAL_RESPONSE,
            GasKind::ComebackRequest => frame_types::GAS_COMEBACK_REQUEST,
            GasKind::ComebackResponse => frame_types::GAS_COMEBACK_RESPONSE,
        }
    }
}

/// Sub-type carried inside a vendor public-action frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionSubtype {
    AuthRequest,
    AuthResponse,
    AuthConfirm,
    PeerDiscoveryRequest,
    PeerDiscoveryResponse,
    PkexExchangeRequest,
    PkexExchangeResponse,
    PkexCommitRevealRequest,
    PkexCommitRevealResponse,
    /// Unrecognized sub-type, or a payload too short to carry one.
    Unknown(Option<u8>),
}

impl ActionSubtype {
    /// Read the sub-type field of a vendor public-action payload.
    pub fn from_payload(payload: &[u8]) -> Self {
        match payload.get(ACTION_SUBTYPE_OFFSET) {
            Some(&code) => Self::from_code(code),
            None => ActionSubtype::Unknown(None),
        }
    }

    fn from_code(code: u8) -> Self {
        match code {
            subtypes::DPP_AUTH_REQUEST => ActionSubtype::AuthRequest,
            subtypes::DPP_AUTH_RESPONSE => ActionSubtype::AuthResponse,
            subtypes::DPP_AUTH_CONFIRM => ActionSubtype::AuthConfirm,
            subtypes::DPP_PEER_DISCOVER_REQ => ActionSubtype::PeerDiscoveryRequest,
            subtypes::DPP_PEER_DISCOVER_RESP => ActionSubtype::PeerDiscoveryResponse,
            subtypes::PKEX_EXCH_REQ => ActionSubtype::PkexExchangeRequest,
            subtypes::PKEX_EXCH_RESP => ActionSubtype::PkexExchangeResponse,
            subtypes::PKEX_COM_REV_REQ => ActionSubtype::PkexCommitRevealRequest,
            subtypes::PKEX_COM_REV_RESP => ActionSubtype::PkexCommitRevealResponse,
            other => ActionSubtype::Unknown(Some(other)),
        }
    }

    /// DPP authentication request/response/confirm.
    #[inline]
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            ActionSubtype::AuthRequest | ActionSubtype::AuthResponse | ActionSubtype::AuthConfirm
        )
    }

    /// PKEX exchange or commit-reveal.
    #[inline]
    pub fn is_exchange(&self) -> bool {
        matches!(
            self,
            ActionSubtype::PkexExchangeRequest
                | ActionSubtype::PkexExchangeResponse
                | ActionSubtype::PkexCommitRevealRequest
                | ActionSubtype::PkexCommitRevealResponse
        )
    }
}

/// Classification of an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Vendor public action, further split by sub-type.
    VendorAction(ActionSubtype),
    /// DPP configuration protocol over GAS.
    Gas(GasKind),
    /// Any other outer type.
    Unknown(u8),
}

impl FrameKind {
    /// Classify an outer type byte and its payload.
    pub fn classify(frame_type: u8, payload: &[u8]) -> Self {
        match frame_type {
            frame_types::PUB_ACTION_VENDOR => {
                FrameKind::VendorAction(ActionSubtype::from_payload(payload))
            }
            frame_types::GAS_INITIAL_REQUEST => FrameKind::Gas(GasKind::InitialRequest),
            frame_types::GAS_INITIAL_RESPONSE => FrameKind::Gas(GasKind::InitialResponse),
            frame_types::GAS_COMEBACK_REQUEST => FrameKind::Gas(GasKind::ComebackRequest),
            frame_types::GAS_COMEBACK_RESPONSE => FrameKind::Gas(GasKind::ComebackResponse),
            other => FrameKind::Unknown(other),
        }
    }
}

/// Build a complete frame as a single byte vector.
///
/// # Example
///
/// ```
/// use dpp_agent::protocol::{build_frame, frame_types};
///
/// let bytes = build_frame(frame_types::PUB_ACTION_VENDOR, b"hello");
/// assert_eq!(&bytes[..4], &[0, 0, 0, 6]);
/// assert_eq!(bytes[4], frame_types::PUB_ACTION_VENDOR);
/// assert_eq!(&bytes[5..], b"hello");
/// ```
pub fn build_frame(frame_type: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + 1 + payload.len());
    buf.extend_from_slice(&LengthPrefix::for_payload(payload.len()).encode());
    buf.push(frame_type);
    buf.extend_from_slice(payload);
    buf
}
