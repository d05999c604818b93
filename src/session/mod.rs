//! Session module - handles, the active-session registry, and the context
//! the protocol engine uses to call back into the agent.
//!
//! Provides:
//! - [`SessionHandle`] - opaque token for one in-progress exchange
//! - [`SessionRegistry`] - the single active PKEX and DPP slots
//! - [`EngineContext`] - transmit and persistence callbacks for the engine

mod context;
mod registry;

pub use context::{CoreRequest, EngineContext, EventSink};
pub use registry::SessionRegistry;

use std::fmt;

/// Opaque handle for a session owned by the protocol engine.
///
/// Valid handles are strictly positive. "No session" is represented by
/// `Option<SessionHandle>::None` rather than a sentinel value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(u32);

impl SessionHandle {
    /// Wrap a raw engine handle. Returns `None` for the unset value `0`.
    pub fn new(raw: u32) -> Option<Self> {
        if raw == 0 {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// Raw value as handed out by the engine.
    #[inline]
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The two kinds of session the agent tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// PKEX key exchange.
    Exchange,
    /// DPP authentication and configuration.
    Authentication,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKind::Exchange => f.write_str("PKEX"),
            SessionKind::Authentication => f.write_str("DPP"),
        }
    }
}
