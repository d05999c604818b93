//! Registry of the currently active sessions.
//!
//! The agent runs at most one PKEX exchange and at most one DPP
//! authentication at a time. Installing a new handle in a slot that already
//! holds a different one tears the old session down first, through the
//! `destroy` callback supplied by the caller (normally the engine's destroy
//! operation).
//!
//! # Example
//!
//! ```
//! use dpp_agent::session::{SessionHandle, SessionRegistry};
//!
//! let mut registry = SessionRegistry::new();
//! let mut destroyed = Vec::new();
//!
//! registry.set_authentication_session(SessionHandle::new(1).unwrap(), |old| destroyed.push(old));
//! registry.set_authentication_session(SessionHandle::new(2).unwrap(), |old| destroyed.push(old));
//!
//! assert_eq!(destroyed, vec![SessionHandle::new(1).unwrap()]);
//! assert_eq!(registry.current_authentication_session(), SessionHandle::new(2));
//! ```

use super::{SessionHandle, SessionKind};

/// Holds the active exchange and authentication handles.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    exchange: Option<SessionHandle>,
    authentication: Option<SessionHandle>,
}

impl SessionRegistry {
    /// Create a registry with both slots empty.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handle` as the active authentication session.
    ///
    /// A different handle already in the slot is passed to `destroy` before
    /// `handle` becomes current. Re-installing the current handle is a no-op.
    pub fn set_authentication_session<F>(&mut self, handle: SessionHandle, destroy: F)
    where
        F: FnOnce(SessionHandle),
    {
        Self::replace(
            &mut self.authentication,
            SessionKind::Authentication,
            handle,
            destroy,
        );
    }

    /// Install `handle` as the active exchange session.
    ///
    /// Same replacement rules as [`set_authentication_session`](Self::set_authentication_session).
    pub fn set_exchange_session<F>(&mut self, handle: SessionHandle, destroy: F)
    where
        F: FnOnce(SessionHandle),
    {
        Self::replace(&mut self.exchange, SessionKind::Exchange, handle, destroy);
    }

    /// Active authentication session, if any.
    #[inline]
    pub fn current_authentication_session(&self) -> Option<SessionHandle> {
        self.authentication
    }

    /// Active exchange session, if any.
    #[inline]
    pub fn current_exchange_session(&self) -> Option<SessionHandle> {
        self.exchange
    }

    /// Empty the exchange slot and return what it held. Does not destroy.
    pub fn take_exchange_session(&mut self) -> Option<SessionHandle> {
        self.exchange.take()
    }

    /// Empty the authentication slot and return what it held. Does not destroy.
    pub fn take_authentication_session(&mut self) -> Option<SessionHandle> {
        self.authentication.take()
    }

    fn replace<F>(
        slot: &mut Option<SessionHandle>,
        kind: SessionKind,
        handle: SessionHandle,
        destroy: F,
    ) where
        F: FnOnce(SessionHandle),
    {
        match *slot {
            Some(old) if old == handle => {
                tracing::debug!("{} session {} already active", kind, handle);
            }
            Some(old) => {
                tracing::info!("replacing {} session {} with {}", kind, old, handle);
                destroy(old);
                *slot = Some(handle);
            }
            None => {
                tracing::debug!("{} session {} is now active", kind, handle);
                *slot = Some(handle);
            }
        }
    }
}
