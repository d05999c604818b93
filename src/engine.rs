//! Interface to the PKEX/DPP protocol engine.
//!
//! The agent never looks inside a session: it creates, destroys and feeds
//! sessions through this trait, and the engine answers through the
//! [`EngineContext`] passed to every processing call.

use crate::config::ExchangeConfig;
use crate::error::Result;
use crate::protocol::GasKind;
use crate::session::{EngineContext, SessionHandle};

/// The cryptographic handshake engine.
///
/// Processing calls run to completion on the agent's loop; they should not
/// block.
pub trait ProtocolEngine {
    /// Create a PKEX session from the shared code and optional identifier/info.
    fn create_exchange_session(&mut self, config: &ExchangeConfig) -> Result<SessionHandle>;

    /// Send the first PKEX frame for `handle`.
    fn initiate_exchange(&mut self, handle: SessionHandle, ctx: &mut EngineContext<'_>)
        -> Result<()>;

    /// Tear down a PKEX session.
    fn destroy_exchange_session(&mut self, handle: SessionHandle);

    /// Process an inbound PKEX frame.
    ///
    /// `handle` is `None` when no exchange session has been created yet; a
    /// responder creates its session from the first frame.
    fn process_exchange_frame(
        &mut self,
        handle: Option<SessionHandle>,
        payload: &[u8],
        ctx: &mut EngineContext<'_>,
    ) -> Result<()>;

    /// Create a DPP session against the peer's base64 bootstrap key.
    fn create_authentication_session(
        &mut self,
        peer_key_b64: &str,
        initiator: bool,
        mutual: bool,
    ) -> Result<SessionHandle>;

    /// Tear down a DPP session.
    fn destroy_authentication_session(&mut self, handle: SessionHandle);

    /// Process an inbound DPP authentication frame.
    fn process_authentication_frame(
        &mut self,
        handle: SessionHandle,
        payload: &[u8],
        ctx: &mut EngineContext<'_>,
    ) -> Result<()>;

    /// Process an inbound DPP configuration (GAS) frame.
    fn process_configuration_frame(
        &mut self,
        kind: GasKind,
        handle: SessionHandle,
        payload: &[u8],
        ctx: &mut EngineContext<'_>,
    ) -> Result<()>;
}
