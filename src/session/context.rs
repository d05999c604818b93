//! Context handed to the protocol engine while it processes a frame.
//!
//! The engine calls back into the agent through this context:
//! - `transmit_*` - send a frame to the controller
//! - `save_bootstrap_key` - persist a peer key learned through PKEX
//! - `request_bootstrap` - start DPP against a stored key once the call returns
//! - `register_exchange_session`, `register_authentication_session` - install
//!   a session the engine created on its own (a responder answering a peer)
//! - `session_finished` - publish the result and retire the authentication session
//! - `provision_connector` - publish an issued connector
//! - `change_channel`, `change_frequency` - always acknowledged
//!
//! # Example
//!
//! ```ignore
//! fn process_exchange_frame(
//!     &mut self,
//!     handle: Option<SessionHandle>,
//!     payload: &[u8],
//!     ctx: &mut EngineContext<'_>,
//! ) -> Result<()> {
//!     let reply = self.pkex_reply(handle, payload)?;
//!     ctx.transmit_exchange(&reply)?;
//!     if let Some(peer_key) = self.finished_key() {
//!         let index = ctx.save_bootstrap_key(&peer_key)?;
//!         ctx.request_bootstrap(handle, index, true, true);
//!     }
//!     Ok(())
//! }
//! ```

use tokio::sync::mpsc;

use super::SessionHandle;
use crate::control::{AgentEvent, Ssid};
use crate::dispatch::Transmitter;
use crate::error::Result;
use crate::store::TrustStore;

/// Work the engine asks the agent to do after the current call returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreRequest {
    /// Run the peer bootstrap workflow for `index`.
    Bootstrap {
        exchange: Option<SessionHandle>,
        index: u32,
        initiator: bool,
        mutual: bool,
    },
    /// Make `handle` the active exchange session.
    RegisterExchange(SessionHandle),
    /// Make `handle` the active authentication session.
    RegisterAuthentication(SessionHandle),
    /// Destroy the active authentication session and empty its slot.
    AuthenticationFinished,
}

/// Publishes [`AgentEvent`]s to whoever holds the receiving end.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<AgentEvent>,
}

impl EventSink {
    /// Create a sink and the receiver its events arrive on.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AgentEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Publish an event. Dropped silently if nobody is listening.
    pub fn emit(&self, event: AgentEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("no event listener, dropping agent event");
        }
    }
}

/// Callbacks available to the engine during a single call.
pub struct EngineContext<'a> {
    transmitter: &'a Transmitter,
    trust_store: &'a TrustStore,
    events: &'a EventSink,
    requests: Vec<CoreRequest>,
}

impl<'a> EngineContext<'a> {
    /// Create a context over the agent's transmit path, store and event sink.
    pub fn new(
        transmitter: &'a Transmitter,
        trust_store: &'a TrustStore,
        events: &'a EventSink,
    ) -> Self {
        Self {
            transmitter,
            trust_store,
            events,
            requests: Vec::new(),
        }
    }

    /// Send a GAS frame with the given outer type.
    pub fn transmit_configuration(&self, field: u8, data: &[u8]) -> Result<usize> {
        self.transmitter.transmit_configuration(field, data)
    }

    /// Send a DPP authentication frame.
    pub fn transmit_authentication(&self, data: &[u8]) -> Result<usize> {
        self.transmitter.transmit_authentication(data)
    }

    /// Send a DPP peer discovery frame.
    pub fn transmit_discovery(&self, data: &[u8]) -> Result<usize> {
        self.transmitter.transmit_discovery(data)
    }

    /// Send a PKEX frame.
    pub fn transmit_exchange(&self, data: &[u8]) -> Result<usize> {
        self.transmitter.transmit_exchange(data)
    }

    /// Persist the peer's public key (DER) in the trust store.
    ///
    /// Returns the index the key was stored under.
    pub fn save_bootstrap_key(&self, peer_public_key: &[u8]) -> Result<u32> {
        let saved = self.trust_store.save(peer_public_key)?;
        self.events.emit(AgentEvent::BootstrapKeySaved {
            index: saved.index,
            duplicate_of: saved.duplicate_of,
        });
        Ok(saved.index)
    }

    /// Ask the agent to start DPP against the stored key `index` after this
    /// call returns. If `exchange` is the active PKEX session it is torn down
    /// first.
    pub fn request_bootstrap(
        &mut self,
        exchange: Option<SessionHandle>,
        index: u32,
        initiator: bool,
        mutual: bool,
    ) {
        self.requests.push(CoreRequest::Bootstrap {
            exchange,
            index,
            initiator,
            mutual,
        });
    }

    /// Register an exchange session the engine created itself. Any other
    /// active exchange session is destroyed when the request is applied.
    pub fn register_exchange_session(&mut self, handle: SessionHandle) {
        self.requests.push(CoreRequest::RegisterExchange(handle));
    }

    /// Register an authentication session the engine created itself.
    pub fn register_authentication_session(&mut self, handle: SessionHandle) {
        self.requests.push(CoreRequest::RegisterAuthentication(handle));
    }

    /// The authentication session has concluded. `key` carries the derived
    /// key on success.
    ///
    /// Once the call returns the active authentication session is destroyed
    /// and its slot emptied, so later DPP frames are refused until a new
    /// session is registered.
    pub fn session_finished(&mut self, reason: u16, key: Option<&[u8]>) {
        tracing::info!("session finished, reason {}", reason);
        self.events.emit(AgentEvent::SessionFinished {
            reason,
            key: key.map(<[u8]>::to_vec),
        });
        self.requests.push(CoreRequest::AuthenticationFinished);
    }

    /// A connector was issued for `role` on `ssid` (`*` means any SSID).
    pub fn provision_connector(&self, role: &str, ssid: &[u8], connector: &[u8]) {
        let ssid = Ssid::from_wire(ssid);
        let connector = String::from_utf8_lossy(connector).into_owned();
        tracing::info!("connector for role {} with {}: {}", role, ssid, connector);
        self.events.emit(AgentEvent::ConnectorProvisioned {
            role: role.to_string(),
            ssid,
            connector,
        });
    }

    /// Channel change request. Always acknowledged.
    pub fn change_channel(&self, opclass: u8, channel: u8) -> bool {
        tracing::debug!("channel change to {}/{} acknowledged", opclass, channel);
        self.events
            .emit(AgentEvent::ChannelChange { opclass, channel });
        true
    }

    /// Frequency change request. Always acknowledged.
    pub fn change_frequency(&self, frequency: u32) -> bool {
        tracing::debug!("frequency change to {} acknowledged", frequency);
        self.events.emit(AgentEvent::FrequencyChange { frequency });
        true
    }

    /// Requests queued during this call.
    pub fn into_requests(self) -> Vec<CoreRequest> {
        self.requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame_types;
    use crate::writer::{OutboundFrame, WriterHandle};
    use tempfile::NamedTempFile;

    struct Fixture {
        transmitter: Transmitter,
        outbound: mpsc::Receiver<OutboundFrame>,
        store_file: NamedTempFile,
        events: EventSink,
        event_rx: mpsc::UnboundedReceiver<AgentEvent>,
    }

    fn fixture() -> Fixture {
        let (tx, outbound) = mpsc::channel(16);
        let (events, event_rx) = EventSink::channel();
        Fixture {
            transmitter: Transmitter::new(WriterHandle::from_sender(tx)),
            outbound,
            store_file: NamedTempFile::new().unwrap(),
            events,
            event_rx,
        }
    }

    #[test]
    fn test_transmit_goes_to_writer() {
        let mut f = fixture();
        let store = TrustStore::new(f.store_file.path());
        let ctx = EngineContext::new(&f.transmitter, &store, &f.events);

        assert_eq!(ctx.transmit_exchange(b"pkex").unwrap(), 4);
        assert_eq!(
            ctx.transmit_configuration(frame_types::GAS_INITIAL_RESPONSE, b"cfg")
                .unwrap(),
            3
        );

        let first = f.outbound.try_recv().unwrap();
        assert_eq!(first.frame_type(), frame_types::PUB_ACTION_VENDOR);
        assert_eq!(&first.payload[..], b"pkex");
        let second = f.outbound.try_recv().unwrap();
        assert_eq!(second.frame_type(), frame_types::GAS_INITIAL_RESPONSE);
    }

    #[test]
    fn test_save_bootstrap_key_emits_event() {
        let mut f = fixture();
        let store = TrustStore::new(f.store_file.path());
        let ctx = EngineContext::new(&f.transmitter, &store, &f.events);

        assert_eq!(ctx.save_bootstrap_key(b"peer").unwrap(), 1);

        assert_eq!(
            f.event_rx.try_recv().unwrap(),
            AgentEvent::BootstrapKeySaved {
                index: 1,
                duplicate_of: None
            }
        );
    }

    #[test]
    fn test_request_bootstrap_is_queued() {
        let f = fixture();
        let store = TrustStore::new(f.store_file.path());
        let mut ctx = EngineContext::new(&f.transmitter, &store, &f.events);
        let handle = SessionHandle::new(2);

        ctx.request_bootstrap(handle, 5, true, false);

        assert_eq!(
            ctx.into_requests(),
            vec![CoreRequest::Bootstrap {
                exchange: handle,
                index: 5,
                initiator: true,
                mutual: false,
            }]
        );
    }

    #[test]
    fn test_register_and_finish_are_queued_in_order() {
        let mut f = fixture();
        let store = TrustStore::new(f.store_file.path());
        let mut ctx = EngineContext::new(&f.transmitter, &store, &f.events);
        let exchange = SessionHandle::new(3).unwrap();
        let auth = SessionHandle::new(4).unwrap();

        ctx.register_exchange_session(exchange);
        ctx.register_authentication_session(auth);
        ctx.session_finished(0, None);

        assert_eq!(
            ctx.into_requests(),
            vec![
                CoreRequest::RegisterExchange(exchange),
                CoreRequest::RegisterAuthentication(auth),
                CoreRequest::AuthenticationFinished,
            ]
        );
        assert_eq!(
            f.event_rx.try_recv().unwrap(),
            AgentEvent::SessionFinished {
                reason: 0,
                key: None
            }
        );
    }

    #[test]
    fn test_connector_with_wildcard_ssid() {
        let mut f = fixture();
        let store = TrustStore::new(f.store_file.path());
        let ctx = EngineContext::new(&f.transmitter, &store, &f.events);

        ctx.provision_connector("sta", b"*", b"eyJ0eXAiOiJkcHBDb24ifQ");
        assert!(ctx.change_channel(81, 6));
        assert!(ctx.change_frequency(2437));

        match f.event_rx.try_recv().unwrap() {
            AgentEvent::ConnectorProvisioned { role, ssid, connector } => {
                assert_eq!(role, "sta");
                assert_eq!(ssid, Ssid::Any);
                assert_eq!(connector, "eyJ0eXAiOiJkcHBDb24ifQ");
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(
            f.event_rx.try_recv().unwrap(),
            AgentEvent::ChannelChange {
                opclass: 81,
                channel: 6
            }
        );
    }
}
