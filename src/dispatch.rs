//! Inbound frame routing and the outbound transmit path.
//!
//! [`FrameDispatcher`] owns the protocol engine and the agent state. Each
//! reassembled frame is classified and handed to the engine together with the
//! session it belongs to:
//!
//! | Frame | Needs | Engine call |
//! |---|---|---|
//! | DPP auth request/response/confirm | authentication session | `process_authentication_frame` |
//! | DPP peer discovery | - | ignored |
//! | PKEX exchange / commit-reveal | nothing (warns when unset) | `process_exchange_frame` |
//! | GAS initial/comeback | authentication session | `process_configuration_frame` |
//!
//! Unroutable frames produce [`AgentError::Routing`]; the frame is dropped and
//! the link is not affected.

use bytes::Bytes;

use crate::config::ExchangeConfig;
use crate::engine::ProtocolEngine;
use crate::error::{AgentError, Result};
use crate::protocol::{frame_types, ActionSubtype, Frame, FrameKind};
use crate::session::{CoreRequest, EngineContext, EventSink, SessionHandle, SessionRegistry};
use crate::store::TrustStore;
use crate::writer::{OutboundFrame, WriterHandle};

/// Sends frames to the controller through the writer task.
///
/// Every transmit returns the number of payload bytes queued. Failure means
/// the link is dead ([`AgentError::ConnectionClosed`]) or the write queue is
/// full ([`AgentError::QueueFull`], frame dropped, link unaffected).
#[derive(Clone)]
pub struct Transmitter {
    writer: WriterHandle,
}

impl Transmitter {
    pub fn new(writer: WriterHandle) -> Self {
        Self { writer }
    }

    /// Queue one frame of `frame_type`.
    pub fn send(&self, frame_type: u8, payload: &[u8]) -> Result<usize> {
        let frame = OutboundFrame::new(frame_type, Bytes::copy_from_slice(payload))?;
        self.writer.try_send(frame)?;
        tracing::trace!("queued {} byte frame of type {}", payload.len(), frame_type);
        Ok(payload.len())
    }

    /// GAS frame; `field` is the outer type chosen by the engine.
    pub fn transmit_configuration(&self, field: u8, data: &[u8]) -> Result<usize> {
        self.send(field, data)
    }

    pub fn transmit_authentication(&self, data: &[u8]) -> Result<usize> {
        self.send(frame_types::PUB_ACTION_VENDOR, data)
    }

    pub fn transmit_discovery(&self, data: &[u8]) -> Result<usize> {
        self.send(frame_types::PUB_ACTION_VENDOR, data)
    }

    pub fn transmit_exchange(&self, data: &[u8]) -> Result<usize> {
        self.send(frame_types::PUB_ACTION_VENDOR, data)
    }

    /// Wait for room in the write queue.
    pub async fn wait_for_capacity(&self) -> Result<()> {
        self.writer.wait_for_capacity().await
    }

    /// Whether the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.writer.is_closed()
    }
}

/// Everything the agent owns apart from the engine and the link.
pub struct AgentState {
    pub registry: SessionRegistry,
    pub trust_store: TrustStore,
    pub transmitter: Transmitter,
    pub events: EventSink,
}

impl AgentState {
    pub fn new(trust_store: TrustStore, transmitter: Transmitter, events: EventSink) -> Self {
        Self {
            registry: SessionRegistry::new(),
            trust_store,
            transmitter,
            events,
        }
    }
}

/// Routes inbound frames to the engine.
pub struct FrameDispatcher<E> {
    engine: E,
    state: AgentState,
}

impl<E: ProtocolEngine> FrameDispatcher<E> {
    pub fn new(engine: E, state: AgentState) -> Self {
        Self { engine, state }
    }

    /// Route one inbound frame.
    pub fn dispatch(&mut self, frame: &Frame) -> Result<()> {
        let payload = frame.payload();

        match frame.kind() {
            FrameKind::VendorAction(
                subtype @ (ActionSubtype::AuthRequest
                | ActionSubtype::AuthResponse
                | ActionSubtype::AuthConfirm),
            ) => {
                let handle = self.state.registry.current_authentication_session().ok_or_else(
                    || {
                        AgentError::Routing(format!(
                            "{:?} with no DPP session, dropping frame",
                            subtype
                        ))
                    },
                )?;
                tracing::debug!("{:?} for DPP session {}", subtype, handle);
                self.with_engine(|engine, ctx| {
                    engine.process_authentication_frame(handle, payload, ctx)
                })
            }
            FrameKind::VendorAction(
                ActionSubtype::PeerDiscoveryRequest | ActionSubtype::PeerDiscoveryResponse,
            ) => {
                tracing::debug!("ignoring DPP peer discovery frame");
                Ok(())
            }
            FrameKind::VendorAction(
                subtype @ (ActionSubtype::PkexExchangeRequest
                | ActionSubtype::PkexExchangeResponse
                | ActionSubtype::PkexCommitRevealRequest
                | ActionSubtype::PkexCommitRevealResponse),
            ) => {
                let handle = self.state.registry.current_exchange_session();
                match handle {
                    Some(handle) => tracing::debug!("{:?} for PKEX session {}", subtype, handle),
                    None => tracing::warn!("{:?} with no PKEX session, passing on anyway", subtype),
                }
                self.with_engine(|engine, ctx| engine.process_exchange_frame(handle, payload, ctx))
            }
            FrameKind::VendorAction(ActionSubtype::Unknown(code)) => {
                let reason = match code {
                    Some(code) => format!("unknown DPP frame subtype {}", code),
                    None => format!("vendor action frame too short ({} bytes)", payload.len()),
                };
                Err(AgentError::Routing(reason))
            }
            FrameKind::Gas(kind) => {
                let handle = self
                    .state
                    .registry
                    .current_authentication_session()
                    .ok_or_else(|| {
                        AgentError::Routing(format!(
                            "GAS frame {} with no DPP session, dropping frame",
                            kind.code()
                        ))
                    })?;
                tracing::debug!("GAS frame {} for DPP session {}", kind.code(), handle);
                self.with_engine(|engine, ctx| {
                    engine.process_configuration_frame(kind, handle, payload, ctx)
                })
            }
            FrameKind::Unknown(frame_type) => {
                tracing::info!("dropping frame of unknown type {}", frame_type);
                Ok(())
            }
        }
    }

    /// Start DPP against the stored key `index`.
    ///
    /// If `exchange` is the active PKEX session it is destroyed first. The new
    /// authentication session replaces (and destroys) any previous one.
    pub fn bootstrap_peer(
        &mut self,
        exchange: Option<SessionHandle>,
        index: u32,
        initiator: bool,
        mutual: bool,
    ) -> Result<SessionHandle> {
        if let Some(exchange) = exchange {
            if self.state.registry.current_exchange_session() == Some(exchange) {
                tracing::debug!("PKEX session {} done, tearing it down", exchange);
                self.state.registry.take_exchange_session();
                self.engine.destroy_exchange_session(exchange);
            }
        }

        let record = self.state.trust_store.lookup(index)?;
        tracing::info!(
            "bootstrapping peer {} ({}, opclass {}, channel {})",
            index,
            record.mac,
            record.opclass,
            record.channel
        );

        let handle = self
            .engine
            .create_authentication_session(&record.key_b64, initiator, mutual)?;

        let engine = &mut self.engine;
        self.state
            .registry
            .set_authentication_session(handle, |old| engine.destroy_authentication_session(old));
        Ok(handle)
    }

    /// Create a PKEX session, make it current and send the first frame.
    pub fn start_exchange(&mut self, config: &ExchangeConfig) -> Result<SessionHandle> {
        let handle = self.engine.create_exchange_session(config)?;
        tracing::info!(
            "starting PKEX session {} (identifier {:?})",
            handle,
            config.identifier
        );

        let engine = &mut self.engine;
        self.state
            .registry
            .set_exchange_session(handle, |old| engine.destroy_exchange_session(old));

        self.with_engine(|engine, ctx| engine.initiate_exchange(handle, ctx))?;
        Ok(handle)
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.state.registry
    }

    pub fn trust_store(&self) -> &TrustStore {
        &self.state.trust_store
    }

    /// Run an engine call with a fresh context, then apply whatever the engine
    /// queued. The engine's own error wins over a failed request.
    fn with_engine<F>(&mut self, call: F) -> Result<()>
    where
        F: FnOnce(&mut E, &mut EngineContext<'_>) -> Result<()>,
    {
        let mut ctx = EngineContext::new(
            &self.state.transmitter,
            &self.state.trust_store,
            &self.state.events,
        );
        let result = call(&mut self.engine, &mut ctx);
        let requests = ctx.into_requests();

        let applied = self.apply_requests(requests);
        result.and(applied)
    }

    fn apply_requests(&mut self, requests: Vec<CoreRequest>) -> Result<()> {
        for request in requests {
            match request {
                CoreRequest::Bootstrap {
                    exchange,
                    index,
                    initiator,
                    mutual,
                } => {
                    self.bootstrap_peer(exchange, index, initiator, mutual)?;
                }
                CoreRequest::RegisterExchange(handle) => {
                    let engine = &mut self.engine;
                    self.state
                        .registry
                        .set_exchange_session(handle, |old| engine.destroy_exchange_session(old));
                }
                CoreRequest::RegisterAuthentication(handle) => {
                    let engine = &mut self.engine;
                    self.state.registry.set_authentication_session(handle, |old| {
                        engine.destroy_authentication_session(old)
                    });
                }
                CoreRequest::AuthenticationFinished => {
                    if let Some(handle) = self.state.registry.take_authentication_session() {
                        tracing::debug!("DPP session {} finished, tearing it down", handle);
                        self.engine.destroy_authentication_session(handle);
                    }
                }
            }
        }
        Ok(())
    }
}
