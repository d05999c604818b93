//! Agent builder and runtime loop.
//!
//! The [`AgentBuilder`] collects the configuration. Starting the agent:
//! 1. Validate the configuration
//! 2. Connect to the controller (or wrap a given stream)
//! 3. Spawn the writer task
//! 4. Start PKEX, or bootstrap DPP against a stored peer key
//!
//! after which [`Agent::run`] reads and dispatches frames until the link dies.
//!
//! # Example
//!
//! ```ignore
//! use dpp_agent::Agent;
//!
//! #[tokio::main]
//! async fn main() -> dpp_agent::Result<()> {
//!     let mut agent = Agent::builder()
//!         .controller("192.0.2.10")
//!         .bootstrap_file("/etc/dpp/bootstrap.txt")
//!         .exchange_password("hunter2")
//!         .connect(MyEngine::new())
//!         .await?;
//!
//!     let mut events = agent.take_events().unwrap();
//!     tokio::spawn(async move {
//!         while let Some(event) = events.recv().await {
//!             println!("{:?}", event);
//!         }
//!     });
//!
//!     agent.run().await
//! }
//! ```

use std::path::PathBuf;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::config::{AgentConfig, ExchangeConfig, Role};
use crate::control::AgentEvent;
use crate::dispatch::{AgentState, FrameDispatcher};
use crate::engine::ProtocolEngine;
use crate::error::{AgentError, Result};
use crate::link::ControllerLink;
use crate::protocol::Frame;
use crate::session::{EventSink, SessionHandle, SessionRegistry};
use crate::store::TrustStore;
use crate::transport::connect_controller;
use crate::writer::WriterConfig;

/// Builder for configuring and starting an [`Agent`].
#[derive(Debug, Clone, Default)]
pub struct AgentBuilder {
    config: AgentConfig,
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration, e.g. one loaded from JSON.
    pub fn from_config(config: AgentConfig) -> Self {
        Self { config }
    }

    /// Controller address, `host` or `host:port` (default port 7871).
    pub fn controller(mut self, addr: impl Into<String>) -> Self {
        self.config.controller = addr.into();
        self
    }

    /// Peer bootstrap key file. Must exist.
    pub fn bootstrap_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.bootstrap_file = path.into();
        self
    }

    pub fn key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.key_file = Some(path.into());
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.config.role = role;
        self
    }

    /// Mutual authentication. Default: on.
    pub fn mutual(mut self, mutual: bool) -> Self {
        self.config.mutual = mutual;
        self
    }

    /// Run PKEX with this shared code before DPP.
    pub fn exchange_password(mut self, password: impl Into<String>) -> Self {
        match self.config.exchange.as_mut() {
            Some(exchange) => exchange.password = password.into(),
            None => self.config.exchange = Some(ExchangeConfig::new(password)),
        }
        self
    }

    /// PKEX code identifier. Ignored unless a password is set.
    pub fn exchange_identifier(mut self, identifier: impl Into<String>) -> Self {
        if let Some(exchange) = self.config.exchange.as_mut() {
            exchange.identifier = Some(identifier.into());
        }
        self
    }

    /// Index of the stored peer key to authenticate against without PKEX.
    pub fn bootstrap_index(mut self, index: u32) -> Self {
        self.config.bootstrap_index = index;
        self
    }

    /// Largest inbound frame. Default: 8192.
    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Outbound queue depth. Default: 256.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Connect to the controller over TCP and start.
    pub async fn connect<E: ProtocolEngine>(self, engine: E) -> Result<Agent<TcpStream, E>> {
        self.config.validate()?;
        let stream = connect_controller(&self.config.controller).await?;
        self.start_with_stream(stream, engine)
    }

    /// Start over an already connected stream.
    ///
    /// Runs PKEX initiation or the peer bootstrap before returning; either
    /// failing aborts startup.
    pub fn start_with_stream<S, E>(self, stream: S, engine: E) -> Result<Agent<S, E>>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
        E: ProtocolEngine,
    {
        self.config.validate()?;
        let config = self.config;

        let link = ControllerLink::with_limits(
            stream,
            config.max_frame_size,
            WriterConfig {
                channel_capacity: config.channel_capacity,
            },
        );
        let (events, events_rx) = EventSink::channel();
        let state = AgentState::new(
            TrustStore::new(&config.bootstrap_file),
            link.transmitter(),
            events,
        );
        let mut dispatcher = FrameDispatcher::new(engine, state);

        match &config.exchange {
            Some(exchange) => {
                dispatcher.start_exchange(exchange)?;
            }
            None => {
                dispatcher.bootstrap_peer(None, config.bootstrap_index, true, config.mutual)?;
            }
        }

        Ok(Agent {
            link,
            dispatcher,
            events: Some(events_rx),
        })
    }
}

/// A running agent: one controller link, one engine.
pub struct Agent<S, E> {
    link: ControllerLink<S>,
    dispatcher: FrameDispatcher<E>,
    events: Option<mpsc::UnboundedReceiver<AgentEvent>>,
}

impl Agent<TcpStream, ()> {
    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }
}

impl<S, E> Agent<S, E>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    E: ProtocolEngine,
{
    /// Receiver for engine-reported events. Available once.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<AgentEvent>> {
        self.events.take()
    }

    /// Wait for the next batch of complete frames.
    pub async fn read_frames(&mut self) -> Result<Vec<Frame>> {
        self.link.on_readable().await
    }

    /// Route one frame.
    pub fn dispatch(&mut self, frame: &Frame) -> Result<()> {
        self.dispatcher.dispatch(frame)
    }

    /// Start DPP against the stored key `index`.
    pub fn bootstrap_peer(
        &mut self,
        exchange: Option<SessionHandle>,
        index: u32,
        initiator: bool,
        mutual: bool,
    ) -> Result<SessionHandle> {
        self.dispatcher
            .bootstrap_peer(exchange, index, initiator, mutual)
    }

    /// Read and dispatch until the controller goes away.
    ///
    /// Routing, engine and store errors are logged and the frame dropped.
    /// Between frames the loop waits for room in the write queue, so a burst
    /// of inbound frames cannot overrun it.
    /// Returns `Ok` when the controller closes the connection cleanly.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            let frames = match self.link.on_readable().await {
                Ok(frames) => frames,
                Err(AgentError::ConnectionClosed) => {
                    tracing::info!("controller closed the connection");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            for frame in &frames {
                match self.dispatcher.dispatch(frame) {
                    Ok(()) => {}
                    Err(e) if e.is_fatal() => {
                        tracing::error!("fatal error processing frame: {}", e);
                        self.link.close();
                        return Err(e);
                    }
                    Err(e) => {
                        tracing::warn!(
                            "dropping frame of type {} ({} bytes): {}",
                            frame.frame_type,
                            frame.payload_len(),
                            e
                        );
                    }
                }

                // let the writer drain before the engine transmits again
                if let Err(e) = self.link.wait_for_capacity().await {
                    tracing::error!("controller writer is gone: {}", e);
                    self.link.close();
                    return Err(e);
                }
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.link.is_closed()
    }

    pub fn registry(&self) -> &SessionRegistry {
        self.dispatcher.registry()
    }

    pub fn engine(&self) -> &E {
        self.dispatcher.engine()
    }

    pub fn engine_mut(&mut self) -> &mut E {
        self.dispatcher.engine_mut()
    }

    pub fn trust_store(&self) -> &TrustStore {
        self.dispatcher.trust_store()
    }
}
