//! # dpp-agent
//!
//! Device-side agent for DPP provisioning through a central controller.
//!
//! The agent keeps one TCP connection to the controller, reassembles the
//! length-prefixed frames it sends, and routes each one to the active PKEX or
//! DPP session of a pluggable [`ProtocolEngine`]. Peer bootstrap keys learned
//! through PKEX are kept in an append-only text [trust store](store).
//!
//! ## Architecture
//!
//! - **Data plane** (TCP): `u32_be(len) ‖ type ‖ payload` frames to and from
//!   the controller
//! - **Control plane** (stdout): engine results as JSON event lines
//!
//! ## Example
//!
//! ```ignore
//! use dpp_agent::Agent;
//!
//! #[tokio::main]
//! async fn main() -> dpp_agent::Result<()> {
//!     let mut agent = Agent::builder()
//!         .controller("192.0.2.10")
//!         .bootstrap_file("bootstrap.txt")
//!         .bootstrap_index(1)
//!         .connect(MyEngine::new())
//!         .await?;
//!
//!     agent.run().await
//! }
//! ```

pub mod config;
pub mod control;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod link;
pub mod protocol;
pub mod session;
pub mod store;
pub mod transport;
pub mod writer;

mod agent;

pub use agent::{Agent, AgentBuilder};
pub use config::{AgentConfig, ExchangeConfig, Role};
pub use control::AgentEvent;
pub use engine::ProtocolEngine;
pub use error::{AgentError, Result, StoreError};
pub use session::{EngineContext, SessionHandle};
pub use store::{BootstrapRecord, TrustStore};
