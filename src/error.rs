//! Error types for dpp-agent.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for all agent operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// I/O error on the controller connection. Fatal to the link.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed frame from the controller (bad length prefix). Fatal to the link.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Frame could not be routed to a session. The frame is dropped, the link stays up.
    #[error("Routing error: {0}")]
    Routing(String),

    /// Trust store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The protocol engine rejected an operation.
    #[error("Engine error: {0}")]
    Engine(String),

    /// Outbound payload does not fit in one frame. Nothing was sent.
    #[error("Payload of {0} bytes is too large for one frame")]
    PayloadTooLarge(usize),

    /// The outbound queue is full. The frame was not sent; the link is fine.
    #[error("Controller write queue is full")]
    QueueFull,

    /// Invalid agent configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection closed (EOF from the controller or writer task gone).
    #[error("Connection closed")]
    ConnectionClosed,
}

impl AgentError {
    /// Whether this error ends the controller link.
    ///
    /// Only connection-level failures do; routing, engine and store errors
    /// are absorbed by the read loop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AgentError::Io(_) | AgentError::Protocol(_) | AgentError::ConnectionClosed
        )
    }
}

/// Trust store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The bootstrap file could not be opened.
    #[error("unable to open bootstrap file {}: {source}", path.display())]
    Unavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No record carries the requested index.
    #[error("no bootstrap key with index {0}")]
    NotFound(u32),

    /// Every index is taken.
    #[error("bootstrap file has no index left after {0}")]
    IndexExhausted(u32),

    /// Read or write failure after the file was opened.
    #[error("bootstrap file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using AgentError.
pub type Result<T> = std::result::Result<T, AgentError>;
