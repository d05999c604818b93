//! Transport to the controller.
//!
//! The controller listens on TCP; the agent connects once and never retries.

mod tcp;

pub use tcp::{connect_controller, controller_address, DEFAULT_CONTROLLER_PORT};
