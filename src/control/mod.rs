//! Control plane module - agent events and stdio output.
//!
//! The agent's binary protocol traffic only flows to the controller. Results
//! meant for the local system (provisioned connectors, derived keys, trusted
//! peer keys) are published as [`AgentEvent`]s and, when the agent runs under
//! a supervisor, written to stdout as JSON lines.

mod events;
mod stdio;

pub use events::{build_event_message, AgentEvent, Ssid};
pub use stdio::{write_stdout_event, write_stdout_line};
