//! Stdio output for agent events.
//!
//! # Important
//!
//! - **stdout**: JSON-RPC notifications (one per line)
//! - **stderr**: Logs (not parsed by the supervisor)
//! - **Never use `println!`**: It may add `\r\n` on Windows

use std::io::Write;

use super::{build_event_message, AgentEvent};

/// Write a line to stdout.
///
/// Writes the string followed by a single `\n` and flushes.
pub fn write_stdout_line(line: &str) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    handle.write_all(line.as_bytes())?;
    handle.write_all(b"\n")?;
    handle.flush()?;
    Ok(())
}

/// Write an agent event to stdout as a single JSON line.
pub fn write_stdout_event(event: &AgentEvent) -> std::io::Result<()> {
    write_stdout_line(&build_event_message(event))
}
