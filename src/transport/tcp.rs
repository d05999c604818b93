//! TCP connection to the controller.
//!
//! # Example
//!
//! ```ignore
//! use dpp_agent::transport::connect_controller;
//!
//! let stream = connect_controller("192.0.2.10").await?; // port 7871
//! ```

use std::net::{IpAddr, SocketAddr};

use tokio::net::TcpStream;

use crate::error::{AgentError, Result};

/// Port the controller listens on when the address does not name one.
pub const DEFAULT_CONTROLLER_PORT: u16 = 7871;

/// Normalize a controller address to `host:port`.
///
/// Accepts `host`, `host:port`, a bare IPv4/IPv6 address or a full socket
/// address.
pub fn controller_address(addr: &str) -> String {
    let addr = addr.trim();
    if addr.parse::<SocketAddr>().is_ok() {
        return addr.to_string();
    }
    if let Ok(ip) = addr.parse::<IpAddr>() {
        return SocketAddr::new(ip, DEFAULT_CONTROLLER_PORT).to_string();
    }
    if addr.contains(':') {
        addr.to_string()
    } else {
        format!("{}:{}", addr, DEFAULT_CONTROLLER_PORT)
    }
}

/// Connect to the controller.
pub async fn connect_controller(addr: &str) -> Result<TcpStream> {
    if addr.trim().is_empty() {
        return Err(AgentError::Config("empty controller address".to_string()));
    }
    let target = controller_address(addr);
    tracing::info!("connecting to controller at {}", target);

    let stream = TcpStream::connect(&target).await.map_err(|e| {
        tracing::error!("unable to connect to controller at {}: {}", target, e);
        AgentError::Io(e)
    })?;
    stream.set_nodelay(true)?;

    tracing::debug!("connected to controller from {}", stream.local_addr()?);
    Ok(stream)
}
