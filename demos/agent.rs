//! DPP device agent - command line front end.
//!
//! This example demonstrates:
//! - Building an agent from command line options or a JSON config file
//! - Plugging in a protocol engine
//! - Forwarding agent events to stdout as JSON lines
//!
//! The engine here only logs what it is given; a real deployment plugs in an
//! engine that implements the PKEX and DPP handshakes.
//!
//! ```text
//! cargo run --example agent -- -C 192.0.2.10 -B bootstrap.txt -p hunter2 -e sta
//! cargo run --example agent -- -C 192.0.2.10 -B bootstrap.txt -x 3 -a
//! ```

use std::path::PathBuf;

use clap::Parser;
use dpp_agent::control::write_stdout_event;
use dpp_agent::protocol::GasKind;
use dpp_agent::{
    AgentBuilder, AgentConfig, EngineContext, ExchangeConfig, ProtocolEngine, Result, Role,
    SessionHandle,
};
use tracing_subscriber::EnvFilter;

/// Device side of DPP, talking to the radio through a controller.
#[derive(Parser, Debug)]
#[command(name = "dpp-agent")]
struct Args {
    /// Controller to whom DPP frames are sent
    #[arg(short = 'C', long)]
    controller: Option<String>,

    /// File of peer bootstrapping keys
    #[arg(short = 'B', long)]
    bootstrap_file: Option<PathBuf>,

    /// Run DPP as the configurator, signing connectors with this key
    #[arg(short = 'c', long, conflicts_with = "enrollee")]
    configurator: Option<PathBuf>,

    /// Run DPP as the enrollee in this role (sta or ap)
    #[arg(short = 'e', long)]
    enrollee: Option<String>,

    /// Key file for our own key
    #[arg(short = 'k', long)]
    key_file: Option<PathBuf>,

    /// PKEX password
    #[arg(short = 'p', long)]
    password: Option<String>,

    /// Identifier for the code used in PKEX
    #[arg(short = 'n', long)]
    identifier: Option<String>,

    /// Info to pass along with the public key in PKEX
    #[arg(short = 'z', long)]
    info: Option<String>,

    /// Non-mutual authentication
    #[arg(short = 'a', long)]
    non_mutual: bool,

    /// Index into the bootstrapping key file
    #[arg(short = 'x', long, default_value_t = 0)]
    index: u32,

    /// URL of a MUD file (enrollee only)
    #[arg(short = 'u', long)]
    mud_url: Option<String>,

    /// Debug level: 0 info, 1 debug, 2 and up trace. RUST_LOG overrides.
    #[arg(short = 'd', long, default_value_t = 0)]
    debug: u8,

    /// Load the whole configuration from a JSON file instead
    #[arg(long, conflicts_with_all = ["controller", "bootstrap_file", "password", "index"])]
    config: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> Result<AgentConfig> {
        if let Some(path) = &self.config {
            return AgentConfig::from_json_file(path);
        }

        let role = match (self.configurator, self.enrollee) {
            (Some(sign_key_file), _) => Role::Configurator { sign_key_file },
            (None, Some(network_role)) => Role::Enrollee {
                network_role,
                mud_url: self.mud_url,
            },
            (None, None) => Role::default(),
        };
        let exchange = self.password.map(|password| ExchangeConfig {
            password,
            identifier: self.identifier,
            info: self.info,
        });

        Ok(AgentConfig {
            controller: self.controller.unwrap_or_default(),
            bootstrap_file: self.bootstrap_file.unwrap_or_default(),
            key_file: self.key_file,
            role,
            mutual: !self.non_mutual,
            exchange,
            bootstrap_index: self.index,
            ..AgentConfig::default()
        })
    }
}

/// Hands out handles and logs every frame.
#[derive(Default)]
struct LoggingEngine {
    next_handle: u32,
}

impl LoggingEngine {
    fn handle(&mut self) -> SessionHandle {
        self.next_handle += 1;
        SessionHandle::new(self.next_handle).expect("handles start at 1")
    }
}

impl ProtocolEngine for LoggingEngine {
    fn create_exchange_session(&mut self, config: &ExchangeConfig) -> Result<SessionHandle> {
        let handle = self.handle();
        tracing::info!("PKEX session {} (identifier {:?})", handle, config.identifier);
        Ok(handle)
    }

    fn initiate_exchange(
        &mut self,
        handle: SessionHandle,
        _ctx: &mut EngineContext<'_>,
    ) -> Result<()> {
        tracing::info!("would initiate PKEX on {}", handle);
        Ok(())
    }

    fn destroy_exchange_session(&mut self, handle: SessionHandle) {
        tracing::info!("PKEX session {} destroyed", handle);
    }

    fn process_exchange_frame(
        &mut self,
        handle: Option<SessionHandle>,
        payload: &[u8],
        _ctx: &mut EngineContext<'_>,
    ) -> Result<()> {
        tracing::info!("PKEX frame for {:?}, {} bytes", handle, payload.len());
        Ok(())
    }

    fn create_authentication_session(
        &mut self,
        peer_key_b64: &str,
        initiator: bool,
        mutual: bool,
    ) -> Result<SessionHandle> {
        let handle = self.handle();
        tracing::info!(
            "DPP session {} with {} (initiator {}, mutual {})",
            handle,
            peer_key_b64,
            initiator,
            mutual
        );
        Ok(handle)
    }

    fn destroy_authentication_session(&mut self, handle: SessionHandle) {
        tracing::info!("DPP session {} destroyed", handle);
    }

    fn process_authentication_frame(
        &mut self,
        handle: SessionHandle,
        payload: &[u8],
        _ctx: &mut EngineContext<'_>,
    ) -> Result<()> {
        tracing::info!("DPP frame for {}, {} bytes", handle, payload.len());
        Ok(())
    }

    fn process_configuration_frame(
        &mut self,
        kind: GasKind,
        handle: SessionHandle,
        payload: &[u8],
        _ctx: &mut EngineContext<'_>,
    ) -> Result<()> {
        tracing::info!("{:?} for {}, {} bytes", kind, handle, payload.len());
        Ok(())
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = match args.debug {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = args.into_config()?;
    let mut agent = AgentBuilder::from_config(config)
        .connect(LoggingEngine::default())
        .await?;

    if let Some(mut events) = agent.take_events() {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let Err(e) = write_stdout_event(&event) {
                    tracing::warn!("unable to write event to stdout: {}", e);
                }
            }
        });
    }

    agent.run().await?;
    Ok(())
}
