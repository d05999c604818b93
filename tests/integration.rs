//! Integration tests for dpp-agent.
//!
//! These drive a full agent over an in-memory duplex stream standing in for
//! the controller.

use base64::Engine as _;
use dpp_agent::protocol::{
    build_frame, frame_types, subtypes, FrameBuffer, GasKind, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE,
};
use dpp_agent::{
    AgentBuilder, AgentError, AgentEvent, EngineContext, ExchangeConfig, ProtocolEngine, Result,
    SessionHandle, StoreError, TrustStore,
};
use tempfile::NamedTempFile;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

const PEER_KEY: &[u8] = b"0Y0\x13\x06\x07*\x86H\xce=\x02\x01peer";

/// Minimal engine: answers every authentication frame, completes PKEX on the
/// commit-reveal response.
#[derive(Default)]
struct ScriptedEngine {
    next: u32,
    authentication_frames: Vec<(SessionHandle, Vec<u8>)>,
    configuration_frames: Vec<GasKind>,
    destroyed_exchanges: Vec<SessionHandle>,
}

impl ScriptedEngine {
    fn handle(&mut self) -> SessionHandle {
        self.next += 1;
        SessionHandle::new(self.next).unwrap()
    }
}

impl ProtocolEngine for ScriptedEngine {
    fn create_exchange_session(&mut self, _config: &ExchangeConfig) -> Result<SessionHandle> {
        Ok(self.handle())
    }

    fn initiate_exchange(
        &mut self,
        _handle: SessionHandle,
        ctx: &mut EngineContext<'_>,
    ) -> Result<()> {
        ctx.transmit_exchange(&vendor_payload(subtypes::PKEX_EXCH_REQ))?;
        Ok(())
    }

    fn destroy_exchange_session(&mut self, handle: SessionHandle) {
        self.destroyed_exchanges.push(handle);
    }

    fn process_exchange_frame(
        &mut self,
        handle: Option<SessionHandle>,
        payload: &[u8],
        ctx: &mut EngineContext<'_>,
    ) -> Result<()> {
        if payload[5] == subtypes::PKEX_COM_REV_RESP {
            let index = ctx.save_bootstrap_key(PEER_KEY)?;
            ctx.request_bootstrap(handle, index, true, true);
        }
        Ok(())
    }

    fn create_authentication_session(
        &mut self,
        _peer_key_b64: &str,
        _initiator: bool,
        _mutual: bool,
    ) -> Result<SessionHandle> {
        Ok(self.handle())
    }

    fn destroy_authentication_session(&mut self, _handle: SessionHandle) {}

    fn process_authentication_frame(
        &mut self,
        handle: SessionHandle,
        payload: &[u8],
        ctx: &mut EngineContext<'_>,
    ) -> Result<()> {
        self.authentication_frames.push((handle, payload.to_vec()));
        ctx.transmit_authentication(&vendor_payload(subtypes::DPP_AUTH_CONFIRM))?;
        Ok(())
    }

    fn process_configuration_frame(
        &mut self,
        kind: GasKind,
        _handle: SessionHandle,
        _payload: &[u8],
        ctx: &mut EngineContext<'_>,
    ) -> Result<()> {
        self.configuration_frames.push(kind);
        ctx.provision_connector("sta", b"*", b"connector");
        ctx.session_finished(0, Some(b"pmk"));
        Ok(())
    }
}

fn vendor_payload(subtype: u8) -> Vec<u8> {
    vec![0x50, 0x6f, 0x9a, 0x1a, 0x01, subtype, 0x10, 0x20]
}

fn vendor_frame(subtype: u8) -> Vec<u8> {
    build_frame(frame_types::PUB_ACTION_VENDOR, &vendor_payload(subtype))
}

async fn read_frame(controller: &mut DuplexStream) -> (u8, Vec<u8>) {
    let mut prefix = [0u8; 4];
    controller.read_exact(&mut prefix).await.unwrap();
    let len = u32::from_be_bytes(prefix) as usize;
    let mut body = vec![0u8; len];
    controller.read_exact(&mut body).await.unwrap();
    (body[0], body[1..].to_vec())
}

fn bootstrap_file(contents: &str) -> NamedTempFile {
    let file = NamedTempFile::new().unwrap();
    std::fs::write(file.path(), contents).unwrap();
    file
}

/// Framing round trip at the edges of the allowed length range.
#[test]
fn test_framing_round_trip() {
    for len in [0usize, 1, 255, 4096, MAX_PAYLOAD_SIZE] {
        let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();
        let bytes = build_frame(frame_types::GAS_COMEBACK_RESPONSE, &payload);

        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&bytes).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frame_type, frame_types::GAS_COMEBACK_RESPONSE);
        assert_eq!(frames[0].payload(), &payload[..]);
        assert!(!buffer.has_partial_frame());
    }
}

/// Declared lengths of zero and above the maximum are rejected.
#[test]
fn test_bad_lengths_rejected() {
    for declared in [0u32, MAX_FRAME_SIZE + 1, u32::MAX] {
        let mut buffer = FrameBuffer::new();
        let result = buffer.push(&declared.to_be_bytes());
        assert!(matches!(result, Err(AgentError::Protocol(_))), "length {}", declared);
    }
}

/// Several frames in one read, split arbitrarily.
#[test]
fn test_fragmented_stream() {
    let mut bytes = Vec::new();
    for subtype in [subtypes::DPP_AUTH_REQUEST, subtypes::PKEX_EXCH_RESP, 42] {
        bytes.extend(vendor_frame(subtype));
    }

    let mut buffer = FrameBuffer::new();
    let mut frames = Vec::new();
    for chunk in bytes.chunks(7) {
        frames.extend(buffer.push(chunk).unwrap());
    }

    assert_eq!(frames.len(), 3);
    assert_eq!(frames[2].payload()[5], 42);
}

#[test]
fn test_store_save_then_lookup() {
    let file = bootstrap_file("");
    let store = TrustStore::new(file.path());

    assert_eq!(store.save(b"first").unwrap().index, 1);
    assert_eq!(store.save(b"second").unwrap().index, 2);

    let record = store.lookup(1).unwrap();
    assert_eq!(
        record.key_b64,
        base64::engine::general_purpose::STANDARD.encode(b"first")
    );
    assert!(matches!(store.lookup(3), Err(StoreError::NotFound(3))));

    let text = std::fs::read_to_string(file.path()).unwrap();
    assert!(text.starts_with("1 0 0 ffffffffffff "));
}

/// An authentication frame with no DPP session is dropped without touching
/// the link; once a session exists the same frame reaches the engine.
#[tokio::test]
async fn test_auth_frame_routed_after_bootstrap() {
    let file = bootstrap_file("1 81 6 0a1b2c3d4e5f UEVFUg==\n");
    let (agent_side, mut controller) = duplex(8192);

    let mut agent = AgentBuilder::new()
        .controller("duplex")
        .bootstrap_file(file.path())
        .exchange_password("code")
        .start_with_stream(agent_side, ScriptedEngine::default())
        .unwrap();

    let (frame_type, first) = read_frame(&mut controller).await;
    assert_eq!(frame_type, frame_types::PUB_ACTION_VENDOR);
    assert_eq!(first[5], subtypes::PKEX_EXCH_REQ);

    controller
        .write_all(&vendor_frame(subtypes::DPP_AUTH_REQUEST))
        .await
        .unwrap();
    let frames = agent.read_frames().await.unwrap();
    assert_eq!(frames.len(), 1);

    let result = agent.dispatch(&frames[0]);
    assert!(matches!(result, Err(AgentError::Routing(_))));
    assert!(agent.engine().authentication_frames.is_empty());
    assert!(!agent.is_closed());

    let session = agent.bootstrap_peer(None, 1, true, true).unwrap();
    agent.dispatch(&frames[0]).unwrap();

    assert_eq!(
        agent.engine().authentication_frames,
        vec![(session, vendor_payload(subtypes::DPP_AUTH_REQUEST))]
    );
    let (_, reply) = read_frame(&mut controller).await;
    assert_eq!(reply[5], subtypes::DPP_AUTH_CONFIRM);
}

/// PKEX completion stores the peer key, hands over to DPP, and the
/// configuration results come out as events.
#[tokio::test]
async fn test_pkex_to_dpp_handover() {
    let file = bootstrap_file("");
    let (agent_side, mut controller) = duplex(8192);

    let mut agent = AgentBuilder::new()
        .controller("duplex")
        .bootstrap_file(file.path())
        .exchange_password("code")
        .start_with_stream(agent_side, ScriptedEngine::default())
        .unwrap();
    let mut events = agent.take_events().unwrap();
    let exchange = agent.registry().current_exchange_session().unwrap();

    read_frame(&mut controller).await;
    controller
        .write_all(&vendor_frame(subtypes::PKEX_COM_REV_RESP))
        .await
        .unwrap();
    controller
        .write_all(&vendor_frame(subtypes::DPP_AUTH_RESPONSE))
        .await
        .unwrap();
    controller
        .write_all(&build_frame(frame_types::GAS_INITIAL_RESPONSE, b"config"))
        .await
        .unwrap();
    controller.shutdown().await.unwrap();

    agent.run().await.unwrap();

    assert!(agent.registry().current_exchange_session().is_none());
    assert!(agent.registry().current_authentication_session().is_none());
    assert_eq!(agent.engine().destroyed_exchanges, vec![exchange]);
    assert_eq!(agent.engine().authentication_frames.len(), 1);
    assert_eq!(
        agent.engine().configuration_frames,
        vec![GasKind::InitialResponse]
    );

    let record = agent.trust_store().lookup(1).unwrap();
    assert_eq!(record.key_bytes().unwrap(), PEER_KEY);

    assert_eq!(
        events.recv().await.unwrap(),
        AgentEvent::BootstrapKeySaved {
            index: 1,
            duplicate_of: None
        }
    );
    assert!(matches!(
        events.recv().await.unwrap(),
        AgentEvent::ConnectorProvisioned { .. }
    ));
    assert_eq!(
        events.recv().await.unwrap(),
        AgentEvent::SessionFinished {
            reason: 0,
            key: Some(b"pmk".to_vec())
        }
    );
}

/// A bad length prefix ends the run with a protocol error and closes the link.
#[tokio::test]
async fn test_oversize_frame_ends_run() {
    let file = bootstrap_file("1 0 0 ffffffffffff UEVFUg==\n");
    let (agent_side, mut controller) = duplex(8192);

    let mut agent = AgentBuilder::new()
        .controller("duplex")
        .bootstrap_file(file.path())
        .bootstrap_index(1)
        .start_with_stream(agent_side, ScriptedEngine::default())
        .unwrap();

    controller
        .write_all(&(MAX_FRAME_SIZE + 1).to_be_bytes())
        .await
        .unwrap();

    assert!(matches!(agent.run().await, Err(AgentError::Protocol(_))));
    assert!(agent.is_closed());
}
