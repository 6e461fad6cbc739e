//! Shared fixtures for the engine integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;

use sipstate_dialog_core::config::EngineConfig;
use sipstate_dialog_core::events::{DialogNotification, EngineEvent, NotificationKind};
use sipstate_dialog_core::manager::Engine;
use sipstate_dialog_core::message::{generate_branch, Method, NameAddr, SipMessage, Via};
use sipstate_dialog_core::transport::{Destination, Transport, TransportError, TransportResult};

pub const CALL_ID: &str = "a84b4c76e66710@pc33.atlanta.com";
pub const ALICE_TAG: &str = "1928301774";
pub const BOB_TAG: &str = "a6c85cf";

/// One datagram handed to the transport
#[derive(Debug, Clone)]
pub struct Sent {
    pub text: String,
    pub host: String,
    pub port: u16,
}

impl Sent {
    pub fn start_line(&self) -> &str {
        self.text.lines().next().unwrap_or_default()
    }
}

/// Transport that records everything it is asked to send
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn start_lines(&self) -> Vec<String> {
        self.sent.lock().iter().map(|s| s.start_line().to_string()).collect()
    }
}

impl Transport for RecordingTransport {
    fn send_to(&self, data: &[u8], host: &str, port: u16) -> TransportResult<usize> {
        self.sent.lock().push(Sent {
            text: String::from_utf8_lossy(data).into_owned(),
            host: host.to_string(),
            port,
        });
        Ok(data.len())
    }

    fn recv_from(&self, _buf: &mut [u8]) -> TransportResult<(usize, Destination)> {
        Err(TransportError::Closed)
    }

    fn wait_readable(&self, _timeout: Duration) -> TransportResult<bool> {
        Ok(false)
    }
}

pub fn engine() -> (Engine, UnboundedReceiver<EngineEvent>, Arc<RecordingTransport>) {
    engine_with(EngineConfig::default())
}

pub fn engine_with(config: EngineConfig) -> (Engine, UnboundedReceiver<EngineEvent>, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::default());
    let (engine, events) = Engine::with_transport(config, transport.clone());
    (engine, events, transport)
}

pub fn drain(events: &mut UnboundedReceiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// Transaction notifications only, in order
pub fn transaction_kinds(events: &[EngineEvent]) -> Vec<NotificationKind> {
    events.iter().filter_map(EngineEvent::notification).collect()
}

/// Dialog notifications only, in order
pub fn dialog_kinds(events: &[EngineEvent]) -> Vec<DialogNotification> {
    events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::Dialog { notification, .. } => Some(*notification),
            EngineEvent::Transaction { .. } => None,
        })
        .collect()
}

/// A request alice sends to bob
pub fn outgoing_request(method: Method, seq: u32) -> SipMessage {
    SipMessage::request(method.clone(), "sip:bob@biloxi.com".parse().unwrap())
        .with_via(Via::new("UDP", "pc33.atlanta.com", None, &generate_branch()))
        .with_from(format!("<sip:alice@atlanta.com>;tag={ALICE_TAG}").parse().unwrap())
        .with_to("<sip:bob@biloxi.com>".parse().unwrap())
        .with_call_id(CALL_ID)
        .with_cseq(seq, method)
        .with_contact("<sip:alice@pc33.atlanta.com>".parse().unwrap())
}

/// A request bob sends to alice
pub fn incoming_request(method: Method, seq: u32, branch: &str) -> SipMessage {
    SipMessage::request(method.clone(), "sip:alice@pc33.atlanta.com".parse().unwrap())
        .with_via(Via::new("UDP", "client.biloxi.com", Some(5060), branch))
        .with_from(format!("<sip:bob@biloxi.com>;tag={BOB_TAG}").parse().unwrap())
        .with_to("<sip:alice@atlanta.com>".parse().unwrap())
        .with_call_id(CALL_ID)
        .with_cseq(seq, method)
        .with_contact("<sip:bob@192.0.2.4>".parse().unwrap())
}

pub fn bob() -> Destination {
    Destination::new("192.0.2.4", 5060)
}

/// Response to `request` whose To carries `tag`
pub fn answer(request: &SipMessage, status: u16, tag: Option<&str>) -> SipMessage {
    let mut response = SipMessage::response_for(request, status).unwrap();
    if let (Some(tag), Some(to)) = (tag, response.to.as_mut()) {
        to.set_tag(tag);
    }
    response
}

/// Response bob sends to one of our requests, with his Contact
pub fn answer_from_bob(request: &SipMessage, status: u16) -> SipMessage {
    answer(request, status, Some(BOB_TAG)).with_contact(NameAddr::new("sip:bob@192.0.2.4".parse().unwrap()))
}

pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}
