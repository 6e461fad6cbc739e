//! Transport collaborator
//!
//! The engine never touches sockets directly. Everything goes through a
//! [`Transport`]: the default [`UdpTransport`] or an implementation installed
//! with [`TransportHooks::register`]. Parsing is delegated to a
//! [`MessageParser`]; [`pump_incoming`] is the network-thread step that glues
//! the two to the event fifo.

mod hooks;
mod udp;

pub use hooks::TransportHooks;
pub use udp::UdpTransport;

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tracing::{trace, warn};

use crate::errors::DialogResult;
use crate::events::Fifo;
use crate::message::SipMessage;
use crate::transaction::SipEvent;

/// Result alias for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Failures reported by a transport or parser
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot resolve {host}:{port}")]
    Resolve { host: String, port: u16 },

    #[error("transport closed")]
    Closed,

    #[error("parse error: {0}")]
    Parse(String),

    #[error("send rejected: {0}")]
    Rejected(String),
}

/// Where a message goes, or where it came from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    pub host: String,
    pub port: u16,
}

impl Destination {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Destination {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Send, receive and wait primitives
///
/// Implementations carry whatever user data they need. All three calls may
/// block; the engine only ever calls `send_to`.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Send one datagram or stream frame, returning the number of bytes written
    fn send_to(&self, data: &[u8], host: &str, port: u16) -> TransportResult<usize>;

    /// Receive one message into `buf`
    fn recv_from(&self, buf: &mut [u8]) -> TransportResult<(usize, Destination)>;

    /// Wait up to `timeout` for data; `Ok(false)` on timeout
    fn wait_readable(&self, timeout: Duration) -> TransportResult<bool>;
}

/// External SIP parser
pub trait MessageParser: Send + Sync {
    fn parse(&self, data: &[u8]) -> TransportResult<SipMessage>;
}

/// Wait for one message, parse it and queue it as an incoming event
///
/// Returns `Ok(true)` when an event was queued. Unparseable data is logged and
/// dropped. A full fifo is reported as
/// [`DialogError::QueueFull`](crate::errors::DialogError::QueueFull).
pub fn pump_incoming(
    transport: &dyn Transport,
    parser: &dyn MessageParser,
    fifo: &Fifo<SipEvent>,
    buf: &mut [u8],
    timeout: Duration,
) -> DialogResult<bool> {
    if !transport.wait_readable(timeout)? {
        return Ok(false);
    }
    let (len, source) = transport.recv_from(buf)?;
    let message = match parser.parse(&buf[..len]) {
        Ok(message) => message,
        Err(e) => {
            warn!(%source, len, error = %e, "Dropping unparseable message");
            return Ok(false);
        }
    };
    trace!(%source, message = %message.summary(), "Received message");
    fifo.add(SipEvent::incoming(message, source))?;
    Ok(true)
}
