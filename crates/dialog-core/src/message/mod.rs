//! Opaque SIP message model
//!
//! The engine does not parse or serialize SIP itself; that is the job of an
//! external [`MessageParser`](crate::transport::MessageParser). This module
//! only gives the engine the typed accessors it needs: method, Request-URI,
//! status, and the Via, Route, From, To, Call-ID and CSeq headers.

mod headers;
mod method;
mod sip_message;
mod uri;

pub use headers::{CSeq, NameAddr, Via};
pub use method::Method;
pub use sip_message::{reason_phrase, SipMessage, StartLine};
pub use uri::{Param, Uri, DEFAULT_SIP_PORT};

use rand::Rng;
use uuid::Uuid;

/// RFC 3261 magic cookie every branch starts with
pub const BRANCH_MAGIC_COOKIE: &str = "z9hG4bK";

/// Generate a fresh Via branch parameter
pub fn generate_branch() -> String {
    format!("{}{}", BRANCH_MAGIC_COOKIE, Uuid::new_v4().simple())
}

/// Generate a From/To tag
pub fn generate_tag() -> String {
    format!("{:08x}", rand::thread_rng().r#gen::<u32>())
}

/// Generate a Call-ID value
pub fn generate_call_id(host: &str) -> String {
    format!("{}@{}", Uuid::new_v4().simple(), host)
}
