//! SIP transaction layer (RFC 3261 section 17)
//!
//! A [`Transaction`] tracks one request and its responses. Its behaviour is
//! one of four state machines selected by [`TransactionKind`]:
//!
//! ```text
//!               INVITE                    non-INVITE
//! client   ICT: Calling/Proceeding/      NICT: Trying/Proceeding/
//!               Completed (A, B, D)            Completed (E, F, K)
//! server   IST: Proceeding/Completed/    NIST: Trying/Proceeding/
//!               Confirmed (G, H, I)            Completed (J)
//! ```
//!
//! The machines in [`fsm`] are pure: they mutate the transaction and return
//! [`Action`](fsm::Action)s for the engine to carry out.

pub mod ack;
pub mod destination;
pub mod event;
pub mod fsm;
pub mod state;
pub mod timer;
mod transaction_impl;

use std::fmt;

use crate::message::Method;

pub use ack::create_ack;
pub use destination::{resolve_destination, response_destination};
pub use event::{EventType, SipEvent};
pub use fsm::{Action, FsmContext};
pub use state::TransactionState;
pub use timer::{TimerSettings, TimerSlot, Timers};
pub use transaction_impl::Transaction;

/// Engine-assigned transaction handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u32);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx{}", self.0)
    }
}

/// Which of the four state machines drives a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    InviteClient,
    NonInviteClient,
    InviteServer,
    NonInviteServer,
}

impl TransactionKind {
    pub fn for_request(method: &Method, client: bool) -> Self {
        match (method.is_invite(), client) {
            (true, true) => TransactionKind::InviteClient,
            (false, true) => TransactionKind::NonInviteClient,
            (true, false) => TransactionKind::InviteServer,
            (false, false) => TransactionKind::NonInviteServer,
        }
    }

    pub fn is_client(&self) -> bool {
        matches!(self, TransactionKind::InviteClient | TransactionKind::NonInviteClient)
    }

    pub fn is_invite(&self) -> bool {
        matches!(self, TransactionKind::InviteClient | TransactionKind::InviteServer)
    }

    /// Short name used in logs
    pub fn abbreviation(&self) -> &'static str {
        match self {
            TransactionKind::InviteClient => "ICT",
            TransactionKind::NonInviteClient => "NICT",
            TransactionKind::InviteServer => "IST",
            TransactionKind::NonInviteServer => "NIST",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abbreviation())
    }
}
