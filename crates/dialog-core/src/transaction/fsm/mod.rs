//! The four transaction state machines
//!
//! Each machine is a `(state, event) -> actions` table. A transition mutates
//! only the transaction; sending, notifying and freeing are left to the caller
//! through the returned [`Action`]s, in order. Unmatched pairs return no
//! actions.

mod ict;
mod ist;
mod nict;
mod nist;

use tokio::time::Instant;

use crate::events::NotificationKind;
use crate::message::SipMessage;
use crate::transport::Destination;

use super::timer::TimerSettings;
use super::{EventType, SipEvent, Transaction, TransactionKind, TransactionState};

/// Side effects requested by a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Hand a message to the transport
    Send {
        message: SipMessage,
        destination: Destination,
    },
    /// Report a milestone to the application
    Notify {
        kind: NotificationKind,
        message: Option<SipMessage>,
    },
    /// The transaction reached Terminated and must be reclaimed
    Kill,
}

/// Inputs a transition needs besides the transaction and the event
#[derive(Debug, Clone, Copy)]
pub struct FsmContext<'a> {
    pub now: Instant,
    pub timers: &'a TimerSettings,
    pub default_port: u16,
}

/// Run one event through the state machine of `tx`
pub fn transition(tx: &mut Transaction, event: &SipEvent, ctx: &FsmContext<'_>) -> Vec<Action> {
    if tx.state.is_terminated() {
        return Vec::new();
    }
    if event.event_type == EventType::KillTransaction {
        return terminate(tx);
    }
    match tx.kind {
        TransactionKind::InviteClient => ict::transition(tx, event, ctx),
        TransactionKind::NonInviteClient => nict::transition(tx, event, ctx),
        TransactionKind::InviteServer => ist::transition(tx, event, ctx),
        TransactionKind::NonInviteServer => nist::transition(tx, event, ctx),
    }
}

/// Enter Terminated, dropping every timer
fn terminate(tx: &mut Transaction) -> Vec<Action> {
    tx.timers.cancel_all();
    tx.state = TransactionState::Terminated;
    vec![Action::Kill]
}

/// Report a timeout, then terminate
fn time_out(tx: &mut Transaction) -> Vec<Action> {
    let mut actions = vec![notify(NotificationKind::StatusTimeout, None)];
    actions.extend(terminate(tx));
    actions
}

fn send(tx: &Transaction, message: SipMessage) -> Action {
    Action::Send {
        message,
        destination: tx.destination.clone(),
    }
}

fn notify(kind: NotificationKind, message: Option<&SipMessage>) -> Action {
    Action::Notify {
        kind,
        message: message.cloned(),
    }
}

/// Resend the last response, used by the server machines for retransmitted requests
fn resend_last_response(tx: &Transaction, again: NotificationKind, request: &SipMessage) -> Vec<Action> {
    let mut actions = Vec::with_capacity(2);
    if let Some(response) = &tx.last_response {
        actions.push(send(tx, response.clone()));
    }
    actions.push(notify(again, Some(request)));
    actions
}
