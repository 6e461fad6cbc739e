//! Call and subscription aggregates
//!
//! A [`Call`] (INVITE) or [`Subscribe`] (SUBSCRIBE) groups the dialogs created
//! by one logical session, forked responses included, plus the root incoming
//! and outgoing transaction that is not dialog-scoped yet. Both implement
//! [`DialogOwner`], which is all the lookup functions in [`lookup`] need.
//!
//! Transaction membership is exclusive: a transaction id sits in exactly one
//! of the root slots or one dialog's incoming/outgoing list.

mod aggregate;
pub mod lookup;

use std::fmt;

pub use aggregate::{Call, Subscribe};
pub use lookup::{
    find_dialog_by_id, find_dialog_by_id_mut, find_dialog_by_tags, find_last_inc_invite,
    find_last_invite, find_last_out_invite, find_last_transaction, find_previous_invite,
    remove_transaction_from_call, TransactionIndex,
};

use crate::dialog::{Dialog, DialogId};
use crate::transaction::TransactionId;

/// Engine handle of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(pub u32);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call{}", self.0)
    }
}

/// Engine handle of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscribeId(pub u32);

impl fmt::Display for SubscribeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub{}", self.0)
    }
}

/// Which aggregate a transaction or dialog belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnerRef {
    Call(CallId),
    Subscribe(SubscribeId),
}

impl fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerRef::Call(id) => id.fmt(f),
            OwnerRef::Subscribe(id) => id.fmt(f),
        }
    }
}

/// Side of a transaction relative to this endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Server transaction, the peer sent the request
    Incoming,
    /// Client transaction, we sent the request
    Outgoing,
}

/// Common shape of [`Call`] and [`Subscribe`]
pub trait DialogOwner {
    fn owner_ref(&self) -> OwnerRef;

    fn root_incoming(&self) -> Option<TransactionId>;
    fn root_incoming_mut(&mut self) -> &mut Option<TransactionId>;

    fn root_outgoing(&self) -> Option<TransactionId>;
    fn root_outgoing_mut(&mut self) -> &mut Option<TransactionId>;

    fn dialogs(&self) -> &[Dialog];
    fn dialogs_mut(&mut self) -> &mut Vec<Dialog>;

    /// Hand out the next positive dialog id
    fn next_dialog_id(&mut self) -> DialogId;

    /// Attach a dialog, replacing a tentative id with a positive one
    fn add_dialog(&mut self, mut dialog: Dialog) -> DialogId {
        if dialog.id.is_tentative() {
            dialog.id = self.next_dialog_id();
        }
        let id = dialog.id;
        self.dialogs_mut().push(dialog);
        id
    }

    fn root(&self, direction: Direction) -> Option<TransactionId> {
        match direction {
            Direction::Incoming => self.root_incoming(),
            Direction::Outgoing => self.root_outgoing(),
        }
    }

    fn root_mut(&mut self, direction: Direction) -> &mut Option<TransactionId> {
        match direction {
            Direction::Incoming => self.root_incoming_mut(),
            Direction::Outgoing => self.root_outgoing_mut(),
        }
    }

    /// Does any slot of this aggregate hold `tx`
    fn holds(&self, tx: TransactionId) -> bool {
        self.root_incoming() == Some(tx)
            || self.root_outgoing() == Some(tx)
            || self.dialogs().iter().any(|d| d.contains(tx))
    }
}
