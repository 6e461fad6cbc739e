use crate::dialog::{Dialog, DialogId};
use crate::transaction::TransactionId;

use super::{CallId, DialogOwner, OwnerRef, SubscribeId};

/// An INVITE session and the dialogs forked from it
#[derive(Debug, Clone)]
pub struct Call {
    pub id: CallId,
    /// Call-ID header shared by every dialog of the call
    pub call_id: String,
    pub root_incoming: Option<TransactionId>,
    pub root_outgoing: Option<TransactionId>,
    pub dialogs: Vec<Dialog>,
    last_dialog_id: i32,
}

impl Call {
    pub fn new(id: CallId, call_id: impl Into<String>) -> Self {
        Call {
            id,
            call_id: call_id.into(),
            root_incoming: None,
            root_outgoing: None,
            dialogs: Vec::new(),
            last_dialog_id: 0,
        }
    }
}

/// A SUBSCRIBE session; NOTIFYs from several notifiers may fork it
#[derive(Debug, Clone)]
pub struct Subscribe {
    pub id: SubscribeId,
    pub call_id: String,
    /// Event package from the SUBSCRIBE, when present
    pub event: Option<String>,
    pub root_incoming: Option<TransactionId>,
    pub root_outgoing: Option<TransactionId>,
    pub dialogs: Vec<Dialog>,
    last_dialog_id: i32,
}

impl Subscribe {
    pub fn new(id: SubscribeId, call_id: impl Into<String>, event: Option<String>) -> Self {
        Subscribe {
            id,
            call_id: call_id.into(),
            event,
            root_incoming: None,
            root_outgoing: None,
            dialogs: Vec::new(),
            last_dialog_id: 0,
        }
    }
}

impl DialogOwner for Call {
    fn owner_ref(&self) -> OwnerRef {
        OwnerRef::Call(self.id)
    }

    fn root_incoming(&self) -> Option<TransactionId> {
        self.root_incoming
    }

    fn root_incoming_mut(&mut self) -> &mut Option<TransactionId> {
        &mut self.root_incoming
    }

    fn root_outgoing(&self) -> Option<TransactionId> {
        self.root_outgoing
    }

    fn root_outgoing_mut(&mut self) -> &mut Option<TransactionId> {
        &mut self.root_outgoing
    }

    fn dialogs(&self) -> &[Dialog] {
        &self.dialogs
    }

    fn dialogs_mut(&mut self) -> &mut Vec<Dialog> {
        &mut self.dialogs
    }

    fn next_dialog_id(&mut self) -> DialogId {
        self.last_dialog_id += 1;
        DialogId(self.last_dialog_id)
    }
}

impl DialogOwner for Subscribe {
    fn owner_ref(&self) -> OwnerRef {
        OwnerRef::Subscribe(self.id)
    }

    fn root_incoming(&self) -> Option<TransactionId> {
        self.root_incoming
    }

    fn root_incoming_mut(&mut self) -> &mut Option<TransactionId> {
        &mut self.root_incoming
    }

    fn root_outgoing(&self) -> Option<TransactionId> {
        self.root_outgoing
    }

    fn root_outgoing_mut(&mut self) -> &mut Option<TransactionId> {
        &mut self.root_outgoing
    }

    fn dialogs(&self) -> &[Dialog] {
        &self.dialogs
    }

    fn dialogs_mut(&mut self) -> &mut Vec<Dialog> {
        &mut self.dialogs
    }

    fn next_dialog_id(&mut self) -> DialogId {
        self.last_dialog_id += 1;
        DialogId(self.last_dialog_id)
    }
}
