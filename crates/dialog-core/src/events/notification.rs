use std::fmt;

use crate::call::OwnerRef;
use crate::dialog::DialogId;
use crate::message::SipMessage;
use crate::transaction::{TransactionId, TransactionKind};

/// Transaction milestones reported to the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    // client side
    InviteSent,
    InviteSentAgain,
    AckSent,
    AckSentAgain,
    RequestSent,
    RequestSentAgain,
    Status1xxReceived,
    Status2xxReceived,
    Status2xxReceivedAgain,
    Status3xxReceived,
    Status4xxReceived,
    Status5xxReceived,
    Status6xxReceived,
    Status3456xxReceivedAgain,

    // server side
    InviteReceived,
    InviteReceivedAgain,
    AckReceived,
    AckReceivedAgain,
    RequestReceived,
    RequestReceivedAgain,
    Status1xxSent,
    Status2xxSent,
    Status2xxSentAgain,
    Status3xxSent,
    Status4xxSent,
    Status5xxSent,
    Status6xxSent,
    Status3456xxSentAgain,

    // both
    StatusTimeout,
    TransportError,
    KillTransaction,
}

impl NotificationKind {
    /// Notification for a received response with this status
    pub fn received_for(status: u16) -> NotificationKind {
        match status / 100 {
            1 => NotificationKind::Status1xxReceived,
            2 => NotificationKind::Status2xxReceived,
            3 => NotificationKind::Status3xxReceived,
            4 => NotificationKind::Status4xxReceived,
            5 => NotificationKind::Status5xxReceived,
            _ => NotificationKind::Status6xxReceived,
        }
    }

    /// Notification for a sent response with this status
    pub fn sent_for(status: u16) -> NotificationKind {
        match status / 100 {
            1 => NotificationKind::Status1xxSent,
            2 => NotificationKind::Status2xxSent,
            3 => NotificationKind::Status3xxSent,
            4 => NotificationKind::Status4xxSent,
            5 => NotificationKind::Status5xxSent,
            _ => NotificationKind::Status6xxSent,
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Dialog-level events that have no transaction of their own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialogNotification {
    /// An early or confirmed dialog was created
    Created,
    /// An early dialog was confirmed by a 2xx
    Confirmed,
    /// The stored 200 OK was retransmitted
    OkRetransmitted,
    /// The stored ACK was resent for a retransmitted 2xx
    AckRetransmitted,
    /// The ACK for our 2xx arrived
    AckReceived,
    /// No ACK arrived within 64*T1; retransmission stopped
    AckTimeout,
    /// The dialog was freed
    Terminated,
}

/// Everything the engine reports to its owner
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Transaction {
        id: TransactionId,
        kind: TransactionKind,
        notification: NotificationKind,
        message: Option<SipMessage>,
    },
    Dialog {
        owner: OwnerRef,
        dialog: DialogId,
        notification: DialogNotification,
        message: Option<SipMessage>,
    },
}

impl EngineEvent {
    pub fn transaction_id(&self) -> Option<TransactionId> {
        match self {
            EngineEvent::Transaction { id, .. } => Some(*id),
            EngineEvent::Dialog { .. } => None,
        }
    }

    /// The transaction notification, if this is a transaction event
    pub fn notification(&self) -> Option<NotificationKind> {
        match self {
            EngineEvent::Transaction { notification, .. } => Some(*notification),
            EngineEvent::Dialog { .. } => None,
        }
    }
}
