use std::fmt;

use super::TransactionKind;

/// State of a transaction, shared by the four RFC 3261 state machines
///
/// Not every variant applies to every kind: `Calling` is INVITE client only,
/// `Trying` is non-INVITE only and `Confirmed` is INVITE server only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// Created but nothing sent or received yet (PRE_CALLING, PRE_TRYING, PRE_PROCEEDING)
    Initial,
    /// INVITE sent, waiting for any response
    Calling,
    /// Non-INVITE request sent (client) or received (server), no provisional yet
    Trying,
    /// Provisional response received (client) or sent (server)
    Proceeding,
    /// Final response received (client) or sent (server); absorbing retransmissions
    Completed,
    /// ACK received for a non-2xx final (INVITE server only)
    Confirmed,
    /// Finished; ignores every further event
    Terminated,
}

impl TransactionState {
    pub fn is_terminated(&self) -> bool {
        *self == TransactionState::Terminated
    }

    /// Check a transition against the state machine of `kind`
    ///
    /// Staying in the same state and entering `Terminated` from a live state are
    /// always allowed. Leaving `Terminated` never is.
    pub fn validate_transition(
        kind: TransactionKind,
        from: TransactionState,
        to: TransactionState,
    ) -> Result<(), String> {
        use TransactionState::*;

        if from == to {
            return Ok(());
        }
        if from == Terminated {
            return Err("cannot leave Terminated".to_string());
        }
        if to == Terminated {
            return Ok(());
        }

        let allowed = match kind {
            TransactionKind::InviteClient => matches!(
                (from, to),
                (Initial, Calling) | (Calling, Proceeding) | (Calling, Completed) | (Proceeding, Completed)
            ),
            TransactionKind::NonInviteClient => matches!(
                (from, to),
                (Initial, Trying) | (Trying, Proceeding) | (Trying, Completed) | (Proceeding, Completed)
            ),
            TransactionKind::InviteServer => matches!(
                (from, to),
                (Initial, Proceeding) | (Proceeding, Completed) | (Completed, Confirmed)
            ),
            TransactionKind::NonInviteServer => matches!(
                (from, to),
                (Initial, Trying) | (Trying, Proceeding) | (Trying, Completed) | (Proceeding, Completed)
            ),
        };

        if allowed {
            Ok(())
        } else {
            Err(format!("invalid transition for {kind:?}: {from:?} -> {to:?}"))
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Initial => "Initial",
            TransactionState::Calling => "Calling",
            TransactionState::Trying => "Trying",
            TransactionState::Proceeding => "Proceeding",
            TransactionState::Completed => "Completed",
            TransactionState::Confirmed => "Confirmed",
            TransactionState::Terminated => "Terminated",
        };
        f.write_str(name)
    }
}
