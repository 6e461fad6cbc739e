//! Non-INVITE server transaction (RFC 3261 section 17.2.2)

use tracing::{debug, trace};

use crate::events::NotificationKind;
use crate::message::SipMessage;
use crate::transaction::{EventType, SipEvent, Transaction, TransactionState};

use super::{notify, resend_last_response, send, terminate, Action, FsmContext};

pub(super) fn transition(tx: &mut Transaction, event: &SipEvent, ctx: &FsmContext<'_>) -> Vec<Action> {
    use EventType::*;
    use TransactionState::*;

    let message = event.message.as_ref();
    match (tx.state, event.event_type, message) {
        (Initial, RcvRequest, Some(request)) => {
            tx.state = Trying;
            vec![notify(NotificationKind::RequestReceived, Some(request))]
        }
        (Proceeding | Completed, RcvRequest, Some(request)) => {
            trace!(id = %tx.id, method = %tx.method, "Retransmitted request");
            resend_last_response(tx, NotificationKind::RequestReceivedAgain, request)
        }
        (Trying | Proceeding, Snd1xx, Some(response)) => {
            tx.last_response = Some(response.clone());
            tx.state = Proceeding;
            vec![
                send(tx, response.clone()),
                notify(NotificationKind::Status1xxSent, Some(response)),
            ]
        }
        (Trying | Proceeding, Snd2xx | Snd3456xx, Some(response)) => send_final(tx, response, ctx),
        (Completed, TimeoutJ, _) => {
            debug!(id = %tx.id, "Timer J fired");
            terminate(tx)
        }
        _ => Vec::new(),
    }
}

fn send_final(tx: &mut Transaction, response: &SipMessage, ctx: &FsmContext<'_>) -> Vec<Action> {
    tx.timers.j.arm(ctx.timers.timer_j(tx.reliable), ctx.now);
    tx.last_response = Some(response.clone());
    tx.state = TransactionState::Completed;

    let status = response.status().unwrap_or(500);
    vec![
        send(tx, response.clone()),
        notify(NotificationKind::sent_for(status), Some(response)),
    ]
}
