//! INVITE server transaction (RFC 3261 section 17.2.1)

use tracing::{debug, trace, warn};

use crate::events::NotificationKind;
use crate::message::SipMessage;
use crate::transaction::{EventType, SipEvent, Transaction, TransactionState};

use super::{notify, resend_last_response, send, terminate, time_out, Action, FsmContext};

pub(super) fn transition(tx: &mut Transaction, event: &SipEvent, ctx: &FsmContext<'_>) -> Vec<Action> {
    use EventType::*;
    use TransactionState::*;

    let message = event.message.as_ref();
    match (tx.state, event.event_type, message) {
        (Initial, RcvInvite, Some(invite)) => {
            tx.state = Proceeding;
            vec![notify(NotificationKind::InviteReceived, Some(invite))]
        }
        (Proceeding | Completed, RcvInvite, Some(invite)) => {
            trace!(id = %tx.id, "Retransmitted INVITE");
            resend_last_response(tx, NotificationKind::InviteReceivedAgain, invite)
        }
        (Proceeding, Snd1xx, Some(response)) => {
            tx.last_response = Some(response.clone());
            vec![
                send(tx, response.clone()),
                notify(NotificationKind::Status1xxSent, Some(response)),
            ]
        }
        (Proceeding, Snd2xx, Some(response)) => {
            // 2xx retransmission is the dialog's job
            tx.last_response = Some(response.clone());
            let mut actions = vec![
                send(tx, response.clone()),
                notify(NotificationKind::Status2xxSent, Some(response)),
            ];
            actions.extend(terminate(tx));
            actions
        }
        (Proceeding, Snd3456xx, Some(response)) => send_failure(tx, response, ctx),
        (Completed, TimeoutG, _) => retransmit_failure(tx, ctx),
        (Completed, TimeoutH, _) => {
            warn!(id = %tx.id, "Timer H fired, no ACK received");
            time_out(tx)
        }
        (Completed, RcvAck, Some(ack)) => {
            tx.timers.g.disarm();
            tx.timers.h.disarm();
            tx.timers.i.arm(ctx.timers.timer_i(tx.reliable), ctx.now);
            tx.state = Confirmed;
            vec![notify(NotificationKind::AckReceived, Some(ack))]
        }
        (Confirmed, RcvAck, Some(ack)) => vec![notify(NotificationKind::AckReceivedAgain, Some(ack))],
        (Confirmed, TimeoutI, _) => {
            debug!(id = %tx.id, "Timer I fired");
            terminate(tx)
        }
        _ => Vec::new(),
    }
}

fn send_failure(tx: &mut Transaction, response: &SipMessage, ctx: &FsmContext<'_>) -> Vec<Action> {
    if !tx.reliable {
        tx.timers.g.arm(ctx.timers.t1, ctx.now);
    }
    tx.timers.h.arm(ctx.timers.transaction_timeout(), ctx.now);
    tx.last_response = Some(response.clone());
    tx.state = TransactionState::Completed;

    let status = response.status().unwrap_or(500);
    debug!(id = %tx.id, status, "IST sending final failure");
    vec![
        send(tx, response.clone()),
        notify(NotificationKind::sent_for(status), Some(response)),
    ]
}

fn retransmit_failure(tx: &mut Transaction, ctx: &FsmContext<'_>) -> Vec<Action> {
    let interval = ctx.timers.backoff(tx.timers.g.length.unwrap_or(ctx.timers.t1));
    tx.timers.g.arm(interval, ctx.now);
    let Some(response) = tx.last_response.clone() else {
        return Vec::new();
    };
    trace!(id = %tx.id, next = ?interval, "Retransmitting final response");
    vec![
        send(tx, response.clone()),
        notify(NotificationKind::Status3456xxSentAgain, Some(&response)),
    ]
}
