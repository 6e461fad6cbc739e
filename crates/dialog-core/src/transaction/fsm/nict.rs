//! Non-INVITE client transaction (RFC 3261 section 17.1.2)

use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::events::NotificationKind;
use crate::message::SipMessage;
use crate::transaction::{EventType, SipEvent, Transaction, TransactionState};

use super::{notify, send, terminate, time_out, Action, FsmContext};

pub(super) fn transition(tx: &mut Transaction, event: &SipEvent, ctx: &FsmContext<'_>) -> Vec<Action> {
    use EventType::*;
    use TransactionState::*;

    let message = event.message.as_ref();
    match (tx.state, event.event_type, message) {
        (Initial, SndRequest, _) => send_request(tx, ctx),
        (Trying, TimeoutE, _) => {
            let interval = ctx.timers.backoff(tx.timers.e.length.unwrap_or(ctx.timers.t1));
            retransmit(tx, interval, ctx)
        }
        (Proceeding, TimeoutE, _) => retransmit(tx, ctx.timers.t2, ctx),
        (Trying | Proceeding, TimeoutF, _) => {
            warn!(id = %tx.id, method = %tx.method, "Timer F fired, request timed out");
            time_out(tx)
        }
        (Trying | Proceeding, Rcv1xx, Some(response)) => {
            tx.last_response = Some(response.clone());
            tx.state = Proceeding;
            vec![notify(NotificationKind::Status1xxReceived, Some(response))]
        }
        (Trying | Proceeding, Rcv2xx | Rcv3456xx, Some(response)) => receive_final(tx, response, ctx),
        (Completed, Rcv2xx, Some(response)) => {
            vec![notify(NotificationKind::Status2xxReceivedAgain, Some(response))]
        }
        (Completed, Rcv3456xx, Some(response)) => {
            vec![notify(NotificationKind::Status3456xxReceivedAgain, Some(response))]
        }
        (Completed, TimeoutK, _) => {
            debug!(id = %tx.id, "Timer K fired");
            terminate(tx)
        }
        _ => Vec::new(),
    }
}

fn send_request(tx: &mut Transaction, ctx: &FsmContext<'_>) -> Vec<Action> {
    if !tx.reliable {
        tx.timers.e.arm(ctx.timers.t1, ctx.now);
    }
    tx.timers.f.arm(ctx.timers.transaction_timeout(), ctx.now);
    tx.state = TransactionState::Trying;
    debug!(id = %tx.id, method = %tx.method, dest = %tx.destination, "NICT sending request");

    let request = tx.request.clone();
    vec![
        send(tx, request.clone()),
        notify(NotificationKind::RequestSent, Some(&request)),
    ]
}

fn retransmit(tx: &mut Transaction, interval: Duration, ctx: &FsmContext<'_>) -> Vec<Action> {
    tx.timers.e.arm(interval, ctx.now);
    trace!(id = %tx.id, next = ?interval, "Retransmitting request");

    let request = tx.request.clone();
    vec![
        send(tx, request.clone()),
        notify(NotificationKind::RequestSentAgain, Some(&request)),
    ]
}

fn receive_final(tx: &mut Transaction, response: &SipMessage, ctx: &FsmContext<'_>) -> Vec<Action> {
    tx.timers.e.disarm();
    tx.timers.f.disarm();
    tx.timers.k.arm(ctx.timers.timer_k(tx.reliable), ctx.now);
    tx.last_response = Some(response.clone());
    tx.state = TransactionState::Completed;

    let status = response.status().unwrap_or(500);
    vec![notify(NotificationKind::received_for(status), Some(response))]
}
