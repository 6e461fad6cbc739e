//! INVITE client transaction (RFC 3261 section 17.1.1)

use tracing::{debug, trace, warn};

use crate::events::NotificationKind;
use crate::message::SipMessage;
use crate::transaction::ack::create_ack;
use crate::transaction::destination::resolve_destination;
use crate::transaction::{EventType, SipEvent, Transaction, TransactionState};

use super::{notify, send, terminate, time_out, Action, FsmContext};

pub(super) fn transition(tx: &mut Transaction, event: &SipEvent, ctx: &FsmContext<'_>) -> Vec<Action> {
    use EventType::*;
    use TransactionState::*;

    let message = event.message.as_ref();
    match (tx.state, event.event_type, message) {
        (Initial, SndInvite, _) => send_invite(tx, ctx),
        (Calling, TimeoutA, _) => retransmit_invite(tx, ctx),
        (Calling, TimeoutB, _) => {
            warn!(id = %tx.id, "Timer B fired, INVITE timed out");
            time_out(tx)
        }
        (Calling | Proceeding, Rcv1xx, Some(response)) => receive_provisional(tx, response),
        (Calling | Proceeding, Rcv2xx, Some(response)) => receive_success(tx, response),
        (Calling | Proceeding, Rcv3456xx, Some(response)) => receive_failure(tx, response, ctx),
        (Completed, Rcv3456xx, Some(response)) => resend_ack(tx, response),
        (Completed, TimeoutD, _) => {
            debug!(id = %tx.id, "Timer D fired");
            terminate(tx)
        }
        _ => Vec::new(),
    }
}

fn send_invite(tx: &mut Transaction, ctx: &FsmContext<'_>) -> Vec<Action> {
    if !tx.reliable {
        tx.timers.a.arm(ctx.timers.t1, ctx.now);
    }
    tx.timers.b.arm(ctx.timers.transaction_timeout(), ctx.now);
    tx.state = TransactionState::Calling;
    debug!(id = %tx.id, dest = %tx.destination, reliable = tx.reliable, "ICT sending INVITE");

    let invite = tx.request.clone();
    vec![
        send(tx, invite.clone()),
        notify(NotificationKind::InviteSent, Some(&invite)),
    ]
}

fn retransmit_invite(tx: &mut Transaction, ctx: &FsmContext<'_>) -> Vec<Action> {
    let interval = tx.timers.a.length.unwrap_or(ctx.timers.t1) * 2;
    tx.timers.a.arm(interval, ctx.now);
    trace!(id = %tx.id, next = ?interval, "Retransmitting INVITE");

    let invite = tx.request.clone();
    vec![
        send(tx, invite.clone()),
        notify(NotificationKind::InviteSentAgain, Some(&invite)),
    ]
}

fn stop_calling_timers(tx: &mut Transaction) {
    tx.timers.a.disarm();
    tx.timers.b.disarm();
}

fn receive_provisional(tx: &mut Transaction, response: &SipMessage) -> Vec<Action> {
    stop_calling_timers(tx);
    tx.last_response = Some(response.clone());
    tx.state = TransactionState::Proceeding;
    vec![notify(NotificationKind::Status1xxReceived, Some(response))]
}

/// The ACK for a 2xx belongs to the dialog, not to this transaction
fn receive_success(tx: &mut Transaction, response: &SipMessage) -> Vec<Action> {
    stop_calling_timers(tx);
    tx.last_response = Some(response.clone());
    let mut actions = vec![notify(NotificationKind::Status2xxReceived, Some(response))];
    actions.extend(terminate(tx));
    actions
}

fn receive_failure(tx: &mut Transaction, response: &SipMessage, ctx: &FsmContext<'_>) -> Vec<Action> {
    let built = create_ack(&tx.request, response).and_then(|ack| {
        let destination = resolve_destination(&ack, Some(&tx.destination), ctx.default_port)?;
        Ok((ack, destination))
    });
    let (ack, destination) = match built {
        Ok(built) => built,
        Err(e) => {
            warn!(id = %tx.id, error = %e, "Dropping malformed final response");
            return Vec::new();
        }
    };

    stop_calling_timers(tx);
    tx.last_response = Some(response.clone());
    tx.ack = Some(ack.clone());
    tx.timers.d.arm(ctx.timers.timer_d(tx.reliable), ctx.now);
    tx.state = TransactionState::Completed;

    let status = response.status().unwrap_or(500);
    debug!(id = %tx.id, status, dest = %destination, "Final failure, sending ACK");
    vec![
        Action::Send {
            message: ack.clone(),
            destination,
        },
        notify(NotificationKind::received_for(status), Some(response)),
        notify(NotificationKind::AckSent, Some(&ack)),
    ]
}

/// Only a final response of the class we acknowledged is a retransmission
fn resend_ack(tx: &mut Transaction, response: &SipMessage) -> Vec<Action> {
    let acked_class = tx.last_response.as_ref().and_then(SipMessage::status_class);
    if acked_class != response.status_class() {
        debug!(id = %tx.id, status = ?response.status(), "Ignoring final response of another class");
        return Vec::new();
    }
    let Some(ack) = tx.ack.clone() else {
        return Vec::new();
    };
    trace!(id = %tx.id, "Duplicate final response, resending ACK");
    vec![
        send(tx, ack.clone()),
        notify(NotificationKind::AckSentAgain, Some(&ack)),
    ]
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use super::super::test_support::*;
    use super::super::FsmContext;
    use crate::events::NotificationKind::*;
    use crate::message::Method;
    use crate::transaction::timer::TimerSettings;
    use crate::transaction::{Action, EventType, TransactionState};

    #[test]
    fn timer_a_doubles_while_calling() {
        let settings = TimerSettings::default();
        let start = Instant::now();
        let mut tx = client(Method::Invite, "UDP", start);

        let ctx = FsmContext { now: start, timers: &settings, default_port: 5060 };
        let actions = run(&mut tx, EventType::SndInvite, None, &ctx);
        assert_eq!(kinds(&actions), vec![InviteSent]);
        assert_eq!(tx.state, TransactionState::Calling);
        assert_eq!(tx.timers.a.length, Some(Duration::from_millis(500)));
        assert_eq!(tx.timers.b.length, Some(Duration::from_secs(32)));

        let mut expected = Duration::from_millis(500);
        let mut now = start;
        for _ in 0..5 {
            now += expected;
            assert!(tx.timers.a.take_due(now));
            let ctx = FsmContext { now, timers: &settings, default_port: 5060 };
            let actions = run(&mut tx, EventType::TimeoutA, None, &ctx);
            assert_eq!(sends(&actions), 1);
            assert_eq!(kinds(&actions), vec![InviteSentAgain]);
            expected *= 2;
            assert_eq!(tx.timers.a.length, Some(expected));
        }
    }

    #[test]
    fn reliable_transport_never_arms_timer_a() {
        let settings = TimerSettings::default();
        let now = Instant::now();
        let ctx = FsmContext { now, timers: &settings, default_port: 5060 };
        let mut tx = client(Method::Invite, "TCP", now);
        run(&mut tx, EventType::SndInvite, None, &ctx);
        assert!(!tx.timers.a.is_active());
        assert!(tx.timers.b.is_active());
    }

    #[test]
    fn timer_b_times_out() {
        let settings = TimerSettings::default();
        let now = Instant::now();
        let ctx = FsmContext { now, timers: &settings, default_port: 5060 };
        let mut tx = client(Method::Invite, "UDP", now);
        run(&mut tx, EventType::SndInvite, None, &ctx);
        let actions = run(&mut tx, EventType::TimeoutB, None, &ctx);
        assert_eq!(kinds(&actions), vec![StatusTimeout]);
        assert_eq!(kills(&actions), 1);
        assert!(tx.is_terminated());
    }

    #[test]
    fn success_terminates_once() {
        let settings = TimerSettings::default();
        let now = Instant::now();
        let ctx = FsmContext { now, timers: &settings, default_port: 5060 };
        let mut tx = client(Method::Invite, "UDP", now);
        run(&mut tx, EventType::SndInvite, None, &ctx);

        let ringing = response(&tx, 180);
        let actions = run(&mut tx, EventType::Rcv1xx, Some(ringing), &ctx);
        assert_eq!(kinds(&actions), vec![Status1xxReceived]);
        assert_eq!(tx.state, TransactionState::Proceeding);
        assert!(!tx.timers.a.is_active());

        let ok = response(&tx, 200);
        let actions = run(&mut tx, EventType::Rcv2xx, Some(ok.clone()), &ctx);
        assert_eq!(kinds(&actions), vec![Status2xxReceived]);
        assert_eq!(kills(&actions), 1);
        assert_eq!(sends(&actions), 0);
        assert!(tx.is_terminated());

        assert!(run(&mut tx, EventType::Rcv2xx, Some(ok), &ctx).is_empty());
    }

    #[test]
    fn failure_builds_and_resends_ack() {
        let settings = TimerSettings::default();
        let now = Instant::now();
        let ctx = FsmContext { now, timers: &settings, default_port: 5060 };
        let mut tx = client(Method::Invite, "UDP", now);
        run(&mut tx, EventType::SndInvite, None, &ctx);

        let busy = response(&tx, 486);
        let actions = run(&mut tx, EventType::Rcv3456xx, Some(busy.clone()), &ctx);
        assert_eq!(kinds(&actions), vec![Status4xxReceived, AckSent]);
        assert_eq!(tx.state, TransactionState::Completed);
        assert_eq!(tx.timers.d.length, Some(Duration::from_secs(32)));
        assert!(!tx.timers.a.is_active() && !tx.timers.b.is_active());

        let first_ack = match &actions[0] {
            Action::Send { message, destination } => {
                assert_eq!(destination, &tx.destination);
                message.clone()
            }
            other => panic!("expected send, got {other:?}"),
        };
        assert_eq!(first_ack.cseq_method(), Some(&Method::Ack));

        let actions = run(&mut tx, EventType::Rcv3456xx, Some(busy), &ctx);
        assert_eq!(kinds(&actions), vec![AckSentAgain]);
        match &actions[0] {
            Action::Send { message, .. } => assert_eq!(message, &first_ack),
            other => panic!("expected send, got {other:?}"),
        }
        assert_eq!(tx.state, TransactionState::Completed);

        // a final response of another class is not a retransmission
        let moved = response(&tx, 302);
        assert!(run(&mut tx, EventType::Rcv3456xx, Some(moved), &ctx).is_empty());
        assert_eq!(tx.state, TransactionState::Completed);

        let actions = run(&mut tx, EventType::TimeoutD, None, &ctx);
        assert_eq!(kills(&actions), 1);
        assert!(tx.is_terminated());
    }

    #[test]
    fn reliable_timer_d_is_zero() {
        let settings = TimerSettings::default();
        let now = Instant::now();
        let ctx = FsmContext { now, timers: &settings, default_port: 5060 };
        let mut tx = client(Method::Invite, "TLS", now);
        run(&mut tx, EventType::SndInvite, None, &ctx);
        let decline = response(&tx, 603);
        let actions = run(&mut tx, EventType::Rcv3456xx, Some(decline), &ctx);
        assert_eq!(kinds(&actions), vec![Status6xxReceived, AckSent]);
        assert_eq!(tx.timers.d.length, Some(Duration::ZERO));
        assert!(tx.timers.d.is_due(now));
    }

    #[test]
    fn malformed_final_is_dropped() {
        let settings = TimerSettings::default();
        let now = Instant::now();
        let ctx = FsmContext { now, timers: &settings, default_port: 5060 };
        let mut tx = client(Method::Invite, "UDP", now);
        run(&mut tx, EventType::SndInvite, None, &ctx);
        let mut busy = response(&tx, 486);
        busy.to = None;
        assert!(run(&mut tx, EventType::Rcv3456xx, Some(busy), &ctx).is_empty());
        assert_eq!(tx.state, TransactionState::Calling);
    }
}
