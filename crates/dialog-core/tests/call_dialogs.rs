//! Call and dialog lifecycle tests
//!
//! Dialogs are created and confirmed by the responses of the INVITE that roots
//! a call, on both the UAC and the UAS side.

mod common;

use tokio::time::Instant;

use common::*;
use sipstate_dialog_core::call::{find_last_out_invite, Direction, OwnerRef};
use sipstate_dialog_core::config::EngineConfig;
use sipstate_dialog_core::dialog::{DialogId, DialogState};
use sipstate_dialog_core::events::{DialogNotification, EngineEvent};
use sipstate_dialog_core::message::{generate_branch, Method, SipMessage, Via};
use sipstate_dialog_core::transaction::{SipEvent, TransactionId};
use sipstate_dialog_core::transport::Destination;
use sipstate_dialog_core::DialogError;

fn created_dialog(events: &[EngineEvent]) -> Option<(OwnerRef, DialogId)> {
    events.iter().find_map(|event| match event {
        EngineEvent::Dialog {
            owner,
            dialog,
            notification: DialogNotification::Created,
            ..
        } => Some((*owner, *dialog)),
        _ => None,
    })
}

/// An incoming INVITE owned by a new call, answered with 180 and 200
fn answered_call(
    engine: &mut sipstate_dialog_core::manager::Engine,
    events: &mut tokio::sync::mpsc::UnboundedReceiver<EngineEvent>,
    t0: Instant,
) -> anyhow::Result<(TransactionId, OwnerRef, DialogId)> {
    let invite = incoming_request(Method::Invite, 1, "z9hG4bKuas1");
    engine.fifo().add(SipEvent::incoming(invite.clone(), bob()))?;
    engine.execute_at(t0);
    let id = drain(events)
        .iter()
        .find_map(EngineEvent::transaction_id)
        .ok_or_else(|| anyhow::anyhow!("no INVITE notification"))?;
    let call = engine.new_call(id)?;
    assert_eq!(engine.call(call).and_then(|c| c.root_incoming), Some(id));

    engine.send_response(id, answer(&invite, 180, Some("alice-uas")))?;
    engine.execute_at(t0);
    let (owner, dialog) = created_dialog(&drain(events)).ok_or_else(|| anyhow::anyhow!("no dialog"))?;
    assert_eq!(owner, OwnerRef::Call(call));
    assert_eq!(engine.dialog(owner, dialog)?.state, DialogState::Early);

    engine.send_response(id, answer(&invite, 200, Some("alice-uas")))?;
    engine.execute_at(t0);
    Ok((id, owner, dialog))
}

#[tokio::test]
async fn uac_dialog_follows_provisional_and_final_response() -> anyhow::Result<()> {
    let (mut engine, mut events, transport) = engine();
    let invite = outgoing_request(Method::Invite, 1);
    let id = engine.create_client_transaction(invite.clone())?;
    let call = engine.new_call(id)?;
    assert!(matches!(engine.new_call(id), Err(DialogError::WrongState { .. })));
    engine.send_request(id)?;
    engine.execute();

    engine.fifo().add(SipEvent::incoming(answer_from_bob(&invite, 180), bob()))?;
    engine.execute();
    let after_ringing = drain(&mut events);
    let (owner, dialog) = created_dialog(&after_ringing).ok_or_else(|| anyhow::anyhow!("no dialog"))?;
    assert_eq!(owner, OwnerRef::Call(call));
    assert!(dialog.0 > 0);

    {
        let early = engine.dialog(owner, dialog)?;
        assert_eq!(early.state, DialogState::Early);
        assert_eq!(early.local_tag.as_deref(), Some(ALICE_TAG));
        assert_eq!(early.remote_tag.as_deref(), Some(BOB_TAG));
        assert_eq!(early.remote_target.host, "192.0.2.4");
        // the root INVITE moved into the dialog
        assert_eq!(early.outgoing, vec![id]);
    }
    let aggregate = engine.call(call).ok_or_else(|| anyhow::anyhow!("call gone"))?;
    assert_eq!(aggregate.root_outgoing, None);

    engine.fifo().add(SipEvent::incoming(answer_from_bob(&invite, 200), bob()))?;
    engine.execute();
    let kinds = dialog_kinds(&drain(&mut events));
    assert_eq!(kinds, vec![DialogNotification::Confirmed]);
    let confirmed = engine.dialog(owner, dialog)?;
    assert_eq!(confirmed.state, DialogState::Confirmed);
    // the terminated INVITE left the dialog when it was killed
    assert!(confirmed.outgoing.is_empty());
    assert!(engine.owner_of(id).is_none());

    // ACK for the 2xx goes to the remote target, then a retransmitted 2xx
    // gets the same ACK again
    let ack = SipMessage::request(Method::Ack, "sip:bob@192.0.2.4".parse()?)
        .with_via(Via::new("UDP", "pc33.atlanta.com", None, &generate_branch()))
        .with_from(format!("<sip:alice@atlanta.com>;tag={ALICE_TAG}").parse()?)
        .with_to(format!("<sip:bob@biloxi.com>;tag={BOB_TAG}").parse()?)
        .with_call_id(CALL_ID)
        .with_cseq(1, Method::Ack);
    engine.send_dialog_ack(owner, dialog, ack)?;
    let sent = transport.count();
    assert_eq!(transport.sent()[sent - 1].host, "192.0.2.4");

    engine.fifo().add(SipEvent::incoming(answer_from_bob(&invite, 200), bob()))?;
    engine.execute();
    assert_eq!(transport.count(), sent + 1);
    assert_eq!(transport.sent()[sent].start_line(), "ACK sip:bob@192.0.2.4 SIP/2.0");
    assert_eq!(dialog_kinds(&drain(&mut events)), vec![DialogNotification::AckRetransmitted]);
    Ok(())
}

#[tokio::test]
async fn uas_dialog_retransmits_200_until_ack() -> anyhow::Result<()> {
    let (mut engine, mut events, transport) = engine();
    let t0 = Instant::now();
    let (id, owner, dialog) = answered_call(&mut engine, &mut events, t0)?;
    assert_eq!(dialog_kinds(&drain(&mut events)), vec![DialogNotification::Confirmed]);
    assert!(engine.transaction(id).is_none());
    assert_eq!(engine.dialog(owner, dialog)?.state, DialogState::Confirmed);
    let answered = transport.count();

    // first retransmission after the initial interval, then doubling
    assert_eq!(engine.timers_execute(t0 + ms(999)), 0);
    engine.timers_execute(t0 + ms(1_000));
    assert_eq!(transport.count(), answered + 1);
    engine.timers_execute(t0 + ms(2_999));
    assert_eq!(transport.count(), answered + 1);
    engine.timers_execute(t0 + ms(3_000));
    assert_eq!(transport.count(), answered + 2);
    assert_eq!(transport.sent()[answered].start_line(), "SIP/2.0 200 OK");
    assert_eq!(transport.sent()[answered].host, "192.0.2.4");

    // the ACK for a 2xx has its own branch and ends the retransmissions
    let ack = incoming_request(Method::Ack, 1, "z9hG4bKack1")
        .with_to("<sip:alice@atlanta.com>;tag=alice-uas".parse()?);
    engine.fifo().add(SipEvent::incoming(ack, bob()))?;
    engine.execute_at(t0 + ms(3_100));

    engine.timers_execute(t0 + ms(20_000));
    assert_eq!(transport.count(), answered + 2);
    assert_eq!(
        dialog_kinds(&drain(&mut events)),
        vec![
            DialogNotification::OkRetransmitted,
            DialogNotification::OkRetransmitted,
            DialogNotification::AckReceived
        ]
    );
    Ok(())
}

#[tokio::test]
async fn retransmitted_invite_gets_the_stored_200() -> anyhow::Result<()> {
    let (mut engine, mut events, transport) = engine();
    let t0 = Instant::now();
    let (id, owner, dialog) = answered_call(&mut engine, &mut events, t0)?;
    drain(&mut events);
    assert!(engine.transaction(id).is_none());
    let answered = transport.count();

    // same branch and CSeq, still without a To tag
    let invite = incoming_request(Method::Invite, 1, "z9hG4bKuas1");
    engine.fifo().add(SipEvent::incoming(invite, bob()))?;
    engine.execute_at(t0 + ms(300));

    assert_eq!(engine.transaction_count(), 0);
    assert_eq!(transport.count(), answered + 1);
    assert_eq!(transport.sent()[answered].start_line(), "SIP/2.0 200 OK");
    assert_eq!(transport.sent()[answered].host, "192.0.2.4");
    let after = drain(&mut events);
    assert!(transaction_kinds(&after).is_empty());
    assert_eq!(dialog_kinds(&after), vec![DialogNotification::OkRetransmitted]);
    assert_eq!(engine.dialog(owner, dialog)?.state, DialogState::Confirmed);
    Ok(())
}

#[tokio::test]
async fn busy_fifo_does_not_stall_200_retransmission() -> anyhow::Result<()> {
    let (mut engine, mut events, transport) = engine_with(EngineConfig::default().with_fifo_capacity(1));
    let t0 = Instant::now();
    answered_call(&mut engine, &mut events, t0)?;
    drain(&mut events);

    let options = engine.create_client_transaction(outgoing_request(Method::Options, 2))?;
    engine.send_request(options)?;
    engine.execute_at(t0);
    let queued = engine.create_client_transaction(outgoing_request(Method::Options, 3))?;
    engine.send_request(queued)?;
    let sent = transport.count();

    // Timer E is due but the fifo is full; the 200 OK still goes out
    assert_eq!(engine.timers_execute(t0 + ms(1_000)), 0);
    assert_eq!(transport.count(), sent + 1);
    assert_eq!(transport.sent()[sent].start_line(), "SIP/2.0 200 OK");
    assert_eq!(dialog_kinds(&drain(&mut events)), vec![DialogNotification::OkRetransmitted]);
    Ok(())
}

#[tokio::test]
async fn uas_dialog_gives_up_without_ack() -> anyhow::Result<()> {
    let (mut engine, mut events, transport) = engine();
    let t0 = Instant::now();
    let (_id, owner, dialog) = answered_call(&mut engine, &mut events, t0)?;
    drain(&mut events);
    let answered = transport.count();

    engine.timers_execute(t0 + ms(1_000));
    engine.timers_execute(t0 + ms(32_000));
    engine.timers_execute(t0 + ms(40_000));
    assert_eq!(transport.count(), answered + 1);
    assert_eq!(
        dialog_kinds(&drain(&mut events)),
        vec![DialogNotification::OkRetransmitted, DialogNotification::AckTimeout]
    );

    // the application decides what to do with the dialog
    engine.free_dialog(owner, dialog)?;
    assert_eq!(dialog_kinds(&drain(&mut events)), vec![DialogNotification::Terminated]);
    assert!(engine.dialog(owner, dialog).unwrap_err().is_not_found());
    assert!(engine.free_dialog(owner, dialog).unwrap_err().is_not_found());
    Ok(())
}

#[tokio::test]
async fn bye_closes_the_dialog() -> anyhow::Result<()> {
    let (mut engine, mut events, _transport) = engine();
    let t0 = Instant::now();
    let (_id, owner, dialog) = answered_call(&mut engine, &mut events, t0)?;
    drain(&mut events);

    let bye = incoming_request(Method::Bye, 2, "z9hG4bKbye1")
        .with_to("<sip:alice@atlanta.com>;tag=alice-uas".parse()?);
    engine.fifo().add(SipEvent::incoming(bye.clone(), bob()))?;
    engine.execute_at(t0 + ms(100));

    let bye_id = drain(&mut events)
        .iter()
        .find_map(EngineEvent::transaction_id)
        .ok_or_else(|| anyhow::anyhow!("no BYE notification"))?;
    let closing = engine.dialog(owner, dialog)?;
    assert_eq!(closing.state, DialogState::Closing);
    assert_eq!(closing.remote_cseq, 2);
    assert!(closing.incoming.contains(&bye_id));
    assert_eq!(engine.owner_of(bye_id), Some(owner));

    engine.send_response(bye_id, answer(&bye, 200, None))?;
    engine.execute_at(t0 + ms(200));
    engine.free_dialog(owner, dialog)?;
    // BYE is still in Completed, so it waits on the pending-free list
    assert!(engine.transaction(bye_id).is_some());
    engine.timers_execute(t0 + ms(32_200));
    engine.execute_at(t0 + ms(32_200));
    assert!(engine.transaction(bye_id).is_none());
    Ok(())
}

#[tokio::test]
async fn out_of_order_request_is_rejected_outside_the_dialog() -> anyhow::Result<()> {
    let (mut engine, mut events, transport) = engine();
    let t0 = Instant::now();
    let (_id, owner, dialog) = answered_call(&mut engine, &mut events, t0)?;
    drain(&mut events);
    let answered = transport.count();

    let info = incoming_request(Method::Info, 5, "z9hG4bKinfo5")
        .with_to("<sip:alice@atlanta.com>;tag=alice-uas".parse()?);
    engine.fifo().add(SipEvent::incoming(info, bob()))?;
    engine.execute_at(t0 + ms(100));
    let accepted = drain(&mut events)
        .iter()
        .find_map(EngineEvent::transaction_id)
        .ok_or_else(|| anyhow::anyhow!("no INFO notification"))?;
    assert_eq!(engine.dialog(owner, dialog)?.remote_cseq, 5);

    let stale = incoming_request(Method::Info, 3, "z9hG4bKinfo3")
        .with_to("<sip:alice@atlanta.com>;tag=alice-uas".parse()?);
    engine.fifo().add(SipEvent::incoming(stale, bob()))?;
    engine.execute_at(t0 + ms(200));

    // answered with a 500 and never reaches the application
    assert!(drain(&mut events).is_empty());
    assert_eq!(engine.transaction_count(), 1);
    assert_eq!(transport.count(), answered + 1);
    assert!(transport.sent()[answered].start_line().starts_with("SIP/2.0 500"));
    assert_eq!(transport.sent()[answered].host, "192.0.2.4");
    let unchanged = engine.dialog(owner, dialog)?;
    assert_eq!(unchanged.remote_cseq, 5);
    assert_eq!(unchanged.incoming, vec![accepted]);
    Ok(())
}

#[tokio::test]
async fn forked_2xx_opens_a_second_dialog() -> anyhow::Result<()> {
    let (mut engine, mut events, transport) = engine();
    let invite = outgoing_request(Method::Invite, 1);
    let id = engine.create_client_transaction(invite.clone())?;
    let call = engine.new_call(id)?;
    engine.send_request(id)?;
    engine.execute();

    engine.fifo().add(SipEvent::incoming(answer_from_bob(&invite, 200), bob()))?;
    engine.execute();
    let (owner, first) = created_dialog(&drain(&mut events)).ok_or_else(|| anyhow::anyhow!("no dialog"))?;
    assert!(engine.transaction(id).is_none());

    // another UAS answers the same INVITE after the transaction ended
    let other = Destination::new("192.0.2.9", 5060);
    let fork = answer(&invite, 200, Some("fork-b")).with_contact("<sip:bob@192.0.2.9>".parse()?);
    engine.fifo().add(SipEvent::incoming(fork.clone(), other.clone()))?;
    engine.execute();
    let (fork_owner, second) =
        created_dialog(&drain(&mut events)).ok_or_else(|| anyhow::anyhow!("no forked dialog"))?;
    assert_eq!(fork_owner, owner);
    assert_ne!(second, first);
    assert_eq!(engine.call(call).map(|c| c.dialogs.len()), Some(2));

    let forked = engine.dialog(owner, second)?;
    assert_eq!(forked.state, DialogState::Confirmed);
    assert_eq!(forked.local_tag.as_deref(), Some(ALICE_TAG));
    assert_eq!(forked.remote_tag.as_deref(), Some("fork-b"));
    assert_eq!(forked.remote_target.host, "192.0.2.9");

    // the new leg is acknowledged like the first one
    let ack = SipMessage::request(Method::Ack, "sip:bob@192.0.2.9".parse()?)
        .with_via(Via::new("UDP", "pc33.atlanta.com", None, &generate_branch()))
        .with_from(format!("<sip:alice@atlanta.com>;tag={ALICE_TAG}").parse()?)
        .with_to("<sip:bob@biloxi.com>;tag=fork-b".parse()?)
        .with_call_id(CALL_ID)
        .with_cseq(1, Method::Ack);
    engine.send_dialog_ack(owner, second, ack)?;
    let sent = transport.count();
    assert_eq!(transport.sent()[sent - 1].host, "192.0.2.9");

    engine.fifo().add(SipEvent::incoming(fork, other))?;
    engine.execute();
    assert_eq!(transport.count(), sent + 1);
    assert_eq!(dialog_kinds(&drain(&mut events)), vec![DialogNotification::AckRetransmitted]);
    Ok(())
}

#[tokio::test]
async fn cancel_kills_the_pending_incoming_invite() -> anyhow::Result<()> {
    let (mut engine, mut events, _transport) = engine();
    let invite = incoming_request(Method::Invite, 1, "z9hG4bKcan1");
    engine.fifo().add(SipEvent::incoming(invite, bob()))?;
    engine.execute();
    let id = drain(&mut events)
        .iter()
        .find_map(EngineEvent::transaction_id)
        .ok_or_else(|| anyhow::anyhow!("no INVITE notification"))?;
    let call = engine.new_call(id)?;

    assert_eq!(engine.cancel_pending_invite(call, None)?, id);
    engine.execute();
    assert_eq!(
        transaction_kinds(&drain(&mut events)),
        vec![sipstate_dialog_core::events::NotificationKind::KillTransaction]
    );
    assert!(engine.transaction(id).is_none());
    assert_eq!(engine.call(call).and_then(|c| c.root_incoming), None);
    assert!(engine.cancel_pending_invite(call, None).unwrap_err().is_not_found());
    Ok(())
}

#[tokio::test]
async fn attach_and_lookup_outgoing_reinvite() -> anyhow::Result<()> {
    let (mut engine, mut events, _transport) = engine();
    let t0 = Instant::now();
    let (_id, owner, dialog) = answered_call(&mut engine, &mut events, t0)?;
    let OwnerRef::Call(call) = owner else {
        anyhow::bail!("expected a call");
    };

    let template = engine.dialog_mut(owner, dialog)?.create_request_template(Method::Invite);
    assert_eq!(template.cseq_number, 2);
    let reinvite = template.into_request(Via::new("UDP", "pc33.atlanta.com", None, &generate_branch()));
    let tx = engine.create_client_transaction(reinvite)?;
    engine.attach_to_dialog(owner, dialog, tx, Direction::Outgoing)?;
    assert_eq!(engine.owner_of(tx), Some(owner));

    let aggregate = engine.call(call).ok_or_else(|| anyhow::anyhow!("call gone"))?;
    let index = std::collections::HashMap::from([(
        tx,
        engine.transaction(tx).cloned().ok_or_else(|| anyhow::anyhow!("tx gone"))?,
    )]);
    assert_eq!(find_last_out_invite(aggregate, &index, Some(dialog)), Some(tx));
    assert_eq!(find_last_out_invite(aggregate, &index, Some(DialogId(99))), None);

    engine.remove_call(call)?;
    assert!(engine.call(call).is_none());
    assert!(engine.owner_of(tx).is_none());
    assert!(matches!(
        engine.attach_to_dialog(owner, dialog, tx, Direction::Outgoing),
        Err(DialogError::NotFound { .. })
    ));
    Ok(())
}
