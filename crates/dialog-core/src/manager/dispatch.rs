//! Event dispatch
//!
//! One `execute` cycle drains the fifo. Each event is resolved to a
//! transaction (by id, by RFC 3261 matching, or by creating a server
//! transaction for a new request), run through its state machine, and the
//! resulting actions are carried out in order. Transactions killed during the
//! cycle are freed by [`Engine::reap`] after it, never inside their own
//! handler.

use tokio::time::Instant;
use tracing::{debug, error, trace, warn};

use crate::call::{find_dialog_by_id_mut, remove_transaction_from_call, OwnerRef};
use crate::dialog::{Dialog, DialogId};
use crate::errors::{DialogError, DialogResult};
use crate::events::{DialogNotification, NotificationKind};
use crate::message::{Method, SipMessage};
use crate::transaction::{
    fsm, resolve_destination, response_destination, Action, FsmContext, SipEvent, TransactionId, TransactionKind,
    TransactionState,
};
use crate::transport::Destination;

use super::Engine;

impl Engine {
    /// Drain the fifo and reap, using the current time
    pub fn execute(&mut self) -> usize {
        self.execute_at(Instant::now())
    }

    /// Drain the fifo, then reap; returns the number of events processed
    pub fn execute_at(&mut self, now: Instant) -> usize {
        let mut processed = 0;
        while let Some(event) = self.fifo.tryget() {
            processed += 1;
            let event_type = event.event_type;
            if let Err(e) = self.handle_event(event, now) {
                warn!(?event_type, error = %e, "Event dropped");
            }
        }
        self.reap();
        processed
    }

    /// Free terminated transactions on the pending-free list
    ///
    /// Entries that are still running stay queued for the next cycle.
    pub fn reap(&mut self) -> usize {
        let pending = std::mem::take(&mut self.pending_free);
        let mut freed = 0;
        for id in pending {
            match self.transactions.get(&id) {
                Some(tx) if tx.is_terminated() => {
                    self.transactions.remove(&id);
                    freed += 1;
                }
                Some(_) => {
                    if !self.pending_free.contains(&id) {
                        self.pending_free.push(id);
                    }
                }
                None => {}
            }
        }
        if freed > 0 {
            trace!(freed, pending = self.pending_free.len(), "Reaped transactions");
        }
        freed
    }

    fn handle_event(&mut self, event: SipEvent, now: Instant) -> DialogResult<()> {
        let id = match event.transaction_id {
            Some(id) => id,
            None => match self.match_incoming(&event) {
                Some(id) => id,
                None => return self.handle_unmatched(event, now),
            },
        };
        self.dispatch(id, &event, now)
    }

    /// Find the live transaction a network message belongs to
    fn match_incoming(&self, event: &SipEvent) -> Option<TransactionId> {
        let message = event.message.as_ref()?;
        let found = if message.is_response() {
            self.transactions
                .values()
                .find(|tx| !tx.is_terminated() && tx.matches_response(message))
        } else {
            self.transactions
                .values()
                .find(|tx| !tx.is_terminated() && tx.matches_request(message))
        };
        found.map(|tx| tx.id)
    }

    fn handle_unmatched(&mut self, event: SipEvent, now: Instant) -> DialogResult<()> {
        let Some(message) = event.message else {
            return Ok(());
        };
        if message.is_response() {
            if message.is_success() {
                self.stray_success(&message);
            } else {
                debug!(message = %message.summary(), "Dropping stray response");
            }
            return Ok(());
        }
        if message.method() == Some(&Method::Ack) {
            self.stray_ack(&message);
            return Ok(());
        }
        if message.method() == Some(&Method::Invite) && self.answered_invite(&message) {
            return Ok(());
        }

        let in_dialog = match self.track_remote_cseq(&message) {
            Ok(found) => found,
            Err(e) => {
                self.reject_out_of_order(&message, event.source.as_ref(), &e);
                return Ok(());
            }
        };
        let id = self.insert_server_transaction(message.clone(), event.source.as_ref())?;
        match in_dialog {
            Some((owner, dialog)) => self.attach_incoming_request(id, owner, dialog, &message),
            None if message.method() == Some(&Method::Notify) => self.notify_before_answer(id, &message),
            None => {}
        }
        let incoming = SipEvent {
            event_type: event.event_type,
            transaction_id: Some(id),
            message: Some(message),
            source: event.source,
        };
        self.dispatch(id, &incoming, now)
    }

    /// An INVITE we already answered with a 2xx, retransmitted after its
    /// server transaction ended; resend the stored 2xx instead
    fn answered_invite(&mut self, invite: &SipMessage) -> bool {
        let (Some(call_id), Some(seq)) = (invite.call_id.as_deref(), invite.cseq.as_ref().map(|c| c.seq)) else {
            return false;
        };
        let mut stored = None;
        for owner in self.owner_refs() {
            let Ok(aggregate) = self.owner(owner) else { continue };
            let answered = aggregate.dialogs().iter().find(|d| {
                !d.is_initiator
                    && d.call_id == call_id
                    && d.remote_tag.as_deref() == invite.from_tag()
                    && d.remote_cseq == seq
                    && d.ok_response.is_some()
            });
            if let Some(dialog) = answered {
                stored = Some((owner, dialog.id, dialog.ok_response.clone(), dialog.ok_destination.clone()));
                break;
            }
        }
        let Some((owner, dialog, Some(ok), destination)) = stored else {
            return false;
        };
        let Some(destination) = destination else {
            warn!(%owner, %dialog, "200 OK stored without destination");
            return true;
        };
        match self.transmit(&ok, &destination) {
            Ok(()) => {
                trace!(%owner, %dialog, "Resent 200 OK for retransmitted INVITE");
                self.emit_dialog(owner, dialog, DialogNotification::OkRetransmitted, Some(ok));
            }
            Err(e) => error!(%owner, %dialog, error = %e, "Failed to resend 200 OK"),
        }
        true
    }

    /// Find the dialog of an in-dialog request and take its CSeq
    fn track_remote_cseq(&mut self, request: &SipMessage) -> DialogResult<Option<(OwnerRef, DialogId)>> {
        for owner in self.owner_refs() {
            let Ok(aggregate) = self.owner_mut(owner) else { continue };
            let Some(dialog) = aggregate.dialogs_mut().iter_mut().find(|d| d.matches_request(request)) else {
                continue;
            };
            dialog.update_remote_cseq(request)?;
            return Ok(Some((owner, dialog.id)));
        }
        Ok(None)
    }

    /// Answer an out of order in-dialog request with a 500 (RFC 3261 section 12.2.2)
    ///
    /// No transaction is created for it.
    fn reject_out_of_order(&self, request: &SipMessage, source: Option<&Destination>, reason: &DialogError) {
        warn!(message = %request.summary(), error = %reason, "Rejecting out of order in-dialog request");
        let sent = SipMessage::response_for(request, 500).and_then(|response| {
            let destination = response_destination(request, source, self.config.default_port)?;
            self.transmit(&response, &destination)
        });
        if let Err(e) = sent {
            error!(message = %request.summary(), error = %e, "Failed to reject request");
        }
    }

    /// An ACK for a 2xx is its own transaction-less message; it ends the
    /// dialog's 200 OK retransmission
    fn stray_ack(&mut self, ack: &SipMessage) {
        let mut acked = None;
        for owner in self.owner_refs() {
            let Ok(aggregate) = self.owner_mut(owner) else { continue };
            if let Some(dialog) = aggregate.dialogs_mut().iter_mut().find(|d| d.matches_request(ack)) {
                if dialog.ack_received() {
                    acked = Some((owner, dialog.id));
                }
                break;
            }
        }
        match acked {
            Some((owner, dialog)) => {
                debug!(%owner, %dialog, "ACK received for 200 OK");
                self.emit_dialog(owner, dialog, DialogNotification::AckReceived, Some(ack.clone()));
            }
            None => trace!(message = %ack.summary(), "Dropping stray ACK"),
        }
    }

    /// A 2xx after the INVITE transaction ended
    ///
    /// A retransmission gets our ACK again; a 2xx from another fork of one of
    /// our calls opens a dialog of its own.
    fn stray_success(&mut self, response: &SipMessage) {
        let mut matched = None;
        for owner in self.owner_refs() {
            let Ok(aggregate) = self.owner(owner) else { continue };
            if let Some(dialog) = aggregate.dialogs().iter().find(|d| d.matches_response(response)) {
                let stored = dialog.ack.clone().zip(dialog.ack_destination.clone());
                matched = Some((owner, dialog.id, stored));
                break;
            }
        }
        let (owner, dialog, ack, destination) = match matched {
            Some((owner, dialog, Some((ack, destination)))) => (owner, dialog, ack, destination),
            Some((owner, dialog, None)) => {
                debug!(%owner, %dialog, "2xx retransmitted before our ACK");
                return;
            }
            None => {
                match self.forking_call(response) {
                    Some(owner) => self.forked_success(owner, response),
                    None => debug!(message = %response.summary(), "Dropping stray 2xx"),
                }
                return;
            }
        };
        match self.transmit(&ack, &destination) {
            Ok(()) => {
                trace!(%owner, %dialog, "Resent ACK for retransmitted 2xx");
                self.emit_dialog(owner, dialog, DialogNotification::AckRetransmitted, Some(response.clone()));
            }
            Err(e) => error!(%owner, %dialog, error = %e, "Failed to resend ACK"),
        }
    }

    /// The call whose INVITE a 2xx answers, judged by Call-ID and our From tag
    fn forking_call(&self, response: &SipMessage) -> Option<OwnerRef> {
        if response.cseq_method() != Some(&Method::Invite) {
            return None;
        }
        let call_id = response.call_id.as_deref()?;
        let local_tag = response.from_tag()?;
        self.calls
            .values()
            .find(|call| {
                call.call_id == call_id
                    && (call
                        .dialogs
                        .iter()
                        .any(|d| d.is_initiator && d.local_tag.as_deref() == Some(local_tag))
                        || call
                            .root_outgoing
                            .and_then(|id| self.transactions.get(&id))
                            .is_some_and(|tx| tx.request.from_tag() == Some(local_tag)))
            })
            .map(|call| OwnerRef::Call(call.id))
    }

    fn forked_success(&mut self, owner: OwnerRef, response: &SipMessage) {
        let dialog = match Dialog::init_as_uac(response) {
            Ok(dialog) => dialog,
            Err(e) => {
                warn!(%owner, error = %e, "Forked 2xx cannot create a dialog");
                return;
            }
        };
        let dialog = match self.owner_mut(owner) {
            Ok(aggregate) => aggregate.add_dialog(dialog),
            Err(e) => {
                warn!(%owner, error = %e, "Call gone before forked 2xx");
                return;
            }
        };
        debug!(%owner, %dialog, "Dialog created by forked 2xx");
        self.emit_dialog(owner, dialog, DialogNotification::Created, Some(response.clone()));
    }

    /// Send the ACK for a 2xx we received and keep it for retransmitted 2xx
    pub fn send_dialog_ack(&mut self, owner: OwnerRef, dialog: DialogId, ack: SipMessage) -> DialogResult<()> {
        if ack.method() != Some(&Method::Ack) {
            return Err(DialogError::bad_parameter("send_dialog_ack needs an ACK"));
        }
        let destination = resolve_destination(&ack, None, self.config.default_port)?;
        // look the dialog up first so a bad id sends nothing
        self.dialog(owner, dialog)?;
        self.transmit(&ack, &destination)?;
        self.dialog_mut(owner, dialog)?.set_ack(ack, destination);
        Ok(())
    }

    pub(super) fn owner_refs(&self) -> Vec<OwnerRef> {
        self.calls
            .keys()
            .map(|&id| OwnerRef::Call(id))
            .chain(self.subscribes.keys().map(|&id| OwnerRef::Subscribe(id)))
            .collect()
    }

    pub(super) fn transmit(&self, message: &SipMessage, destination: &Destination) -> DialogResult<()> {
        let transport = self.hooks.current();
        transport.send_to(&message.to_bytes(), &destination.host, destination.port)?;
        Ok(())
    }

    fn dispatch(&mut self, id: TransactionId, event: &SipEvent, now: Instant) -> DialogResult<()> {
        let ctx = FsmContext {
            now,
            timers: &self.timer_settings,
            default_port: self.config.default_port,
        };
        let tx = self
            .transactions
            .get_mut(&id)
            .ok_or_else(|| DialogError::not_found(format!("{id} unknown")))?;
        let kind = tx.kind;
        let before = tx.state;
        let actions = fsm::transition(tx, event, &ctx);
        let after = tx.state;

        if before != after {
            match TransactionState::validate_transition(kind, before, after) {
                Ok(()) => debug!(%id, kind = kind.abbreviation(), from = %before, to = %after, "Transaction state changed"),
                Err(reason) => error!(%id, kind = kind.abbreviation(), %reason, "Invalid transaction transition"),
            }
        }
        if actions.is_empty() {
            trace!(%id, event = ?event.event_type, state = %after, "Event ignored");
            return Ok(());
        }

        self.update_dialogs(id, event, now);
        self.run_actions(id, kind, actions);
        Ok(())
    }

    fn run_actions(&mut self, id: TransactionId, kind: TransactionKind, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Send { message, destination } => {
                    if let Err(e) = self.transmit(&message, &destination) {
                        error!(%id, dest = %destination, error = %e, "Transport send failed");
                        if let Some(tx) = self.transactions.get_mut(&id) {
                            tx.timers.cancel_all();
                            tx.state = TransactionState::Terminated;
                        }
                        self.emit_transaction(id, kind, NotificationKind::TransportError, Some(message));
                        self.kill(id, kind);
                        return;
                    }
                }
                Action::Notify { kind: notification, message } => {
                    self.emit_transaction(id, kind, notification, message);
                }
                Action::Kill => self.kill(id, kind),
            }
        }
    }

    /// Report the kill, detach from the owner and queue for reaping
    fn kill(&mut self, id: TransactionId, kind: TransactionKind) {
        self.emit_transaction(id, kind, NotificationKind::KillTransaction, None);
        if let Some(owner) = self.owners.remove(&id) {
            match self.owner_mut(owner) {
                Ok(aggregate) => {
                    if let Err(e) = remove_transaction_from_call(id, aggregate) {
                        warn!(%id, %owner, error = %e, "Owner lost track of transaction");
                    }
                }
                Err(e) => warn!(%id, error = %e, "Owner already gone"),
            }
        }
        self.pending_free.push(id);
    }

    /// Put an in-dialog request into its dialog
    fn attach_incoming_request(
        &mut self,
        id: TransactionId,
        owner: OwnerRef,
        dialog: DialogId,
        request: &SipMessage,
    ) {
        let attached = self.owner_mut(owner).and_then(|aggregate| {
            let target = find_dialog_by_id_mut(aggregate, dialog)?;
            target.incoming.push(id);
            if request.method() == Some(&Method::Bye) {
                target.set_closing();
            }
            Ok(())
        });
        match attached {
            Ok(()) => {
                self.owners.insert(id, owner);
                trace!(%id, %owner, %dialog, "In-dialog request");
            }
            Err(e) => warn!(%id, %owner, %dialog, error = %e, "In-dialog request left unowned"),
        }
    }
}
