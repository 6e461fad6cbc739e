//! Response Lifecycle Management
//!
//! Dialog state follows the responses of the dialog-creating transactions
//! (INVITE and SUBSCRIBE) owned by a call or subscription:
//!
//! ```text
//! UAC (we sent the request):
//!   1xx with To tag received → Early dialog (init_as_uac)
//!   2xx received             → Confirmed (new dialog, or early one updated)
//!
//! UAS (we received the request):
//!   1xx with To tag sent     → Early dialog (init_as_uas)
//!   2xx sent                 → Confirmed, 200 OK stored for retransmission
//! ```
//!
//! The first dialog created for a call takes over the root transaction. A
//! NOTIFY that arrives before the 2xx of its SUBSCRIBE creates the dialog from
//! the request.

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::call::{find_dialog_by_id_mut, remove_transaction_from_call, DialogOwner, Direction, OwnerRef};
use crate::dialog::{Dialog, DialogId, DialogState};
use crate::errors::{DialogError, DialogResult};
use crate::events::DialogNotification;
use crate::message::{Method, SipMessage};
use crate::transaction::{EventType, SipEvent, TransactionId};

use super::Engine;

impl Engine {
    /// Create or advance the dialog a response establishes
    ///
    /// Runs before the transaction's own actions, so the dialog notification
    /// precedes the transaction's.
    pub(super) fn update_dialogs(&mut self, id: TransactionId, event: &SipEvent, now: Instant) {
        let Some(owner) = self.owners.get(&id).copied() else {
            return;
        };
        let Some(response) = event.message.as_ref() else {
            return;
        };
        let Some(tx) = self.transactions.get(&id) else {
            return;
        };
        if !matches!(tx.method, Method::Invite | Method::Subscribe) {
            return;
        }
        if !matches!(response.status(), Some(101..=299)) || response.to_tag().is_none() {
            return;
        }

        let client = tx.kind.is_client();
        let result = match event.event_type {
            EventType::Rcv1xx | EventType::Rcv2xx if client => self.uac_response(owner, id, response),
            EventType::Snd1xx | EventType::Snd2xx if !client => self.uas_response(owner, id, response, now),
            _ => return,
        };
        if let Err(e) = result {
            warn!(%id, %owner, error = %e, "Dialog update failed");
        }
    }

    fn uac_response(&mut self, owner: OwnerRef, id: TransactionId, response: &SipMessage) -> DialogResult<()> {
        let aggregate = self.owner_mut(owner)?;
        let existing = aggregate
            .dialogs()
            .iter()
            .position(|d| d.matches_response(response));

        let (dialog, notification) = match existing {
            Some(pos) => {
                let dialog = &mut aggregate.dialogs_mut()[pos];
                let confirmed = dialog.update_from_2xx(response);
                (dialog.id, confirmed.then_some(DialogNotification::Confirmed))
            }
            None => {
                let dialog = Dialog::init_as_uac(response)?;
                (aggregate.add_dialog(dialog), Some(DialogNotification::Created))
            }
        };
        adopt_root(aggregate, dialog, id, Direction::Outgoing)?;

        if let Some(notification) = notification {
            debug!(%owner, %dialog, ?notification, "UAC dialog updated");
            self.emit_dialog(owner, dialog, notification, Some(response.clone()));
        }
        Ok(())
    }

    fn uas_response(
        &mut self,
        owner: OwnerRef,
        id: TransactionId,
        response: &SipMessage,
        now: Instant,
    ) -> DialogResult<()> {
        let tx = self
            .transactions
            .get(&id)
            .ok_or_else(|| DialogError::not_found(format!("{id} unknown")))?;
        let request = tx.request.clone();
        let destination = tx.destination.clone();
        let is_invite = tx.method == Method::Invite;
        let (initial, window) = (self.config.ok_initial(), self.config.ok_window());

        let aggregate = self.owner_mut(owner)?;
        let call_id = request.call_id.as_deref().unwrap_or_default();
        let existing = aggregate
            .dialogs()
            .iter()
            .position(|d| d.matches(call_id, response.to_tag(), request.from_tag()));

        let (dialog, notification) = match existing {
            Some(pos) => {
                let dialog = &mut aggregate.dialogs_mut()[pos];
                let confirmed = dialog.state == DialogState::Early && response.is_success();
                if confirmed {
                    dialog.state = DialogState::Confirmed;
                }
                (dialog.id, confirmed.then_some(DialogNotification::Confirmed))
            }
            None => {
                let dialog = Dialog::init_as_uas(&request, response)?;
                (aggregate.add_dialog(dialog), Some(DialogNotification::Created))
            }
        };
        adopt_root(aggregate, dialog, id, Direction::Incoming)?;

        if is_invite && response.is_success() {
            find_dialog_by_id_mut(aggregate, dialog)?.set_200ok(response, destination, now, initial, window)?;
        }

        if let Some(notification) = notification {
            debug!(%owner, %dialog, ?notification, "UAS dialog updated");
            self.emit_dialog(owner, dialog, notification, Some(response.clone()));
        }
        Ok(())
    }

    /// A NOTIFY for one of our SUBSCRIBEs whose 2xx has not arrived yet
    pub(super) fn notify_before_answer(&mut self, id: TransactionId, notify: &SipMessage) {
        let transactions = &self.transactions;
        let subscribe = self.subscribes.values().find_map(|sub| {
            let root = transactions.get(&sub.root_outgoing?)?;
            let ours = Some(sub.call_id.as_str()) == notify.call_id.as_deref()
                && root.request.from_tag().is_some()
                && root.request.from_tag() == notify.to_tag();
            ours.then_some((sub.id, root.cseq))
        });
        let Some((sub_id, local_cseq)) = subscribe else {
            return;
        };

        let dialog = match Dialog::init_as_uac_from_request(notify, local_cseq) {
            Ok(dialog) => dialog,
            Err(e) => {
                warn!(%id, subscribe = %sub_id, error = %e, "NOTIFY cannot create a dialog");
                return;
            }
        };
        let Some(sub) = self.subscribes.get_mut(&sub_id) else {
            return;
        };
        let dialog_id = sub.add_dialog(dialog);
        if let Ok(dialog) = find_dialog_by_id_mut(sub, dialog_id) {
            dialog.incoming.push(id);
        }
        let owner = OwnerRef::Subscribe(sub_id);
        self.owners.insert(id, owner);
        debug!(%owner, dialog = %dialog_id, "Dialog created by NOTIFY");
        self.emit_dialog(owner, dialog_id, DialogNotification::Created, Some(notify.clone()));
    }
}

/// Move the root transaction into the dialog it just established
fn adopt_root(
    aggregate: &mut dyn DialogOwner,
    dialog: DialogId,
    id: TransactionId,
    direction: Direction,
) -> DialogResult<()> {
    if aggregate.root(direction) != Some(id) {
        return Ok(());
    }
    remove_transaction_from_call(id, &mut *aggregate)?;
    let target = find_dialog_by_id_mut(aggregate, dialog)?;
    match direction {
        Direction::Incoming => target.incoming.push(id),
        Direction::Outgoing => target.outgoing.push(id),
    }
    Ok(())
}
