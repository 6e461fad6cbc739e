//! Polling timer evaluation
//!
//! Nothing sleeps per transaction. [`Engine::timers_execute`] compares "now"
//! with the timers that matter in each transaction's current state and queues
//! a timeout event for each one that is due. A slot is consumed only once its
//! event is queued, so a full fifo delays a timeout instead of losing it.
//! Dialog 200 OK retransmission does not go through the fifo and runs either
//! way.

use tokio::time::Instant;
use tracing::{error, trace, warn};

use crate::dialog::OkRetransmit;
use crate::events::DialogNotification;
use crate::transaction::{EventType, SipEvent, TimerSlot, Timers, TransactionKind, TransactionState};

use super::Engine;

/// Timers that can fire in a given state
fn watched(kind: TransactionKind, state: TransactionState) -> &'static [EventType] {
    use EventType::*;
    use TransactionKind::*;
    use TransactionState::*;

    match (kind, state) {
        (InviteClient, Calling) => &[TimeoutA, TimeoutB],
        (InviteClient, Completed) => &[TimeoutD],
        (NonInviteClient, Trying | Proceeding) => &[TimeoutE, TimeoutF],
        (NonInviteClient, Completed) => &[TimeoutK],
        (InviteServer, Completed) => &[TimeoutG, TimeoutH],
        (InviteServer, Confirmed) => &[TimeoutI],
        (NonInviteServer, Completed) => &[TimeoutJ],
        _ => &[],
    }
}

fn slot_mut(timers: &mut Timers, event: EventType) -> Option<&mut TimerSlot> {
    match event {
        EventType::TimeoutA => Some(&mut timers.a),
        EventType::TimeoutB => Some(&mut timers.b),
        EventType::TimeoutD => Some(&mut timers.d),
        EventType::TimeoutE => Some(&mut timers.e),
        EventType::TimeoutF => Some(&mut timers.f),
        EventType::TimeoutK => Some(&mut timers.k),
        EventType::TimeoutG => Some(&mut timers.g),
        EventType::TimeoutH => Some(&mut timers.h),
        EventType::TimeoutI => Some(&mut timers.i),
        EventType::TimeoutJ => Some(&mut timers.j),
        _ => None,
    }
}

impl Engine {
    /// Queue every due transaction timeout and run dialog 200 OK retransmission
    ///
    /// Returns the number of timeout events queued.
    pub fn timers_execute(&mut self, now: Instant) -> usize {
        let mut queued = 0;
        'transactions: for tx in self.transactions.values_mut() {
            if tx.is_terminated() {
                continue;
            }
            for &event_type in watched(tx.kind, tx.state) {
                let Some(slot) = slot_mut(&mut tx.timers, event_type) else {
                    continue;
                };
                if !slot.is_due(now) {
                    continue;
                }
                match self.fifo.add(SipEvent::timeout(tx.id, event_type)) {
                    Ok(()) => {
                        slot.take_due(now);
                        queued += 1;
                        trace!(id = %tx.id, ?event_type, "Timer fired");
                    }
                    Err(e) => {
                        warn!(id = %tx.id, ?event_type, error = %e, "Timeout deferred");
                        break 'transactions;
                    }
                }
            }
        }
        self.dialog_timers(now);
        queued
    }

    fn dialog_timers(&mut self, now: Instant) {
        let cap = self.timer_settings.t2;
        let mut fired = Vec::new();
        for owner in self.owner_refs() {
            let Ok(aggregate) = self.owner_mut(owner) else { continue };
            for dialog in aggregate.dialogs_mut() {
                if let Some(outcome) = dialog.poll_200ok(now, cap) {
                    fired.push((owner, dialog.id, outcome, dialog.ok_destination.clone()));
                }
            }
        }

        for (owner, dialog, outcome, destination) in fired {
            match (outcome, destination) {
                (OkRetransmit::Retransmit(response), Some(destination)) => {
                    match self.transmit(&response, &destination) {
                        Ok(()) => {
                            trace!(%owner, %dialog, "200 OK retransmitted");
                            self.emit_dialog(owner, dialog, DialogNotification::OkRetransmitted, Some(response));
                        }
                        Err(e) => error!(%owner, %dialog, error = %e, "200 OK retransmission failed"),
                    }
                }
                (OkRetransmit::Retransmit(_), None) => {
                    warn!(%owner, %dialog, "200 OK stored without destination");
                }
                (OkRetransmit::GiveUp, _) => {
                    warn!(%owner, %dialog, "No ACK for 200 OK, giving up");
                    self.emit_dialog(owner, dialog, DialogNotification::AckTimeout, None);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_state_relevant_timers_are_watched() {
        assert_eq!(
            watched(TransactionKind::InviteClient, TransactionState::Calling),
            &[EventType::TimeoutA, EventType::TimeoutB]
        );
        assert!(watched(TransactionKind::InviteClient, TransactionState::Proceeding).is_empty());
        assert_eq!(
            watched(TransactionKind::InviteServer, TransactionState::Confirmed),
            &[EventType::TimeoutI]
        );
        assert!(watched(TransactionKind::NonInviteServer, TransactionState::Trying).is_empty());
        assert!(watched(TransactionKind::NonInviteClient, TransactionState::Terminated).is_empty());
    }
}
