//! Dialog and transaction lookups over a [`DialogOwner`]
//!
//! The "last transaction" queries resolve ties deterministically:
//! - a strictly later `created_at` wins
//! - on equal times inside one list, the entry inserted last wins
//! - on equal times between the incoming and outgoing side, outgoing wins
//!
//! Root transactions are only consulted when no dialog-scoped transaction
//! matches.

use std::collections::HashMap;

use tokio::time::Instant;

use crate::dialog::{Dialog, DialogId};
use crate::errors::{DialogError, DialogResult};
use crate::message::Method;
use crate::transaction::{Transaction, TransactionId};

use super::{Direction, DialogOwner};

/// Read access to the transactions the lookups need to compare
pub trait TransactionIndex {
    fn created_at(&self, id: TransactionId) -> Option<Instant>;
    fn method(&self, id: TransactionId) -> Option<&Method>;
    fn is_terminated(&self, id: TransactionId) -> bool;
}

impl TransactionIndex for HashMap<TransactionId, Transaction> {
    fn created_at(&self, id: TransactionId) -> Option<Instant> {
        self.get(&id).map(|tx| tx.created_at)
    }

    fn method(&self, id: TransactionId) -> Option<&Method> {
        self.get(&id).map(|tx| &tx.method)
    }

    fn is_terminated(&self, id: TransactionId) -> bool {
        self.get(&id).is_none_or(Transaction::is_terminated)
    }
}

/// Find a dialog by its positive id
pub fn find_dialog_by_id<O: DialogOwner + ?Sized>(owner: &O, id: DialogId) -> DialogResult<&Dialog> {
    if id.is_tentative() {
        return Err(DialogError::not_found(format!("{id} is not an attached dialog")));
    }
    owner
        .dialogs()
        .iter()
        .find(|d| d.id == id)
        .ok_or_else(|| DialogError::not_found(format!("{id} not in {}", owner.owner_ref())))
}

pub fn find_dialog_by_id_mut<O: DialogOwner + ?Sized>(
    owner: &mut O,
    id: DialogId,
) -> DialogResult<&mut Dialog> {
    if id.is_tentative() {
        return Err(DialogError::not_found(format!("{id} is not an attached dialog")));
    }
    let owner_ref = owner.owner_ref();
    owner
        .dialogs_mut()
        .iter_mut()
        .find(|d| d.id == id)
        .ok_or_else(|| DialogError::not_found(format!("{id} not in {owner_ref}")))
}

/// Find a dialog by Call-ID and tags (local tag is ours)
pub fn find_dialog_by_tags<'a, O: DialogOwner + ?Sized>(
    owner: &'a O,
    call_id: &str,
    local_tag: Option<&str>,
    remote_tag: Option<&str>,
) -> Option<&'a Dialog> {
    owner
        .dialogs()
        .iter()
        .find(|d| d.matches(call_id, local_tag, remote_tag))
}

/// Detach `tx` from the one slot that holds it
///
/// Searched in order: root incoming, every dialog's incoming list, root
/// outgoing, every dialog's outgoing list. Nothing is modified when `tx` is
/// not found.
pub fn remove_transaction_from_call<O: DialogOwner + ?Sized>(
    tx: TransactionId,
    owner: &mut O,
) -> DialogResult<Direction> {
    for direction in [Direction::Incoming, Direction::Outgoing] {
        let root = owner.root_mut(direction);
        if *root == Some(tx) {
            *root = None;
            return Ok(direction);
        }
        for dialog in owner.dialogs_mut().iter_mut() {
            let list = match direction {
                Direction::Incoming => &mut dialog.incoming,
                Direction::Outgoing => &mut dialog.outgoing,
            };
            if let Some(pos) = list.iter().position(|&id| id == tx) {
                list.remove(pos);
                return Ok(direction);
            }
        }
    }
    Err(DialogError::not_found(format!("{tx} not in {}", owner.owner_ref())))
}

/// Most recent transaction for `method` on either side
pub fn find_last_transaction<O, I>(
    owner: &O,
    index: &I,
    dialog: Option<DialogId>,
    method: &Method,
) -> Option<TransactionId>
where
    O: DialogOwner + ?Sized,
    I: TransactionIndex + ?Sized,
{
    Query::new(method).search(owner, index, dialog, None)
}

/// Most recent INVITE on either side
pub fn find_last_invite<O, I>(owner: &O, index: &I, dialog: Option<DialogId>) -> Option<TransactionId>
where
    O: DialogOwner + ?Sized,
    I: TransactionIndex + ?Sized,
{
    Query::new(&Method::Invite).search(owner, index, dialog, None)
}

/// Most recent INVITE we sent
pub fn find_last_out_invite<O, I>(owner: &O, index: &I, dialog: Option<DialogId>) -> Option<TransactionId>
where
    O: DialogOwner + ?Sized,
    I: TransactionIndex + ?Sized,
{
    Query::new(&Method::Invite).search(owner, index, dialog, Some(Direction::Outgoing))
}

/// Most recent INVITE we received
pub fn find_last_inc_invite<O, I>(owner: &O, index: &I, dialog: Option<DialogId>) -> Option<TransactionId>
where
    O: DialogOwner + ?Sized,
    I: TransactionIndex + ?Sized,
{
    Query::new(&Method::Invite).search(owner, index, dialog, Some(Direction::Incoming))
}

/// Most recent INVITE other than `current` that has not terminated yet
///
/// A hit means an earlier INVITE is still pending (glare).
pub fn find_previous_invite<O, I>(
    owner: &O,
    index: &I,
    dialog: Option<DialogId>,
    current: TransactionId,
) -> Option<TransactionId>
where
    O: DialogOwner + ?Sized,
    I: TransactionIndex + ?Sized,
{
    let query = Query {
        method: &Method::Invite,
        exclude: Some(current),
        pending_only: true,
    };
    query.search(owner, index, dialog, None)
}

type Candidate = (TransactionId, Instant);

struct Query<'m> {
    method: &'m Method,
    exclude: Option<TransactionId>,
    pending_only: bool,
}

impl<'m> Query<'m> {
    fn new(method: &'m Method) -> Self {
        Query {
            method,
            exclude: None,
            pending_only: false,
        }
    }

    fn accept<I: TransactionIndex + ?Sized>(&self, index: &I, id: TransactionId) -> Option<Candidate> {
        if self.exclude == Some(id) || index.method(id) != Some(self.method) {
            return None;
        }
        if self.pending_only && index.is_terminated(id) {
            return None;
        }
        index.created_at(id).map(|at| (id, at))
    }

    fn search<O, I>(
        &self,
        owner: &O,
        index: &I,
        dialog: Option<DialogId>,
        only: Option<Direction>,
    ) -> Option<TransactionId>
    where
        O: DialogOwner + ?Sized,
        I: TransactionIndex + ?Sized,
    {
        let wants = |direction| only.is_none_or(|d| d == direction);

        let scoped = |direction: Direction| {
            owner
                .dialogs()
                .iter()
                .filter(|d| dialog.is_none_or(|id| d.id == id))
                .flat_map(|d| match direction {
                    Direction::Incoming => d.incoming.iter(),
                    Direction::Outgoing => d.outgoing.iter(),
                })
                .filter_map(|&id| self.accept(index, id))
                .fold(None, later)
        };
        let root = |direction: Direction| {
            owner
                .root(direction)
                .and_then(|id| self.accept(index, id))
        };

        let side = |lookup: &dyn Fn(Direction) -> Option<Candidate>, direction| {
            if wants(direction) { lookup(direction) } else { None }
        };

        newest(side(&scoped, Direction::Incoming), side(&scoped, Direction::Outgoing))
            .or_else(|| newest(side(&root, Direction::Incoming), side(&root, Direction::Outgoing)))
            .map(|(id, _)| id)
    }
}

/// Fold step: a later or equal candidate replaces the current best
fn later(best: Option<Candidate>, next: Candidate) -> Option<Candidate> {
    match best {
        Some(best) if best.1 > next.1 => Some(best),
        _ => Some(next),
    }
}

/// Outgoing wins ties
fn newest(incoming: Option<Candidate>, outgoing: Option<Candidate>) -> Option<Candidate> {
    match (incoming, outgoing) {
        (Some(inc), Some(out)) => Some(if inc.1 > out.1 { inc } else { out }),
        (inc, out) => inc.or(out),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::call::{Call, CallId, Subscribe, SubscribeId};
    use crate::message::SipMessage;

    struct Index {
        start: Instant,
        entries: HashMap<TransactionId, (u64, Method, bool)>,
    }

    impl Index {
        fn new() -> Self {
            Index {
                start: Instant::now(),
                entries: HashMap::new(),
            }
        }

        fn add(&mut self, id: u32, secs: u64, method: Method) -> TransactionId {
            self.entries.insert(TransactionId(id), (secs, method, false));
            TransactionId(id)
        }

        fn terminate(&mut self, id: TransactionId) {
            if let Some(entry) = self.entries.get_mut(&id) {
                entry.2 = true;
            }
        }
    }

    impl TransactionIndex for Index {
        fn created_at(&self, id: TransactionId) -> Option<Instant> {
            self.entries
                .get(&id)
                .map(|(secs, _, _)| self.start + Duration::from_secs(*secs))
        }

        fn method(&self, id: TransactionId) -> Option<&Method> {
            self.entries.get(&id).map(|(_, method, _)| method)
        }

        fn is_terminated(&self, id: TransactionId) -> bool {
            self.entries.get(&id).is_none_or(|(_, _, done)| *done)
        }
    }

    fn dialog(remote_tag: &str) -> Dialog {
        let ok = SipMessage::response(200, "OK")
            .with_from("<sip:alice@atlanta.com>;tag=1928301774".parse().unwrap())
            .with_to(format!("<sip:bob@biloxi.com>;tag={remote_tag}").parse().unwrap())
            .with_call_id("a84b4c76e66710")
            .with_cseq(1, Method::Invite);
        Dialog::init_as_uac(&ok).unwrap()
    }

    #[test]
    fn last_invite_prefers_newest_dialog() {
        let mut index = Index::new();
        let mut call = Call::new(CallId(1), "a84b4c76e66710");
        let d1 = call.add_dialog(dialog("d1"));
        let d2 = call.add_dialog(dialog("d2"));
        assert_eq!((d1, d2), (DialogId(1), DialogId(2)));

        let t10 = index.add(10, 10, Method::Invite);
        let t20 = index.add(20, 20, Method::Invite);
        call.dialogs[0].outgoing.push(t10);
        call.dialogs[1].outgoing.push(t20);

        assert_eq!(find_last_invite(&call, &index, None), Some(t20));
        assert_eq!(find_last_invite(&call, &index, Some(d1)), Some(t10));
        assert_eq!(find_last_out_invite(&call, &index, None), Some(t20));
        assert_eq!(find_last_inc_invite(&call, &index, None), None);
    }

    #[test]
    fn ties_go_to_outgoing_then_latest_insert() {
        let mut index = Index::new();
        let mut call = Call::new(CallId(1), "a84b4c76e66710");
        call.add_dialog(dialog("d1"));

        let inc = index.add(1, 5, Method::Invite);
        let out_a = index.add(2, 5, Method::Invite);
        let out_b = index.add(3, 5, Method::Invite);
        call.dialogs[0].incoming.push(inc);
        call.dialogs[0].outgoing.push(out_a);
        call.dialogs[0].outgoing.push(out_b);

        assert_eq!(find_last_invite(&call, &index, None), Some(out_b));

        // strictly newer incoming beats outgoing
        let newer = index.add(4, 6, Method::Invite);
        call.dialogs[0].incoming.push(newer);
        assert_eq!(find_last_invite(&call, &index, None), Some(newer));
    }

    #[test]
    fn falls_back_to_root_transactions() {
        let mut index = Index::new();
        let mut call = Call::new(CallId(1), "a84b4c76e66710");
        let root = index.add(1, 1, Method::Invite);
        call.root_outgoing = Some(root);
        assert_eq!(find_last_invite(&call, &index, None), Some(root));

        let id = call.add_dialog(dialog("d1"));
        let bye = index.add(2, 9, Method::Bye);
        call.dialogs[0].outgoing.push(bye);
        // dialog has no INVITE, root still answers
        assert_eq!(find_last_invite(&call, &index, Some(id)), Some(root));
        assert_eq!(find_last_transaction(&call, &index, Some(id), &Method::Bye), Some(bye));
        assert_eq!(find_last_transaction(&call, &index, None, &Method::Cancel), None);
    }

    #[test]
    fn previous_invite_skips_current_and_finished() {
        let mut index = Index::new();
        let mut call = Call::new(CallId(1), "a84b4c76e66710");
        call.add_dialog(dialog("d1"));
        let first = index.add(1, 1, Method::Invite);
        let current = index.add(2, 2, Method::Invite);
        call.dialogs[0].outgoing.push(first);
        call.dialogs[0].incoming.push(current);

        assert_eq!(find_previous_invite(&call, &index, None, current), Some(first));
        index.terminate(first);
        assert_eq!(find_previous_invite(&call, &index, None, current), None);
    }

    #[test]
    fn remove_searches_every_slot_once() {
        let mut call = Call::new(CallId(1), "a84b4c76e66710");
        call.add_dialog(dialog("d1"));
        call.add_dialog(dialog("d2"));
        call.root_incoming = Some(TransactionId(1));
        call.dialogs[1].incoming.push(TransactionId(2));
        call.root_outgoing = Some(TransactionId(3));
        call.dialogs[0].outgoing.extend([TransactionId(4), TransactionId(5)]);

        assert_eq!(remove_transaction_from_call(TransactionId(5), &mut call).unwrap(), Direction::Outgoing);
        assert_eq!(call.dialogs[0].outgoing, vec![TransactionId(4)]);
        assert_eq!(remove_transaction_from_call(TransactionId(1), &mut call).unwrap(), Direction::Incoming);
        assert_eq!(call.root_incoming, None);
        assert_eq!(remove_transaction_from_call(TransactionId(2), &mut call).unwrap(), Direction::Incoming);
        assert!(call.dialogs[1].incoming.is_empty());
    }

    #[test]
    fn remove_unknown_is_not_found_and_mutates_nothing() {
        let mut call = Call::new(CallId(1), "a84b4c76e66710");
        call.add_dialog(dialog("d1"));
        call.root_outgoing = Some(TransactionId(3));
        call.dialogs[0].incoming.push(TransactionId(4));

        let err = remove_transaction_from_call(TransactionId(99), &mut call).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(call.root_outgoing, Some(TransactionId(3)));
        assert_eq!(call.dialogs[0].incoming, vec![TransactionId(4)]);
    }

    #[test]
    fn dialog_lookups() {
        let mut subscribe = Subscribe::new(SubscribeId(1), "a84b4c76e66710", Some("presence".into()));
        let id = subscribe.add_dialog(dialog("n1"));

        assert!(find_dialog_by_id(&subscribe, id).is_ok());
        assert!(find_dialog_by_id(&subscribe, DialogId(0)).unwrap_err().is_not_found());
        assert!(find_dialog_by_id(&subscribe, DialogId::TENTATIVE).unwrap_err().is_not_found());
        assert!(find_dialog_by_id(&subscribe, DialogId(7)).unwrap_err().is_not_found());
        find_dialog_by_id_mut(&mut subscribe, id).unwrap().set_closing();

        let found = find_dialog_by_tags(&subscribe, "a84b4c76e66710", Some("1928301774"), Some("n1"));
        assert_eq!(found.map(|d| d.id), Some(id));
        assert!(find_dialog_by_tags(&subscribe, "a84b4c76e66710", Some("1928301774"), Some("n2")).is_none());
    }
}
