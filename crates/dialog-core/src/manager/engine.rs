//! The engine object
//!
//! [`Engine`] owns everything that used to be process-wide state: the
//! transaction arena, the calls and subscriptions, the event fifo, the
//! transport hooks and the pending-free list. It is driven by
//! [`Engine::execute`] (drain the fifo) and [`Engine::timers_execute`] (poll
//! timers), either by hand or through [`run_engine_loop`](super::run_engine_loop).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::call::{
    find_dialog_by_id, find_dialog_by_id_mut, find_last_inc_invite, remove_transaction_from_call, Call,
    CallId, DialogOwner, Direction, OwnerRef, Subscribe, SubscribeId,
};
use crate::config::EngineConfig;
use crate::dialog::{Dialog, DialogId};
use crate::errors::{DialogError, DialogResult};
use crate::events::{DialogNotification, EngineEvent, Fifo, NotificationKind};
use crate::message::{Method, SipMessage};
use crate::transaction::{
    resolve_destination, response_destination, SipEvent, TimerSettings, Transaction, TransactionId,
    TransactionKind, TransactionState,
};
use crate::transport::{Destination, Transport, TransportHooks, UdpTransport};

/// A SIP signaling engine instance
///
/// Several engines can live in one process; nothing is global. All methods
/// take `&mut self`, so one engine is driven by one task at a time. Other
/// threads talk to it through the shared [`fifo`](Engine::fifo).
#[derive(Debug)]
pub struct Engine {
    pub(super) config: EngineConfig,
    pub(super) timer_settings: TimerSettings,
    pub(super) fifo: Arc<Fifo<SipEvent>>,
    pub(super) hooks: TransportHooks,
    pub(super) events: mpsc::UnboundedSender<EngineEvent>,

    pub(super) transactions: HashMap<TransactionId, Transaction>,
    /// Aggregate each owned transaction belongs to
    pub(super) owners: HashMap<TransactionId, OwnerRef>,
    pub(super) calls: BTreeMap<CallId, Call>,
    pub(super) subscribes: BTreeMap<SubscribeId, Subscribe>,
    /// Detached transactions, freed by [`Engine::reap`] once terminated
    pub(super) pending_free: Vec<TransactionId>,

    next_transaction: u32,
    next_call: u32,
    next_subscribe: u32,
}

impl Engine {
    /// Create an engine with the default UDP transport bound to
    /// `config.bind_address`
    ///
    /// Returns the engine and the receiving end of its notification channel.
    pub fn new(config: EngineConfig) -> DialogResult<(Engine, mpsc::UnboundedReceiver<EngineEvent>)> {
        config.validate()?;
        let transport = UdpTransport::bind(&config.bind_address)?;
        info!(bind = %config.bind_address, "Engine created with UDP transport");
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create an engine on top of an existing default transport
    pub fn with_transport(
        config: EngineConfig,
        transport: Arc<dyn Transport>,
    ) -> (Engine, mpsc::UnboundedReceiver<EngineEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let engine = Engine {
            timer_settings: config.timer_settings(),
            fifo: Arc::new(Fifo::new(config.fifo_capacity)),
            hooks: TransportHooks::new(transport),
            events,
            transactions: HashMap::new(),
            owners: HashMap::new(),
            calls: BTreeMap::new(),
            subscribes: BTreeMap::new(),
            pending_free: Vec::new(),
            next_transaction: 0,
            next_call: 0,
            next_subscribe: 0,
            config,
        };
        (engine, receiver)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The event fifo, shared with network threads
    pub fn fifo(&self) -> Arc<Fifo<SipEvent>> {
        self.fifo.clone()
    }

    /// Signalled whenever an event is queued; the engine's wake-up handle
    pub fn waker(&self) -> Arc<Notify> {
        self.fifo.waker()
    }

    pub fn transport_hooks(&self) -> &TransportHooks {
        &self.hooks
    }

    // ---- transactions -------------------------------------------------

    /// Create a client transaction for a request we are about to send
    ///
    /// The destination follows the Route / maddr / Request-URI rules and is
    /// pinned for the lifetime of the transaction.
    pub fn create_client_transaction(&mut self, request: SipMessage) -> DialogResult<TransactionId> {
        let destination = resolve_destination(&request, None, self.config.default_port)?;
        let id = self.allocate_transaction_id()?;
        let tx = Transaction::new_client(id, request, destination, Instant::now())?;
        debug!(%id, kind = tx.kind.abbreviation(), method = %tx.method, dest = %tx.destination, "Created client transaction");
        self.transactions.insert(id, tx);
        Ok(id)
    }

    /// Create a server transaction for a request received from `source`
    pub fn create_server_transaction(
        &mut self,
        request: SipMessage,
        source: Destination,
    ) -> DialogResult<TransactionId> {
        self.insert_server_transaction(request, Some(&source))
    }

    pub(super) fn insert_server_transaction(
        &mut self,
        request: SipMessage,
        source: Option<&Destination>,
    ) -> DialogResult<TransactionId> {
        let destination = response_destination(&request, source, self.config.default_port)?;
        let id = self.allocate_transaction_id()?;
        let tx = Transaction::new_server(id, request, destination, Instant::now())?;
        debug!(%id, kind = tx.kind.abbreviation(), method = %tx.method, "Created server transaction");
        self.transactions.insert(id, tx);
        Ok(id)
    }

    fn allocate_transaction_id(&mut self) -> DialogResult<TransactionId> {
        self.next_transaction = self
            .next_transaction
            .checked_add(1)
            .ok_or_else(|| DialogError::no_memory("transaction id space exhausted"))?;
        Ok(TransactionId(self.next_transaction))
    }

    /// Queue the original request of a client transaction for sending
    pub fn send_request(&mut self, id: TransactionId) -> DialogResult<()> {
        let tx = self.live_transaction(id)?;
        if !tx.kind.is_client() {
            return Err(DialogError::bad_parameter(format!("{id} is a server transaction")));
        }
        if tx.state != TransactionState::Initial {
            return Err(DialogError::wrong_state(format!("{id} already sent its request")));
        }
        let event = SipEvent::outgoing(id, tx.request.clone());
        self.fifo.add(event)
    }

    /// Queue a response on a server transaction
    pub fn send_response(&mut self, id: TransactionId, response: SipMessage) -> DialogResult<()> {
        if !response.is_response() {
            return Err(DialogError::bad_parameter("send_response needs a response"));
        }
        if response.status().is_none_or(|status| !(100..=699).contains(&status)) {
            return Err(DialogError::bad_parameter("status code out of range"));
        }
        let tx = self.live_transaction(id)?;
        if tx.kind.is_client() {
            return Err(DialogError::bad_parameter(format!("{id} is a client transaction")));
        }
        self.fifo.add(SipEvent::outgoing(id, response))
    }

    /// Queue a synthetic termination for a live transaction
    pub fn kill_transaction(&mut self, id: TransactionId) -> DialogResult<()> {
        self.live_transaction(id)?;
        self.fifo.add(SipEvent::kill(id))
    }

    pub fn transaction(&self, id: TransactionId) -> Option<&Transaction> {
        self.transactions.get(&id)
    }

    pub fn transaction_state(&self, id: TransactionId) -> DialogResult<TransactionState> {
        self.transactions
            .get(&id)
            .map(|tx| tx.state)
            .ok_or_else(|| DialogError::not_found(format!("{id} unknown")))
    }

    /// Transactions still in the arena, terminated ones awaiting reaping included
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// Aggregate that owns `id`, if any
    pub fn owner_of(&self, id: TransactionId) -> Option<OwnerRef> {
        self.owners.get(&id).copied()
    }

    fn live_transaction(&self, id: TransactionId) -> DialogResult<&Transaction> {
        let tx = self
            .transactions
            .get(&id)
            .ok_or_else(|| DialogError::not_found(format!("{id} unknown")))?;
        if tx.is_terminated() {
            return Err(DialogError::wrong_state(format!("{id} is terminated")));
        }
        Ok(tx)
    }

    // ---- calls and subscriptions -------------------------------------

    /// Start a call rooted at an INVITE transaction
    pub fn new_call(&mut self, invite: TransactionId) -> DialogResult<CallId> {
        let (call_id, direction) = self.rootable(invite, &Method::Invite)?;
        self.next_call += 1;
        let id = CallId(self.next_call);
        let mut call = Call::new(id, call_id);
        *call.root_mut(direction) = Some(invite);
        self.calls.insert(id, call);
        self.owners.insert(invite, OwnerRef::Call(id));
        debug!(call = %id, tx = %invite, "New call");
        Ok(id)
    }

    /// Start a subscription rooted at a SUBSCRIBE transaction
    pub fn new_subscribe(&mut self, subscribe: TransactionId) -> DialogResult<SubscribeId> {
        let (call_id, direction) = self.rootable(subscribe, &Method::Subscribe)?;
        let event = self
            .transactions
            .get(&subscribe)
            .and_then(|tx| tx.request.header("Event"))
            .map(str::to_string);
        self.next_subscribe += 1;
        let id = SubscribeId(self.next_subscribe);
        let mut sub = Subscribe::new(id, call_id, event);
        *sub.root_mut(direction) = Some(subscribe);
        self.subscribes.insert(id, sub);
        self.owners.insert(subscribe, OwnerRef::Subscribe(id));
        debug!(subscribe = %id, tx = %subscribe, "New subscription");
        Ok(id)
    }

    fn rootable(&self, id: TransactionId, method: &Method) -> DialogResult<(String, Direction)> {
        let tx = self
            .transactions
            .get(&id)
            .ok_or_else(|| DialogError::not_found(format!("{id} unknown")))?;
        if &tx.method != method {
            return Err(DialogError::bad_parameter(format!("{id} is a {} transaction", tx.method)));
        }
        if let Some(owner) = self.owners.get(&id) {
            return Err(DialogError::wrong_state(format!("{id} already belongs to {owner}")));
        }
        Ok((tx.call_id.clone(), direction_of(tx)))
    }

    pub fn call(&self, id: CallId) -> Option<&Call> {
        self.calls.get(&id)
    }

    pub fn subscribe(&self, id: SubscribeId) -> Option<&Subscribe> {
        self.subscribes.get(&id)
    }

    pub(super) fn owner(&self, owner: OwnerRef) -> DialogResult<&dyn DialogOwner> {
        match owner {
            OwnerRef::Call(id) => self.calls.get(&id).map(|c| c as &dyn DialogOwner),
            OwnerRef::Subscribe(id) => self.subscribes.get(&id).map(|s| s as &dyn DialogOwner),
        }
        .ok_or_else(|| DialogError::not_found(format!("{owner} unknown")))
    }

    pub(super) fn owner_mut(&mut self, owner: OwnerRef) -> DialogResult<&mut dyn DialogOwner> {
        match owner {
            OwnerRef::Call(id) => self.calls.get_mut(&id).map(|c| c as &mut dyn DialogOwner),
            OwnerRef::Subscribe(id) => self.subscribes.get_mut(&id).map(|s| s as &mut dyn DialogOwner),
        }
        .ok_or_else(|| DialogError::not_found(format!("{owner} unknown")))
    }

    pub fn dialog(&self, owner: OwnerRef, dialog: DialogId) -> DialogResult<&Dialog> {
        find_dialog_by_id(self.owner(owner)?, dialog)
    }

    pub fn dialog_mut(&mut self, owner: OwnerRef, dialog: DialogId) -> DialogResult<&mut Dialog> {
        find_dialog_by_id_mut(self.owner_mut(owner)?, dialog)
    }

    /// Move a transaction into a dialog's incoming or outgoing list
    ///
    /// The transaction leaves whatever slot of the same owner held it. A BYE
    /// moves the dialog to Closing.
    pub fn attach_to_dialog(
        &mut self,
        owner: OwnerRef,
        dialog: DialogId,
        tx: TransactionId,
        direction: Direction,
    ) -> DialogResult<()> {
        let method = self
            .transactions
            .get(&tx)
            .map(|t| t.method.clone())
            .ok_or_else(|| DialogError::not_found(format!("{tx} unknown")))?;
        match self.owners.get(&tx) {
            Some(current) if *current != owner => {
                return Err(DialogError::wrong_state(format!("{tx} already belongs to {current}")));
            }
            _ => {}
        }

        let aggregate = self.owner_mut(owner)?;
        find_dialog_by_id(&*aggregate, dialog)?;
        if aggregate.holds(tx) {
            remove_transaction_from_call(tx, &mut *aggregate)?;
        }
        let target = find_dialog_by_id_mut(aggregate, dialog)?;
        match direction {
            Direction::Incoming => target.incoming.push(tx),
            Direction::Outgoing => target.outgoing.push(tx),
        }
        if method == Method::Bye {
            target.set_closing();
        }
        self.owners.insert(tx, owner);
        trace!(%tx, %owner, %dialog, ?direction, "Attached transaction to dialog");
        Ok(())
    }

    /// Tear a dialog down
    ///
    /// Its transactions are detached and queued on the pending-free list; live
    /// ones keep running until they terminate and are reaped then.
    pub fn free_dialog(&mut self, owner: OwnerRef, dialog: DialogId) -> DialogResult<()> {
        let aggregate = self.owner_mut(owner)?;
        find_dialog_by_id(&*aggregate, dialog)?;
        let dialogs = aggregate.dialogs_mut();
        let Some(pos) = dialogs.iter().position(|d| d.id == dialog) else {
            return Err(DialogError::not_found(format!("{dialog} not in {owner}")));
        };
        let mut removed = dialogs.remove(pos);
        removed.terminate();
        self.release_dialog(owner, removed);
        self.fifo.waker().notify_one();
        Ok(())
    }

    fn release_dialog(&mut self, owner: OwnerRef, dialog: Dialog) {
        for tx in dialog.incoming.iter().chain(dialog.outgoing.iter()) {
            self.owners.remove(tx);
            self.pending_free.push(*tx);
        }
        debug!(%owner, dialog = %dialog.id, "Dialog freed");
        self.emit_dialog(owner, dialog.id, DialogNotification::Terminated, None);
    }

    /// Remove a call with all its dialogs
    pub fn remove_call(&mut self, id: CallId) -> DialogResult<()> {
        let call = self
            .calls
            .remove(&id)
            .ok_or_else(|| DialogError::not_found(format!("{id} unknown")))?;
        self.release_aggregate(OwnerRef::Call(id), call.root_incoming, call.root_outgoing, call.dialogs);
        Ok(())
    }

    /// Remove a subscription with all its dialogs
    pub fn remove_subscribe(&mut self, id: SubscribeId) -> DialogResult<()> {
        let sub = self
            .subscribes
            .remove(&id)
            .ok_or_else(|| DialogError::not_found(format!("{id} unknown")))?;
        self.release_aggregate(OwnerRef::Subscribe(id), sub.root_incoming, sub.root_outgoing, sub.dialogs);
        Ok(())
    }

    fn release_aggregate(
        &mut self,
        owner: OwnerRef,
        root_incoming: Option<TransactionId>,
        root_outgoing: Option<TransactionId>,
        dialogs: Vec<Dialog>,
    ) {
        for tx in root_incoming.into_iter().chain(root_outgoing) {
            self.owners.remove(&tx);
            self.pending_free.push(tx);
        }
        for mut dialog in dialogs {
            dialog.terminate();
            self.release_dialog(owner, dialog);
        }
        self.fifo.waker().notify_one();
        debug!(%owner, "Aggregate removed");
    }

    /// Terminate the last INVITE received on a call (CANCEL handling)
    ///
    /// Returns the INVITE transaction that was fed a synthetic kill.
    pub fn cancel_pending_invite(&mut self, call: CallId, dialog: Option<DialogId>) -> DialogResult<TransactionId> {
        let aggregate = self
            .calls
            .get(&call)
            .ok_or_else(|| DialogError::not_found(format!("{call} unknown")))?;
        let invite = find_last_inc_invite(aggregate, &self.transactions, dialog)
            .ok_or_else(|| DialogError::not_found(format!("no incoming INVITE in {call}")))?;
        self.kill_transaction(invite)?;
        debug!(%call, tx = %invite, "Pending INVITE cancelled");
        Ok(invite)
    }

    // ---- notifications ------------------------------------------------

    pub(super) fn emit_transaction(
        &self,
        id: TransactionId,
        kind: TransactionKind,
        notification: NotificationKind,
        message: Option<SipMessage>,
    ) {
        trace!(%id, %notification, "Transaction notification");
        let event = EngineEvent::Transaction {
            id,
            kind,
            notification,
            message,
        };
        if self.events.send(event).is_err() {
            trace!(%id, "Notification receiver dropped");
        }
    }

    pub(super) fn emit_dialog(
        &self,
        owner: OwnerRef,
        dialog: DialogId,
        notification: DialogNotification,
        message: Option<SipMessage>,
    ) {
        let event = EngineEvent::Dialog {
            owner,
            dialog,
            notification,
            message,
        };
        if self.events.send(event).is_err() {
            warn!(%owner, %dialog, ?notification, "Notification receiver dropped");
        }
    }
}

pub(super) fn direction_of(tx: &Transaction) -> Direction {
    if tx.kind.is_client() {
        Direction::Outgoing
    } else {
        Direction::Incoming
    }
}
