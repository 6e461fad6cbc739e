//! Dialog implementation for RFC 3261 SIP dialogs
//!
//! This module contains the main Dialog struct: creation from the
//! dialog-establishing exchange on either side, sequence number tracking,
//! in-dialog request templates and the 200 OK / ACK reliability state.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::errors::{DialogError, DialogResult};
use crate::message::{Method, NameAddr, SipMessage, Uri};
use crate::transaction::{TimerSlot, TransactionId};
use crate::transport::Destination;

use super::dialog_id::DialogId;
use super::dialog_state::DialogState;
use super::request_template::DialogRequestTemplate;

/// Outcome of polling the 200 OK retransmission timer
#[derive(Debug, Clone, PartialEq)]
pub enum OkRetransmit {
    /// Send this 200 OK again
    Retransmit(SipMessage),
    /// The ACK never came; retransmission stopped
    GiveUp,
}

/// A SIP dialog as defined in RFC 3261
#[derive(Debug, Clone)]
pub struct Dialog {
    /// Handle inside the owning call; tentative until attached
    pub id: DialogId,

    pub state: DialogState,

    pub call_id: String,

    pub local_uri: Uri,

    pub remote_uri: Uri,

    pub local_tag: Option<String>,

    pub remote_tag: Option<String>,

    /// Local sequence number
    pub local_cseq: u32,

    /// Remote sequence number, 0 until the peer sends a request
    pub remote_cseq: u32,

    /// Remote target URI (where to send requests)
    pub remote_target: Uri,

    /// Route set for this dialog
    pub route_set: Vec<NameAddr>,

    /// Whether this dialog was created by local UA (true) or remote UA (false)
    pub is_initiator: bool,

    /// 2xx we sent, kept for retransmission until the ACK arrives
    pub ok_response: Option<SipMessage>,
    pub ok_destination: Option<Destination>,
    pub ok_retransmissions: u32,
    pub ok_timer: TimerSlot,
    pub ok_deadline: Option<Instant>,

    /// ACK we sent for a 2xx, resent when the 2xx is retransmitted
    pub ack: Option<SipMessage>,
    pub ack_destination: Option<Destination>,

    /// Transactions scoped to this dialog, oldest first
    pub incoming: Vec<TransactionId>,
    pub outgoing: Vec<TransactionId>,
}

impl Dialog {
    fn empty(call_id: String, local_uri: Uri, remote_uri: Uri, is_initiator: bool) -> Self {
        Dialog {
            id: DialogId::TENTATIVE,
            state: DialogState::Empty,
            call_id,
            remote_target: remote_uri.clone(),
            local_uri,
            remote_uri,
            local_tag: None,
            remote_tag: None,
            local_cseq: 0,
            remote_cseq: 0,
            route_set: Vec::new(),
            is_initiator,
            ok_response: None,
            ok_destination: None,
            ok_retransmissions: 0,
            ok_timer: TimerSlot::default(),
            ok_deadline: None,
            ack: None,
            ack_destination: None,
            incoming: Vec::new(),
            outgoing: Vec::new(),
        }
    }

    /// Create the UAC side of a dialog from a response to our request
    ///
    /// A 1xx with a To tag gives an early dialog, a 2xx a confirmed one. The
    /// local CSeq continues from the request's.
    pub fn init_as_uac(response: &SipMessage) -> DialogResult<Self> {
        let state = match response.status() {
            Some(101..=199) => DialogState::Early,
            Some(200..=299) => DialogState::Confirmed,
            _ => {
                return Err(DialogError::bad_parameter(
                    "only 101-299 responses establish a dialog",
                ));
            }
        };
        let (from, to, call_id) = dialog_headers(response)?;
        let remote_tag = to
            .tag()
            .ok_or_else(|| DialogError::bad_parameter("response without To tag cannot create a dialog"))?;
        let cseq = response
            .cseq
            .as_ref()
            .ok_or_else(|| DialogError::bad_parameter("response without CSeq"))?;

        let mut dialog = Dialog::empty(call_id, from.uri.clone(), to.uri.clone(), true);
        dialog.state = state;
        dialog.local_tag = from.tag().map(str::to_string);
        dialog.remote_tag = Some(remote_tag.to_string());
        dialog.local_cseq = cseq.seq;
        if let Some(contact) = response.contact.first() {
            dialog.remote_target = contact.uri.clone();
        }
        dialog.route_set = response.record_route.iter().rev().cloned().collect();

        debug!(call_id = %dialog.call_id, state = %dialog.state, "Created UAC dialog");
        Ok(dialog)
    }

    /// Create the UAC side of a dialog from a request the peer sent first
    ///
    /// Covers a NOTIFY arriving before the 2xx to our SUBSCRIBE: the request
    /// establishes the dialog, and `local_cseq` is the CSeq of our request.
    pub fn init_as_uac_from_request(request: &SipMessage, local_cseq: u32) -> DialogResult<Self> {
        if !request.is_request() {
            return Err(DialogError::bad_parameter("expected a request"));
        }
        let (from, to, call_id) = dialog_headers(request)?;
        let local_tag = to
            .tag()
            .ok_or_else(|| DialogError::bad_parameter("request without To tag cannot create a dialog"))?;
        let cseq = request
            .cseq
            .as_ref()
            .ok_or_else(|| DialogError::bad_parameter("request without CSeq"))?;

        let mut dialog = Dialog::empty(call_id, to.uri.clone(), from.uri.clone(), true);
        dialog.state = DialogState::Confirmed;
        dialog.local_tag = Some(local_tag.to_string());
        dialog.remote_tag = from.tag().map(str::to_string);
        dialog.local_cseq = local_cseq;
        dialog.remote_cseq = cseq.seq;
        if let Some(contact) = request.contact.first() {
            dialog.remote_target = contact.uri.clone();
        }
        dialog.route_set = request.record_route.clone();
        Ok(dialog)
    }

    /// Create the UAS side of a dialog from the request and our response to it
    ///
    /// Our own in-dialog requests start at CSeq 1.
    pub fn init_as_uas(request: &SipMessage, response: &SipMessage) -> DialogResult<Self> {
        if !request.is_request() {
            return Err(DialogError::bad_parameter("expected the dialog-creating request"));
        }
        let state = match response.status() {
            Some(101..=199) => DialogState::Early,
            Some(200..=299) => DialogState::Confirmed,
            _ => {
                return Err(DialogError::bad_parameter(
                    "only 101-299 responses establish a dialog",
                ));
            }
        };
        let (from, _, call_id) = dialog_headers(request)?;
        let local_tag = response
            .to_tag()
            .ok_or_else(|| DialogError::bad_parameter("our response must carry a To tag"))?;
        let to = response
            .to
            .as_ref()
            .ok_or_else(|| DialogError::bad_parameter("response without To"))?;
        let cseq = request
            .cseq
            .as_ref()
            .ok_or_else(|| DialogError::bad_parameter("request without CSeq"))?;

        let mut dialog = Dialog::empty(call_id, to.uri.clone(), from.uri.clone(), false);
        dialog.state = state;
        dialog.local_tag = Some(local_tag.to_string());
        dialog.remote_tag = from.tag().map(str::to_string);
        dialog.local_cseq = 1;
        dialog.remote_cseq = cseq.seq;
        if let Some(contact) = request.contact.first() {
            dialog.remote_target = contact.uri.clone();
        }
        dialog.route_set = request.record_route.clone();

        debug!(call_id = %dialog.call_id, state = %dialog.state, "Created UAS dialog");
        Ok(dialog)
    }

    /// Store a 2xx we sent and start retransmitting it to `destination` until
    /// the ACK arrives
    ///
    /// Retransmission starts after `initial`, doubles up to the cap given to
    /// [`poll_200ok`](Self::poll_200ok) and gives up after `window`.
    pub fn set_200ok(
        &mut self,
        response: &SipMessage,
        destination: Destination,
        now: Instant,
        initial: Duration,
        window: Duration,
    ) -> DialogResult<()> {
        if !response.is_success() {
            return Err(DialogError::bad_parameter("set_200ok needs a 2xx response"));
        }
        self.ok_response = Some(response.clone());
        self.ok_destination = Some(destination);
        self.ok_retransmissions = 0;
        self.ok_timer.arm(initial, now);
        self.ok_deadline = Some(now + window);
        Ok(())
    }

    /// Check the 200 OK timer; at most one outcome per call
    pub fn poll_200ok(&mut self, now: Instant, cap: Duration) -> Option<OkRetransmit> {
        if !self.ok_timer.is_active() {
            return None;
        }
        if self.ok_deadline.is_some_and(|deadline| deadline <= now) {
            self.stop_200ok();
            return Some(OkRetransmit::GiveUp);
        }
        if !self.ok_timer.take_due(now) {
            return None;
        }
        let response = self.ok_response.clone()?;
        let next = (self.ok_timer.length.unwrap_or(cap) * 2).min(cap);
        self.ok_timer.arm(next, now);
        self.ok_retransmissions += 1;
        Some(OkRetransmit::Retransmit(response))
    }

    /// The peer acknowledged our 2xx; returns whether we were waiting for it
    pub fn ack_received(&mut self) -> bool {
        let waiting = self.ok_timer.is_active();
        self.stop_200ok();
        waiting
    }

    fn stop_200ok(&mut self) {
        self.ok_timer.disarm();
        self.ok_deadline = None;
    }

    /// Remember the ACK we sent for a 2xx and where it went
    pub fn set_ack(&mut self, ack: SipMessage, destination: Destination) {
        self.ack = Some(ack);
        self.ack_destination = Some(destination);
    }

    /// Confirm an early dialog from a 2xx (UAC side)
    ///
    /// Returns false when the dialog was not early.
    pub fn update_from_2xx(&mut self, response: &SipMessage) -> bool {
        if self.state != DialogState::Early || !response.is_success() {
            return false;
        }
        self.state = DialogState::Confirmed;
        if let Some(tag) = response.to_tag() {
            self.remote_tag = Some(tag.to_string());
        }
        if let Some(contact) = response.contact.first() {
            self.remote_target = contact.uri.clone();
        }
        if self.is_initiator {
            self.route_set = response.record_route.iter().rev().cloned().collect();
        }
        true
    }

    /// Track the CSeq of a request from the peer, rejecting old or repeated numbers
    pub fn update_remote_cseq(&mut self, request: &SipMessage) -> DialogResult<()> {
        let seq = request
            .cseq
            .as_ref()
            .map(|cseq| cseq.seq)
            .ok_or_else(|| DialogError::bad_parameter("request without CSeq"))?;
        // ACK and CANCEL reuse the CSeq of the request they refer to
        if matches!(request.method(), Some(Method::Ack | Method::Cancel)) {
            return Ok(());
        }
        if self.remote_cseq != 0 && seq <= self.remote_cseq {
            return Err(DialogError::wrong_state(format!(
                "CSeq {seq} is not above {}",
                self.remote_cseq
            )));
        }
        self.remote_cseq = seq;
        Ok(())
    }

    /// Template for a new request in this dialog
    ///
    /// Every method except ACK takes the next local CSeq.
    pub fn create_request_template(&mut self, method: Method) -> DialogRequestTemplate {
        if method != Method::Ack {
            self.local_cseq += 1;
        }
        DialogRequestTemplate {
            method,
            target_uri: self.remote_target.clone(),
            call_id: self.call_id.clone(),
            local_uri: self.local_uri.clone(),
            remote_uri: self.remote_uri.clone(),
            local_tag: self.local_tag.clone(),
            remote_tag: self.remote_tag.clone(),
            cseq_number: self.local_cseq,
            route_set: self.route_set.clone(),
        }
    }

    /// Dialog identity check; a missing remote tag matches any
    pub fn matches(&self, call_id: &str, local_tag: Option<&str>, remote_tag: Option<&str>) -> bool {
        self.call_id == call_id
            && self.local_tag.as_deref() == local_tag
            && (self.remote_tag.is_none() || self.remote_tag.as_deref() == remote_tag)
    }

    /// Does a response to one of our requests belong to this dialog
    pub fn matches_response(&self, response: &SipMessage) -> bool {
        response
            .call_id
            .as_deref()
            .is_some_and(|call_id| self.matches(call_id, response.from_tag(), response.to_tag()))
    }

    /// Does a request from the peer belong to this dialog
    pub fn matches_request(&self, request: &SipMessage) -> bool {
        request
            .call_id
            .as_deref()
            .is_some_and(|call_id| self.matches(call_id, request.to_tag(), request.from_tag()))
    }

    pub fn set_closing(&mut self) {
        if self.state != DialogState::Terminated {
            self.state = DialogState::Closing;
        }
    }

    pub fn terminate(&mut self) {
        self.state = DialogState::Terminated;
        self.stop_200ok();
    }

    pub fn is_terminated(&self) -> bool {
        self.state == DialogState::Terminated
    }

    /// Is `tx` scoped to this dialog
    pub fn contains(&self, tx: TransactionId) -> bool {
        self.incoming.contains(&tx) || self.outgoing.contains(&tx)
    }
}

fn dialog_headers(message: &SipMessage) -> DialogResult<(&NameAddr, &NameAddr, String)> {
    let from = message
        .from
        .as_ref()
        .ok_or_else(|| DialogError::bad_parameter("message without From"))?;
    let to = message
        .to
        .as_ref()
        .ok_or_else(|| DialogError::bad_parameter("message without To"))?;
    let call_id = message
        .call_id
        .clone()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| DialogError::bad_parameter("message without Call-ID"))?;
    Ok((from, to, call_id))
}
