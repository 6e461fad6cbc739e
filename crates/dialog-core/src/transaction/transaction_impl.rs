use tokio::time::Instant;

use crate::errors::{DialogError, DialogResult};
use crate::message::{Method, SipMessage, Via};
use crate::transport::Destination;

use super::timer::Timers;
use super::{TransactionId, TransactionKind, TransactionState};

/// One SIP transaction
///
/// Owned by the engine's arena and addressed by [`TransactionId`]. All
/// mutation goes through the state machines in [`super::fsm`].
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: TransactionId,
    pub kind: TransactionKind,
    pub state: TransactionState,
    pub created_at: Instant,

    /// The request that created the transaction
    pub request: SipMessage,
    /// Last response received (client) or sent (server)
    pub last_response: Option<SipMessage>,
    /// ACK built for a non-2xx final (INVITE client only)
    pub ack: Option<SipMessage>,
    /// Next hop for requests (client) or responses (server)
    pub destination: Destination,

    // correlation keys
    pub branch: String,
    pub sent_by: String,
    pub method: Method,
    pub call_id: String,
    pub cseq: u32,

    /// Top Via names a reliable transport
    pub reliable: bool,
    pub timers: Timers,
}

impl Transaction {
    /// Transaction for a request we are about to send
    pub fn new_client(
        id: TransactionId,
        request: SipMessage,
        destination: Destination,
        now: Instant,
    ) -> DialogResult<Self> {
        Self::new(id, true, request, destination, now)
    }

    /// Transaction for a request we just received
    pub fn new_server(
        id: TransactionId,
        request: SipMessage,
        destination: Destination,
        now: Instant,
    ) -> DialogResult<Self> {
        Self::new(id, false, request, destination, now)
    }

    fn new(
        id: TransactionId,
        client: bool,
        request: SipMessage,
        destination: Destination,
        now: Instant,
    ) -> DialogResult<Self> {
        let method = request
            .method()
            .cloned()
            .ok_or_else(|| DialogError::bad_parameter("transactions are created from requests"))?;
        if method == Method::Ack {
            return Err(DialogError::bad_parameter("ACK never creates a transaction"));
        }
        let via = request
            .top_via()
            .ok_or_else(|| DialogError::bad_parameter("request without Via"))?;
        let branch = via
            .branch()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| DialogError::bad_parameter("top Via without branch"))?
            .to_string();
        let call_id = request
            .call_id
            .clone()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| DialogError::bad_parameter("request without Call-ID"))?;
        let cseq = request
            .cseq
            .as_ref()
            .ok_or_else(|| DialogError::bad_parameter("request without CSeq"))?;
        if cseq.method != method {
            return Err(DialogError::bad_parameter(format!(
                "CSeq method {} does not match {}",
                cseq.method, method
            )));
        }
        if request.from.is_none() || request.to.is_none() {
            return Err(DialogError::bad_parameter("request without From or To"));
        }

        Ok(Transaction {
            id,
            kind: TransactionKind::for_request(&method, client),
            state: TransactionState::Initial,
            created_at: now,
            sent_by: via.sent_by(),
            reliable: via.is_reliable(),
            branch,
            cseq: cseq.seq,
            call_id,
            method,
            last_response: None,
            ack: None,
            destination,
            request,
            timers: Timers::default(),
        })
    }

    pub fn is_terminated(&self) -> bool {
        self.state.is_terminated()
    }

    /// Response matching for client transactions (RFC 3261 section 17.1.3)
    pub fn matches_response(&self, response: &SipMessage) -> bool {
        self.kind.is_client()
            && response.is_response()
            && response.top_via().and_then(Via::branch) == Some(self.branch.as_str())
            && response.cseq_method() == Some(&self.method)
    }

    /// Request matching for server transactions (RFC 3261 section 17.2.3)
    ///
    /// An ACK matches the INVITE transaction it acknowledges.
    pub fn matches_request(&self, request: &SipMessage) -> bool {
        if self.kind.is_client() {
            return false;
        }
        let (Some(method), Some(via)) = (request.method(), request.top_via()) else {
            return false;
        };
        let method_matches =
            *method == self.method || (*method == Method::Ack && self.method == Method::Invite);
        method_matches && via.branch() == Some(self.branch.as_str()) && via.sent_by() == self.sent_by
    }
}
