//! ACK for non-2xx final responses (RFC 3261 section 17.1.1.3)

use crate::errors::{DialogError, DialogResult};
use crate::message::{CSeq, Method, SipMessage};

/// Build the ACK the INVITE client transaction sends for a 3xx-6xx
///
/// From, To (with tag), Call-ID and CSeq come from the response, with the CSeq
/// method rewritten to ACK. The Request-URI, the top Via only and the full
/// Route set come from the original INVITE.
pub fn create_ack(invite: &SipMessage, response: &SipMessage) -> DialogResult<SipMessage> {
    let uri = match (invite.method(), invite.request_uri()) {
        (Some(Method::Invite), Some(uri)) => uri.clone(),
        _ => return Err(DialogError::bad_parameter("ACK can only be built from an INVITE")),
    };
    if !response.is_final_failure() {
        return Err(DialogError::bad_parameter("ACK is only generated for 3xx-6xx responses"));
    }
    let top_via = invite
        .top_via()
        .cloned()
        .ok_or_else(|| DialogError::bad_parameter("INVITE without Via"))?;
    let from = response
        .from
        .clone()
        .ok_or_else(|| DialogError::bad_parameter("response without From"))?;
    let to = response
        .to
        .clone()
        .ok_or_else(|| DialogError::bad_parameter("response without To"))?;
    let call_id = response
        .call_id
        .clone()
        .ok_or_else(|| DialogError::bad_parameter("response without Call-ID"))?;
    let seq = response
        .cseq
        .as_ref()
        .map(|cseq| cseq.seq)
        .ok_or_else(|| DialogError::bad_parameter("response without CSeq"))?;

    let mut ack = SipMessage::request(Method::Ack, uri)
        .with_via(top_via)
        .with_from(from)
        .with_to(to)
        .with_call_id(call_id);
    ack.cseq = Some(CSeq::new(seq, Method::Ack));
    ack.route = invite.route.clone();
    Ok(ack)
}
