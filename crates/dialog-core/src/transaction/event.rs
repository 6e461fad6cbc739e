use crate::message::{Method, SipMessage};
use crate::transport::Destination;

use super::TransactionId;

/// Event types understood by the state machines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    TimeoutA,
    TimeoutB,
    TimeoutD,
    TimeoutE,
    TimeoutF,
    TimeoutK,
    TimeoutG,
    TimeoutH,
    TimeoutI,
    TimeoutJ,

    RcvInvite,
    RcvAck,
    RcvRequest,
    Rcv1xx,
    Rcv2xx,
    Rcv3456xx,

    SndInvite,
    SndAck,
    SndRequest,
    Snd1xx,
    Snd2xx,
    Snd3456xx,

    /// Synthetic termination, e.g. for a CANCELled INVITE
    KillTransaction,
    Unknown,
}

impl EventType {
    /// Classify a message arriving from the network
    pub fn for_incoming(message: &SipMessage) -> EventType {
        match (message.method(), message.status()) {
            (Some(Method::Invite), _) => EventType::RcvInvite,
            (Some(Method::Ack), _) => EventType::RcvAck,
            (Some(_), _) => EventType::RcvRequest,
            (None, Some(100..=199)) => EventType::Rcv1xx,
            (None, Some(200..=299)) => EventType::Rcv2xx,
            (None, Some(300..=699)) => EventType::Rcv3456xx,
            _ => EventType::Unknown,
        }
    }

    /// Classify a message the application asks to send
    pub fn for_outgoing(message: &SipMessage) -> EventType {
        match (message.method(), message.status()) {
            (Some(Method::Invite), _) => EventType::SndInvite,
            (Some(Method::Ack), _) => EventType::SndAck,
            (Some(_), _) => EventType::SndRequest,
            (None, Some(100..=199)) => EventType::Snd1xx,
            (None, Some(200..=299)) => EventType::Snd2xx,
            (None, Some(300..=699)) => EventType::Snd3456xx,
            _ => EventType::Unknown,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            EventType::TimeoutA
                | EventType::TimeoutB
                | EventType::TimeoutD
                | EventType::TimeoutE
                | EventType::TimeoutF
                | EventType::TimeoutK
                | EventType::TimeoutG
                | EventType::TimeoutH
                | EventType::TimeoutI
                | EventType::TimeoutJ
        )
    }

    pub fn is_incoming(&self) -> bool {
        matches!(
            self,
            EventType::RcvInvite
                | EventType::RcvAck
                | EventType::RcvRequest
                | EventType::Rcv1xx
                | EventType::Rcv2xx
                | EventType::Rcv3456xx
        )
    }

    pub fn is_outgoing(&self) -> bool {
        matches!(
            self,
            EventType::SndInvite
                | EventType::SndAck
                | EventType::SndRequest
                | EventType::Snd1xx
                | EventType::Snd2xx
                | EventType::Snd3456xx
        )
    }
}

/// One unit of work in the engine fifo, consumed exactly once
#[derive(Debug, Clone)]
pub struct SipEvent {
    pub event_type: EventType,
    /// Target transaction; `None` for network input not yet matched
    pub transaction_id: Option<TransactionId>,
    pub message: Option<SipMessage>,
    /// Where an incoming message came from
    pub source: Option<Destination>,
}

impl SipEvent {
    /// A message received from the network
    pub fn incoming(message: SipMessage, source: Destination) -> Self {
        SipEvent {
            event_type: EventType::for_incoming(&message),
            transaction_id: None,
            message: Some(message),
            source: Some(source),
        }
    }

    /// A message the application sends on `id`
    pub fn outgoing(id: TransactionId, message: SipMessage) -> Self {
        SipEvent {
            event_type: EventType::for_outgoing(&message),
            transaction_id: Some(id),
            message: Some(message),
            source: None,
        }
    }

    /// A timer expiry or synthetic kill for `id`
    pub fn timeout(id: TransactionId, event_type: EventType) -> Self {
        SipEvent {
            event_type,
            transaction_id: Some(id),
            message: None,
            source: None,
        }
    }

    pub fn kill(id: TransactionId) -> Self {
        Self::timeout(id, EventType::KillTransaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Uri;

    #[test]
    fn classifies_by_direction() {
        let invite = SipMessage::request(Method::Invite, Uri::sip("biloxi.com"));
        let bye = SipMessage::request(Method::Bye, Uri::sip("biloxi.com"));
        let ringing = SipMessage::response(180, "Ringing");
        let busy = SipMessage::response(486, "Busy Here");

        assert_eq!(EventType::for_incoming(&invite), EventType::RcvInvite);
        assert_eq!(EventType::for_incoming(&bye), EventType::RcvRequest);
        assert_eq!(EventType::for_incoming(&ringing), EventType::Rcv1xx);
        assert_eq!(EventType::for_incoming(&busy), EventType::Rcv3456xx);
        assert_eq!(EventType::for_outgoing(&invite), EventType::SndInvite);
        assert_eq!(EventType::for_outgoing(&busy), EventType::Snd3456xx);
        assert_eq!(
            EventType::for_incoming(&SipMessage::response(99, "Odd")),
            EventType::Unknown
        );
    }

    #[test]
    fn direction_predicates() {
        assert!(EventType::TimeoutD.is_timeout());
        assert!(EventType::Rcv2xx.is_incoming());
        assert!(EventType::Snd1xx.is_outgoing());
        assert!(!EventType::KillTransaction.is_timeout());
    }
}
