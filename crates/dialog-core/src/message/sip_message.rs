use std::fmt;

use bytes::Bytes;

use super::headers::{CSeq, NameAddr, Via};
use super::method::Method;
use super::uri::Uri;
use crate::errors::{DialogError, DialogResult};

/// Request or status line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartLine {
    Request { method: Method, uri: Uri },
    Response { status: u16, reason: String },
}

/// A decoded SIP message
///
/// Only the headers the engine correlates on are typed; everything else is
/// carried verbatim in `headers`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SipMessage {
    pub start_line: StartLine,
    pub via: Vec<Via>,
    pub route: Vec<NameAddr>,
    pub record_route: Vec<NameAddr>,
    pub from: Option<NameAddr>,
    pub to: Option<NameAddr>,
    pub call_id: Option<String>,
    pub cseq: Option<CSeq>,
    pub contact: Vec<NameAddr>,
    pub max_forwards: Option<u32>,
    /// Extension headers as `(name, value)`
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl SipMessage {
    fn with_start_line(start_line: StartLine) -> Self {
        SipMessage {
            start_line,
            via: Vec::new(),
            route: Vec::new(),
            record_route: Vec::new(),
            from: None,
            to: None,
            call_id: None,
            cseq: None,
            contact: Vec::new(),
            max_forwards: None,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn request(method: Method, uri: Uri) -> Self {
        let mut request = Self::with_start_line(StartLine::Request { method, uri });
        request.max_forwards = Some(70);
        request
    }

    pub fn response(status: u16, reason: impl Into<String>) -> Self {
        Self::with_start_line(StartLine::Response {
            status,
            reason: reason.into(),
        })
    }

    /// Build a response to `request`, copying Via, From, To, Call-ID and CSeq
    pub fn response_for(request: &SipMessage, status: u16) -> DialogResult<SipMessage> {
        if !request.is_request() {
            return Err(DialogError::bad_parameter("response_for needs a request"));
        }
        if !(100..=699).contains(&status) {
            return Err(DialogError::bad_parameter(format!("status code {status} out of range")));
        }
        let mut response = SipMessage::response(status, reason_phrase(status));
        response.via = request.via.clone();
        response.from = request.from.clone();
        response.to = request.to.clone();
        response.call_id = request.call_id.clone();
        response.cseq = request.cseq.clone();
        if status > 100 {
            response.record_route = request.record_route.clone();
        }
        Ok(response)
    }

    pub fn with_via(mut self, via: Via) -> Self {
        self.via.push(via);
        self
    }

    pub fn with_route(mut self, route: NameAddr) -> Self {
        self.route.push(route);
        self
    }

    pub fn with_record_route(mut self, route: NameAddr) -> Self {
        self.record_route.push(route);
        self
    }

    pub fn with_from(mut self, from: NameAddr) -> Self {
        self.from = Some(from);
        self
    }

    pub fn with_to(mut self, to: NameAddr) -> Self {
        self.to = Some(to);
        self
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }

    pub fn with_cseq(mut self, seq: u32, method: Method) -> Self {
        self.cseq = Some(CSeq::new(seq, method));
        self
    }

    pub fn with_contact(mut self, contact: NameAddr) -> Self {
        self.contact.push(contact);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn is_request(&self) -> bool {
        matches!(self.start_line, StartLine::Request { .. })
    }

    pub fn is_response(&self) -> bool {
        matches!(self.start_line, StartLine::Response { .. })
    }

    /// Request method, `None` for responses
    pub fn method(&self) -> Option<&Method> {
        match &self.start_line {
            StartLine::Request { method, .. } => Some(method),
            StartLine::Response { .. } => None,
        }
    }

    pub fn request_uri(&self) -> Option<&Uri> {
        match &self.start_line {
            StartLine::Request { uri, .. } => Some(uri),
            StartLine::Response { .. } => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match &self.start_line {
            StartLine::Response { status, .. } => Some(*status),
            StartLine::Request { .. } => None,
        }
    }

    /// Hundreds digit of the status code (1..=6)
    pub fn status_class(&self) -> Option<u16> {
        self.status().map(|s| s / 100)
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self.status(), Some(100..=199))
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status(), Some(200..=299))
    }

    /// 3xx to 6xx
    pub fn is_final_failure(&self) -> bool {
        matches!(self.status(), Some(300..=699))
    }

    pub fn cseq_method(&self) -> Option<&Method> {
        self.cseq.as_ref().map(|c| &c.method)
    }

    pub fn top_via(&self) -> Option<&Via> {
        self.via.first()
    }

    pub fn from_tag(&self) -> Option<&str> {
        self.from.as_ref().and_then(NameAddr::tag)
    }

    pub fn to_tag(&self) -> Option<&str> {
        self.to.as_ref().and_then(NameAddr::tag)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Wire form of the message
    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.to_string())
    }

    /// Short description for log lines
    pub fn summary(&self) -> String {
        match &self.start_line {
            StartLine::Request { method, uri } => format!("{method} {uri}"),
            StartLine::Response { status, reason } => match self.cseq_method() {
                Some(method) => format!("{status} {reason} ({method})"),
                None => format!("{status} {reason}"),
            },
        }
    }
}

impl fmt::Display for SipMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.start_line {
            StartLine::Request { method, uri } => write!(f, "{method} {uri} SIP/2.0\r\n")?,
            StartLine::Response { status, reason } => write!(f, "SIP/2.0 {status} {reason}\r\n")?,
        }
        for via in &self.via {
            write!(f, "Via: {via}\r\n")?;
        }
        if let Some(max_forwards) = self.max_forwards {
            write!(f, "Max-Forwards: {max_forwards}\r\n")?;
        }
        for route in &self.route {
            write!(f, "Route: {route}\r\n")?;
        }
        for route in &self.record_route {
            write!(f, "Record-Route: {route}\r\n")?;
        }
        if let Some(from) = &self.from {
            write!(f, "From: {from}\r\n")?;
        }
        if let Some(to) = &self.to {
            write!(f, "To: {to}\r\n")?;
        }
        if let Some(call_id) = &self.call_id {
            write!(f, "Call-ID: {call_id}\r\n")?;
        }
        if let Some(cseq) = &self.cseq {
            write!(f, "CSeq: {cseq}\r\n")?;
        }
        for contact in &self.contact {
            write!(f, "Contact: {contact}\r\n")?;
        }
        for (name, value) in &self.headers {
            write!(f, "{name}: {value}\r\n")?;
        }
        write!(f, "Content-Length: {}\r\n\r\n", self.body.len())?;
        f.write_str(&String::from_utf8_lossy(&self.body))
    }
}

/// Default reason phrase for a status code
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        100 => "Trying",
        180 => "Ringing",
        181 => "Call Is Being Forwarded",
        182 => "Queued",
        183 => "Session Progress",
        200 => "OK",
        202 => "Accepted",
        301 => "Moved Permanently",
        302 => "Moved Temporarily",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        407 => "Proxy Authentication Required",
        408 => "Request Timeout",
        480 => "Temporarily Unavailable",
        481 => "Call/Transaction Does Not Exist",
        486 => "Busy Here",
        487 => "Request Terminated",
        488 => "Not Acceptable Here",
        491 => "Request Pending",
        500 => "Server Internal Error",
        503 => "Service Unavailable",
        504 => "Server Time-out",
        600 => "Busy Everywhere",
        603 => "Decline",
        _ => match status / 100 {
            1 => "Provisional",
            2 => "Success",
            3 => "Redirection",
            4 => "Client Error",
            5 => "Server Error",
            _ => "Global Failure",
        },
    }
}
