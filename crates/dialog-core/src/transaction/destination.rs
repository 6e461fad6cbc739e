//! Next-hop selection for requests and responses

use crate::errors::{DialogError, DialogResult};
use crate::message::SipMessage;
use crate::transport::Destination;

/// Where to send a request (or an ACK built from one)
///
/// Precedence: a destination already pinned for the transaction or dialog, then
/// a loose-routing (`lr`) top Route, then the Request-URI `maddr`, then the
/// Request-URI host and port.
pub fn resolve_destination(
    request: &SipMessage,
    pinned: Option<&Destination>,
    default_port: u16,
) -> DialogResult<Destination> {
    if let Some(pinned) = pinned {
        return Ok(pinned.clone());
    }

    if let Some(route) = request.route.first() {
        if route.uri.has_param("lr") {
            let port = route.uri.port.unwrap_or(default_port);
            return Ok(Destination::new(route.uri.host.clone(), port));
        }
    }

    let uri = request
        .request_uri()
        .ok_or_else(|| DialogError::bad_parameter("cannot route a response as a request"))?;
    let port = uri.port.unwrap_or(default_port);
    match uri.param("maddr").filter(|maddr| !maddr.is_empty()) {
        Some(maddr) => Ok(Destination::new(maddr, port)),
        None => Ok(Destination::new(uri.host.clone(), port)),
    }
}

/// Where to send responses for a request (RFC 3261 section 18.2.2)
///
/// The address the request arrived from wins; otherwise the top Via `received`
/// and `rport` parameters, then its sent-by.
pub fn response_destination(
    request: &SipMessage,
    source: Option<&Destination>,
    default_port: u16,
) -> DialogResult<Destination> {
    if let Some(source) = source {
        return Ok(source.clone());
    }
    let via = request
        .top_via()
        .ok_or_else(|| DialogError::bad_parameter("request without Via"))?;
    let host = via
        .param("received")
        .filter(|r| !r.is_empty())
        .unwrap_or(via.host.as_str());
    let port = via
        .param("rport")
        .and_then(|p| p.parse::<u16>().ok())
        .or(via.port)
        .unwrap_or(default_port);
    Ok(Destination::new(host, port))
}
