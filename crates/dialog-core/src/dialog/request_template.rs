use crate::message::{Method, NameAddr, SipMessage, Uri, Via};

/// Everything needed to build an in-dialog request
#[derive(Debug, Clone)]
pub struct DialogRequestTemplate {
    pub method: Method,
    pub target_uri: Uri,
    pub call_id: String,
    pub local_uri: Uri,
    pub remote_uri: Uri,
    pub local_tag: Option<String>,
    pub remote_tag: Option<String>,
    pub cseq_number: u32,
    pub route_set: Vec<NameAddr>,
}

impl DialogRequestTemplate {
    /// Build the request with `via` as its only Via (RFC 3261 section 12.2.1.1)
    ///
    /// With a strict-routing first hop the Request-URI is the first route and
    /// the remote target is appended to the Route set.
    pub fn into_request(self, via: Via) -> SipMessage {
        let mut from = NameAddr::new(self.local_uri);
        if let Some(tag) = &self.local_tag {
            from.set_tag(tag);
        }
        let mut to = NameAddr::new(self.remote_uri);
        if let Some(tag) = &self.remote_tag {
            to.set_tag(tag);
        }

        let strict_first_hop = self
            .route_set
            .first()
            .is_some_and(|route| !route.uri.has_param("lr"));
        let (request_uri, routes) = if strict_first_hop {
            let mut routes = self.route_set;
            let first = routes.remove(0);
            routes.push(NameAddr::new(self.target_uri));
            (first.uri, routes)
        } else {
            (self.target_uri, self.route_set)
        };

        let mut request = SipMessage::request(self.method.clone(), request_uri)
            .with_via(via)
            .with_from(from)
            .with_to(to)
            .with_call_id(self.call_id)
            .with_cseq(self.cseq_number, self.method);
        request.route = routes;
        request
    }
}
