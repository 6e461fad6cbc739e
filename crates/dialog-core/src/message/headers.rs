use std::fmt;
use std::str::FromStr;

use super::method::Method;
use super::uri::{find_param, parse_host_port, parse_params, set_param, Param, Uri, DEFAULT_SIP_PORT};
use crate::errors::DialogError;

/// Transports that deliver reliably; no retransmission timers are armed over them
const RELIABLE_TRANSPORTS: [&str; 5] = ["TCP", "TLS", "SCTP", "WS", "WSS"];

/// One Via header value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Via {
    /// Transport token, e.g. `UDP`
    pub transport: String,
    pub host: String,
    pub port: Option<u16>,
    pub params: Vec<Param>,
}

impl Via {
    pub fn new(transport: &str, host: impl Into<String>, port: Option<u16>, branch: &str) -> Self {
        Via {
            transport: transport.to_ascii_uppercase(),
            host: host.into(),
            port,
            params: vec![Param::new("branch", Some(branch))],
        }
    }

    pub fn branch(&self) -> Option<&str> {
        find_param(&self.params, "branch").and_then(|p| p.value.as_deref())
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        find_param(&self.params, name).map(|p| p.value.as_deref().unwrap_or(""))
    }

    pub fn set_param(&mut self, name: &str, value: Option<&str>) {
        set_param(&mut self.params, name, value);
    }

    /// `host:port` with the default port filled in
    pub fn sent_by(&self) -> String {
        format!("{}:{}", self.host, self.port.unwrap_or(DEFAULT_SIP_PORT))
    }

    pub fn is_reliable(&self) -> bool {
        RELIABLE_TRANSPORTS
            .iter()
            .any(|t| t.eq_ignore_ascii_case(&self.transport))
    }
}

impl fmt::Display for Via {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIP/2.0/{} {}", self.transport, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        for param in &self.params {
            write!(f, "{param}")?;
        }
        Ok(())
    }
}

impl FromStr for Via {
    type Err = DialogError;

    /// Parses `SIP/2.0/UDP host[:port][;params]`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (protocol, rest) = s
            .split_once(char::is_whitespace)
            .ok_or_else(|| DialogError::bad_parameter(format!("malformed Via '{s}'")))?;
        let transport = protocol
            .rsplit('/')
            .next()
            .filter(|t| !t.is_empty() && protocol.contains('/'))
            .ok_or_else(|| DialogError::bad_parameter(format!("malformed Via protocol '{protocol}'")))?;
        let (sent_by, params) = match rest.split_once(';') {
            Some((sent_by, params)) => (sent_by, parse_params(params)),
            None => (rest, Vec::new()),
        };
        let (host, port) = parse_host_port(sent_by)?;
        Ok(Via {
            transport: transport.to_ascii_uppercase(),
            host,
            port,
            params,
        })
    }
}

/// `[display-name] <uri>;params`, used by From, To, Route, Record-Route and Contact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameAddr {
    pub display_name: Option<String>,
    pub uri: Uri,
    pub params: Vec<Param>,
}

impl NameAddr {
    pub fn new(uri: Uri) -> Self {
        NameAddr {
            display_name: None,
            uri,
            params: Vec::new(),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.set_tag(tag);
        self
    }

    pub fn tag(&self) -> Option<&str> {
        find_param(&self.params, "tag").and_then(|p| p.value.as_deref())
    }

    pub fn set_tag(&mut self, tag: &str) {
        set_param(&mut self.params, "tag", Some(tag));
    }
}

impl fmt::Display for NameAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.display_name {
            write!(f, "\"{name}\" ")?;
        }
        write!(f, "<{}>", self.uri)?;
        for param in &self.params {
            write!(f, "{param}")?;
        }
        Ok(())
    }
}

impl FromStr for NameAddr {
    type Err = DialogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match (s.find('<'), s.find('>')) {
            (Some(open), Some(close)) if open < close => {
                let display = s[..open].trim().trim_matches('"').trim();
                Ok(NameAddr {
                    display_name: (!display.is_empty()).then(|| display.to_string()),
                    uri: s[open + 1..close].parse()?,
                    params: parse_params(&s[close + 1..]),
                })
            }
            (None, None) => {
                // addr-spec form: parameters belong to the header, not the URI
                let (uri, params) = match s.split_once(';') {
                    Some((uri, params)) => (uri, parse_params(params)),
                    None => (s, Vec::new()),
                };
                Ok(NameAddr {
                    display_name: None,
                    uri: uri.parse()?,
                    params,
                })
            }
            _ => Err(DialogError::bad_parameter(format!("malformed name-addr '{s}'"))),
        }
    }
}

/// CSeq header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CSeq {
    pub seq: u32,
    pub method: Method,
}

impl CSeq {
    pub fn new(seq: u32, method: Method) -> Self {
        CSeq { seq, method }
    }
}

impl fmt::Display for CSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.seq, self.method)
    }
}
