use std::fmt;
use std::str::FromStr;

use crate::errors::DialogError;

/// Port used when a URI or Via carries none
pub const DEFAULT_SIP_PORT: u16 = 5060;

/// A `name[=value]` parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub value: Option<String>,
}

impl Param {
    pub fn new(name: impl Into<String>, value: Option<&str>) -> Self {
        Param {
            name: name.into(),
            value: value.map(str::to_string),
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, ";{}={}", self.name, value),
            None => write!(f, ";{}", self.name),
        }
    }
}

pub(crate) fn find_param<'a>(params: &'a [Param], name: &str) -> Option<&'a Param> {
    params.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}

pub(crate) fn set_param(params: &mut Vec<Param>, name: &str, value: Option<&str>) {
    match params.iter_mut().find(|p| p.name.eq_ignore_ascii_case(name)) {
        Some(existing) => existing.value = value.map(str::to_string),
        None => params.push(Param::new(name, value)),
    }
}

pub(crate) fn parse_params(text: &str) -> Vec<Param> {
    text.split(';')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| match p.split_once('=') {
            Some((name, value)) => Param::new(name.trim(), Some(value.trim())),
            None => Param::new(p, None),
        })
        .collect()
}

/// Split `host[:port]`, accepting bracketed IPv6 literals
pub(crate) fn parse_host_port(text: &str) -> Result<(String, Option<u16>), DialogError> {
    let text = text.trim();
    let (host, port) = if let Some(rest) = text.strip_prefix('[') {
        let end = rest
            .find(']')
            .ok_or_else(|| DialogError::bad_parameter(format!("unterminated IPv6 host '{text}'")))?;
        let host = format!("[{}]", &rest[..end]);
        let port = rest[end + 1..].strip_prefix(':');
        (host, port)
    } else {
        match text.rsplit_once(':') {
            Some((host, port)) => (host.to_string(), Some(port)),
            None => (text.to_string(), None),
        }
    };
    if host.is_empty() {
        return Err(DialogError::bad_parameter(format!("missing host in '{text}'")));
    }
    let port = port
        .map(|p| {
            p.parse::<u16>()
                .map_err(|_| DialogError::bad_parameter(format!("invalid port '{p}'")))
        })
        .transpose()?;
    Ok((host, port))
}

/// SIP or SIPS URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri {
    pub scheme: String,
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub params: Vec<Param>,
}

impl Uri {
    /// `sip:` URI pointing at `host`
    pub fn sip(host: impl Into<String>) -> Self {
        Uri {
            scheme: "sip".to_string(),
            user: None,
            host: host.into(),
            port: None,
            params: Vec::new(),
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_param(mut self, name: &str, value: Option<&str>) -> Self {
        set_param(&mut self.params, name, value);
        self
    }

    /// Value of a parameter; `Some("")` for a flag such as `lr`
    pub fn param(&self, name: &str) -> Option<&str> {
        find_param(&self.params, name).map(|p| p.value.as_deref().unwrap_or(""))
    }

    pub fn has_param(&self, name: &str) -> bool {
        find_param(&self.params, name).is_some()
    }

    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_SIP_PORT)
    }

    pub fn is_sips(&self) -> bool {
        self.scheme.eq_ignore_ascii_case("sips")
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme)?;
        if let Some(user) = &self.user {
            write!(f, "{user}@")?;
        }
        f.write_str(&self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        for param in &self.params {
            write!(f, "{param}")?;
        }
        Ok(())
    }
}

impl FromStr for Uri {
    type Err = DialogError;

    /// Parses `scheme:[user@]host[:port][;params]`; headers (`?`) are ignored
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (scheme, rest) = s
            .split_once(':')
            .ok_or_else(|| DialogError::bad_parameter(format!("URI without scheme '{s}'")))?;
        if !matches!(scheme.to_ascii_lowercase().as_str(), "sip" | "sips" | "tel") {
            return Err(DialogError::bad_parameter(format!("unsupported URI scheme '{scheme}'")));
        }
        let rest = rest.split('?').next().unwrap_or_default();
        let (addr, params) = match rest.split_once(';') {
            Some((addr, params)) => (addr, parse_params(params)),
            None => (rest, Vec::new()),
        };
        let (user, host_port) = match addr.rsplit_once('@') {
            Some((user, host_port)) => (Some(user.to_string()), host_port),
            None => (None, addr),
        };
        let (host, port) = parse_host_port(host_port)?;
        Ok(Uri {
            scheme: scheme.to_ascii_lowercase(),
            user,
            host,
            port,
            params,
        })
    }
}
