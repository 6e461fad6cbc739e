use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use tracing::{debug, trace};

use super::{Destination, Transport, TransportError, TransportResult};

/// Default transport: a plain UDP socket
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    pub fn bind(addr: &str) -> TransportResult<Self> {
        let socket = UdpSocket::bind(addr)?;
        debug!(local = ?socket.local_addr().ok(), "Bound UDP transport");
        Ok(UdpTransport { socket })
    }

    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl Transport for UdpTransport {
    fn send_to(&self, data: &[u8], host: &str, port: u16) -> TransportResult<usize> {
        // bracketed IPv6 literals come straight from URIs
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| TransportError::Resolve {
                host: host.to_string(),
                port,
            })?;
        let sent = self.socket.send_to(data, addr)?;
        trace!(%addr, bytes = sent, "UDP send");
        Ok(sent)
    }

    fn recv_from(&self, buf: &mut [u8]) -> TransportResult<(usize, Destination)> {
        let (len, addr) = self.socket.recv_from(buf)?;
        Ok((len, Destination::new(addr.ip().to_string(), addr.port())))
    }

    fn wait_readable(&self, timeout: Duration) -> TransportResult<bool> {
        // a zero read timeout is rejected by the OS
        self.socket
            .set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
        let mut probe = [0u8; 1];
        match self.socket.peek_from(&mut probe) {
            Ok(_) => Ok(true),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
