use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    pub fn is_ipv4(&self) -> bool {
        self == &AddressFamily::V4
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum SocketType {
    Datagram,
    Stream,
}

/// A socket address that may also remember the hostname it was resolved from.
///
/// The hostname is what proxies are asked to connect to and what TLS uses for
/// SNI and certificate checks; the socket address is what the OS socket binds
/// or connects to.
#[derive(Debug, PartialEq, Eq, Clone, Hash, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    hostname: Option<String>,
    addr: SocketAddr,
}

impl Address {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            hostname: None,
            addr,
        }
    }
    pub fn with_hostname(hostname: impl Into<String>, addr: SocketAddr) -> Self {
        Self {
            hostname: Some(hostname.into()),
            addr,
        }
    }
    /// The wildcard address of `family` with port 0.
    pub fn any(family: AddressFamily) -> Self {
        let ip: IpAddr = match family {
            AddressFamily::V4 => Ipv4Addr::UNSPECIFIED.into(),
            AddressFamily::V6 => Ipv6Addr::UNSPECIFIED.into(),
        };
        Self::new(SocketAddr::new(ip, 0))
    }
    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }
    /// Hostname if known, otherwise the textual IP.
    pub fn host(&self) -> String {
        match &self.hostname {
            Some(hostname) => hostname.clone(),
            None => self.addr.ip().to_string(),
        }
    }
    #[inline]
    pub fn socket_addr(&self) -> SocketAddr {
        self.addr
    }
    #[inline]
    pub fn ip(&self) -> IpAddr {
        self.addr.ip()
    }
    #[inline]
    pub fn port(&self) -> u16 {
        self.addr.port()
    }
    pub fn family(&self) -> AddressFamily {
        if self.addr.is_ipv4() {
            AddressFamily::V4
        } else {
            AddressFamily::V6
        }
    }
    pub fn is_any_ip(&self) -> bool {
        self.addr.ip().is_unspecified()
    }
    pub fn with_port(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.addr.ip(), port)
    }
    pub fn set_addr(&mut self, addr: SocketAddr) {
        self.addr = addr;
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Address::new(addr)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.hostname {
            Some(hostname) => write!(f, "{}({})", hostname, self.addr),
            None => write!(f, "{}", self.addr),
        }
    }
}
