use std::fmt;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::ops::{BitAnd, BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
pub use rust_p2p_socket_core::socket::{Address, LocalInterface};

/// Option bits accepted by the socket factory.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PacketSocketOptions(u32);

impl PacketSocketOptions {
    /// Pseudo-TLS record framing, no handshake and no encryption.
    pub const TLS_FAKE: PacketSocketOptions = PacketSocketOptions(0x01);
    /// Real TLS with certificate validation.
    pub const TLS: PacketSocketOptions = PacketSocketOptions(0x02);
    /// STUN-TCP packet framing instead of length-prefixed framing.
    pub const STUN: PacketSocketOptions = PacketSocketOptions(0x04);
    /// Real TLS without certificate validation.
    pub const TLS_INSECURE: PacketSocketOptions = PacketSocketOptions(0x08);

    const TLS_MASK: u32 = Self::TLS.0 | Self::TLS_FAKE.0 | Self::TLS_INSECURE.0;
    const NAMES: [(PacketSocketOptions, &'static str); 4] = [
        (Self::TLS_FAKE, "TLS_FAKE"),
        (Self::TLS, "TLS"),
        (Self::STUN, "STUN"),
        (Self::TLS_INSECURE, "TLS_INSECURE"),
    ];

    pub const fn empty() -> Self {
        PacketSocketOptions(0)
    }
    pub const fn from_bits(bits: u32) -> Self {
        PacketSocketOptions(bits)
    }
    pub const fn bits(&self) -> u32 {
        self.0
    }
    pub const fn contains(&self, other: PacketSocketOptions) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }
    pub fn insert(&mut self, other: PacketSocketOptions) {
        self.0 |= other.0;
    }
    pub fn remove(&mut self, other: PacketSocketOptions) {
        self.0 &= !other.0;
    }
    /// The TLS mode selected by these options.
    ///
    /// Fails when more than one TLS bit is set.
    pub fn tls_mode(&self) -> Result<TlsMode> {
        let tls = self.0 & Self::TLS_MASK;
        if tls.count_ones() > 1 {
            return Err(Error::ConflictingTlsOptions(*self));
        }
        Ok(if tls == Self::TLS.0 {
            TlsMode::Real
        } else if tls == Self::TLS_INSECURE.0 {
            TlsMode::Insecure
        } else if tls == Self::TLS_FAKE.0 {
            TlsMode::Fake
        } else {
            TlsMode::None
        })
    }
}

impl BitOr for PacketSocketOptions {
    type Output = PacketSocketOptions;

    fn bitor(self, rhs: Self) -> Self::Output {
        PacketSocketOptions(self.0 | rhs.0)
    }
}

impl BitOrAssign for PacketSocketOptions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs)
    }
}

impl BitAnd for PacketSocketOptions {
    type Output = PacketSocketOptions;

    fn bitand(self, rhs: Self) -> Self::Output {
        PacketSocketOptions(self.0 & rhs.0)
    }
}

impl fmt::Debug for PacketSocketOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            write!(f, "PacketSocketOptions(empty)")
        } else {
            write!(f, "PacketSocketOptions({})", names.join(" | "))
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TlsMode {
    None,
    Real,
    Insecure,
    Fake,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpOptions {
    #[serde(default)]
    pub opts: PacketSocketOptions,
    #[serde(default)]
    pub tls_alpn_protocols: Vec<String>,
    #[serde(default)]
    pub tls_elliptic_curves: Vec<String>,
}

impl From<PacketSocketOptions> for TcpOptions {
    fn from(opts: PacketSocketOptions) -> Self {
        Self {
            opts,
            ..Default::default()
        }
    }
}

impl TcpOptions {
    pub fn new(opts: PacketSocketOptions) -> Self {
        opts.into()
    }
    pub fn set_alpn_protocols(mut self, protocols: Vec<String>) -> Self {
        self.tls_alpn_protocols = protocols;
        self
    }
    pub fn set_elliptic_curves(mut self, curves: Vec<String>) -> Self {
        self.tls_elliptic_curves = curves;
        self
    }
    pub fn tls_mode(&self) -> Result<TlsMode> {
        self.opts.tls_mode()
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyServer {
    pub address: Address,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl ProxyServer {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            username: String::new(),
            password: String::new(),
        }
    }
    pub fn set_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty()
    }
}

impl fmt::Debug for ProxyServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyServer")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Proxy to tunnel an outgoing TCP connection through.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProxyInfo {
    #[default]
    None,
    Socks5(ProxyServer),
    Https(ProxyServer),
}

impl ProxyInfo {
    /// Build from loose settings, e.g. values read from an application's settings screen.
    ///
    /// `kind` is `socks5`, `https` or `none` (case-insensitive, empty means none).
    /// A host that is not an IP literal is resolved here, once.
    pub fn from_parts(
        kind: &str,
        host: &str,
        port: u16,
        username: &str,
        password: &str,
    ) -> Result<ProxyInfo> {
        let kind = kind.trim().to_ascii_lowercase();
        if kind.is_empty() || kind == "none" {
            return Ok(ProxyInfo::None);
        }
        let address = proxy_address(host, port)?;
        let server = ProxyServer::new(address).set_credentials(username, password);
        match kind.as_str() {
            "socks5" | "socks" => Ok(ProxyInfo::Socks5(server)),
            "https" | "http" => Ok(ProxyInfo::Https(server)),
            _ => Err(Error::InvalidArgument(format!("unknown proxy type {kind:?}"))),
        }
    }
    pub fn is_none(&self) -> bool {
        matches!(self, ProxyInfo::None)
    }
    pub fn server(&self) -> Option<&ProxyServer> {
        match self {
            ProxyInfo::None => None,
            ProxyInfo::Socks5(server) | ProxyInfo::Https(server) => Some(server),
        }
    }
}

fn proxy_address(host: &str, port: u16) -> Result<Address> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(Address::new(SocketAddr::new(ip, port)));
    }
    let addr = (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| Error::InvalidArgument(format!("proxy host not found: {host:?}")))?;
    Ok(Address::with_hostname(host, addr))
}
