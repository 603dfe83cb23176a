//! Binding sockets to a local address, optionally scanning a port range.

use std::fmt;
use std::net::SocketAddr;

use crate::error::{Error, Result};
use crate::socket::{Address, Socket};

/// Inclusive local port range. `(0, 0)` lets the OS pick the port.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct PortRange {
    min: u16,
    max: u16,
}

impl PortRange {
    pub const ANY: PortRange = PortRange { min: 0, max: 0 };

    pub fn new(min: u16, max: u16) -> Result<Self> {
        if min > max {
            return Err(Error::InvalidPortRange { min, max });
        }
        Ok(Self { min, max })
    }
    pub fn single(port: u16) -> Self {
        Self {
            min: port,
            max: port,
        }
    }
    #[inline]
    pub fn min(&self) -> u16 {
        self.min
    }
    #[inline]
    pub fn max(&self) -> u16 {
        self.max
    }
    #[inline]
    pub fn is_any(&self) -> bool {
        self.min == 0 && self.max == 0
    }
    pub fn contains(&self, port: u16) -> bool {
        self.is_any() || (self.min..=self.max).contains(&port)
    }
    /// Ports tried in order. Port 0 is never a candidate of a real range.
    pub fn candidates(&self) -> impl Iterator<Item = u16> {
        let start = if self.is_any() { 0 } else { self.min.max(1) };
        start..=self.max
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

/// Bind `socket` to `address`, or to the first free port of `range` on the
/// address' IP. Returns the bound local address.
pub fn bind_socket(
    socket: &mut dyn Socket,
    address: &Address,
    range: PortRange,
) -> Result<SocketAddr> {
    if range.is_any() {
        let addr = address.socket_addr();
        socket
            .bind(addr)
            .map_err(|source| Error::Bind { addr, source })?;
        return local_addr_or(socket, addr);
    }
    for port in range.candidates() {
        let addr = address.with_port(port);
        match socket.bind(addr) {
            Ok(()) => return local_addr_or(socket, addr),
            Err(e) => log::trace!("bind {} failed: {:?}", addr, e),
        }
    }
    log::debug!("no free port for {} in {}", address.ip(), range);
    Err(Error::PortRangeExhausted {
        ip: address.ip(),
        min: range.min(),
        max: range.max(),
    })
}

fn local_addr_or(socket: &dyn Socket, addr: SocketAddr) -> Result<SocketAddr> {
    Ok(socket.local_addr().unwrap_or(addr))
}
