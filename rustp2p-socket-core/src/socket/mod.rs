use anyhow::anyhow;
use network_interface::{NetworkInterface, NetworkInterfaceConfig};
use socket2::Protocol;
use std::io;
use std::io::Read;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
#[cfg(windows)]
pub use windows::*;

mod address;
#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

pub use address::{Address, AddressFamily, SocketType};

pub(crate) trait SocketInterfaceExt {
    fn set_ip_unicast_if(&self, _interface: &LocalInterface) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ConnState {
    Closed,
    Connecting,
    Connected,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SocketOption {
    NoDelay(bool),
    ReuseAddr(bool),
    SendBufferSize(usize),
    RecvBufferSize(usize),
    Ttl(u32),
}

/// A non-blocking stream or datagram socket.
///
/// Implemented by the OS socket and by every layer that wraps one (proxy
/// tunnels, TLS). A wrapping layer owns the socket it wraps; dropping the
/// outermost layer closes the whole chain.
///
/// Nothing here blocks: `send`/`recv` return `ErrorKind::WouldBlock` when the
/// socket is not ready, and `connect` only issues the connection. The owning
/// event loop calls `on_connected` once the socket became writable.
pub trait Socket: Send {
    fn local_addr(&self) -> io::Result<SocketAddr>;
    fn peer_addr(&self) -> io::Result<SocketAddr>;
    fn bind(&mut self, addr: SocketAddr) -> io::Result<()>;
    fn connect(&mut self, addr: &Address) -> io::Result<()>;
    fn listen(&mut self, backlog: i32) -> io::Result<()>;
    fn accept(&mut self) -> io::Result<(Box<dyn Socket>, SocketAddr)>;
    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> io::Result<usize>;
    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
    fn set_option(&mut self, option: SocketOption) -> io::Result<()>;
    fn state(&self) -> ConnState;
    /// Called by the event loop when a pending connect completed.
    fn on_connected(&mut self) -> io::Result<()>;
}

/// Source of raw sockets for a socket factory.
pub trait SocketProvider: Send + Sync {
    fn create_socket(
        &self,
        family: AddressFamily,
        socket_type: SocketType,
    ) -> io::Result<Box<dyn Socket>>;
}

#[derive(Clone, Debug, Default)]
pub struct LocalInterface {
    pub index: u32,
    #[cfg(unix)]
    pub name: Option<String>,
}
impl LocalInterface {
    pub fn new(index: u32, #[cfg(unix)] name: Option<String>) -> Self {
        Self {
            index,
            #[cfg(unix)]
            name,
        }
    }
}

/// Creates OS sockets through socket2.
#[derive(Clone, Debug, Default)]
pub struct SystemSocketProvider {
    default_interface: Option<LocalInterface>,
    ttl: Option<u32>,
}

impl SystemSocketProvider {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_default_interface(mut self, default_interface: LocalInterface) -> Self {
        self.default_interface = Some(default_interface);
        self
    }
    pub fn set_ttl(mut self, ttl: u32) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

impl SystemSocketProvider {
    fn new_socket(
        &self,
        family: AddressFamily,
        socket_type: SocketType,
    ) -> io::Result<socket2::Socket> {
        let domain = match family {
            AddressFamily::V4 => socket2::Domain::IPV4,
            AddressFamily::V6 => socket2::Domain::IPV6,
        };
        let socket = match socket_type {
            SocketType::Datagram => {
                socket2::Socket::new(domain, socket2::Type::DGRAM, Some(Protocol::UDP))?
            }
            SocketType::Stream => {
                socket2::Socket::new(domain, socket2::Type::STREAM, Some(Protocol::TCP))?
            }
        };
        if family.is_ipv4() {
            if let Some(default_interface) = self.default_interface.as_ref() {
                socket.set_ip_unicast_if(default_interface)?;
            }
        }
        #[cfg(windows)]
        if socket_type == SocketType::Datagram {
            if let Err(e) = ignore_conn_reset(&socket) {
                log::warn!("ignore_conn_reset {e:?}")
            }
        }
        if let Some(ttl) = self.ttl {
            socket.set_ttl(ttl)?;
        }
        socket.set_nonblocking(true)?;
        Ok(socket)
    }
}

impl SocketProvider for SystemSocketProvider {
    fn create_socket(
        &self,
        family: AddressFamily,
        socket_type: SocketType,
    ) -> io::Result<Box<dyn Socket>> {
        let socket = self.new_socket(family, socket_type)?;
        Ok(Box::new(SystemSocket::new(socket, ConnState::Closed)))
    }
}

pub struct SystemSocket {
    socket: socket2::Socket,
    state: ConnState,
    // handle for recv_from, cloned on first use
    datagram: Option<UdpSocket>,
}

impl SystemSocket {
    pub fn new(socket: socket2::Socket, state: ConnState) -> Self {
        Self {
            socket,
            state,
            datagram: None,
        }
    }
}

fn to_socket_addr(addr: socket2::SockAddr) -> io::Result<SocketAddr> {
    addr.as_socket()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "not an inet address"))
}

/// Whether a connect error only means the non-blocking connect is under way.
pub fn is_connect_in_progress(e: &io::Error) -> bool {
    #[cfg(unix)]
    if e.raw_os_error() == Some(libc::EINPROGRESS) {
        return true;
    }
    e.kind() == io::ErrorKind::WouldBlock
}

impl Socket for SystemSocket {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        to_socket_addr(self.socket.local_addr()?)
    }
    fn peer_addr(&self) -> io::Result<SocketAddr> {
        to_socket_addr(self.socket.peer_addr()?)
    }
    fn bind(&mut self, addr: SocketAddr) -> io::Result<()> {
        self.socket.bind(&addr.into())
    }
    fn connect(&mut self, addr: &Address) -> io::Result<()> {
        match self.socket.connect(&addr.socket_addr().into()) {
            Ok(()) => {
                self.state = ConnState::Connected;
                Ok(())
            }
            Err(e) if is_connect_in_progress(&e) => {
                self.state = ConnState::Connecting;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
    fn listen(&mut self, backlog: i32) -> io::Result<()> {
        self.socket.listen(backlog)
    }
    fn accept(&mut self) -> io::Result<(Box<dyn Socket>, SocketAddr)> {
        let (socket, addr) = self.socket.accept()?;
        socket.set_nonblocking(true)?;
        let addr = to_socket_addr(addr)?;
        Ok((
            Box::new(SystemSocket::new(socket, ConnState::Connected)),
            addr,
        ))
    }
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.socket.send(buf)
    }
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (&self.socket).read(buf)
    }
    fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(buf, &addr.into())
    }
    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let datagram = match self.datagram.take() {
            Some(datagram) => datagram,
            None => UdpSocket::from(self.socket.try_clone()?),
        };
        let result = datagram.recv_from(buf);
        self.datagram = Some(datagram);
        result
    }
    fn set_option(&mut self, option: SocketOption) -> io::Result<()> {
        match option {
            SocketOption::NoDelay(nodelay) => self.socket.set_nodelay(nodelay),
            SocketOption::ReuseAddr(reuse) => self.socket.set_reuse_address(reuse),
            SocketOption::SendBufferSize(size) => self.socket.set_send_buffer_size(size),
            SocketOption::RecvBufferSize(size) => self.socket.set_recv_buffer_size(size),
            SocketOption::Ttl(ttl) => self.socket.set_ttl(ttl),
        }
    }
    fn state(&self) -> ConnState {
        self.state
    }
    fn on_connected(&mut self) -> io::Result<()> {
        if let Some(e) = self.socket.take_error()? {
            self.state = ConnState::Closed;
            return Err(e);
        }
        self.state = ConnState::Connected;
        Ok(())
    }
}

/// Interface that owns `local_ip`, for pinning sockets with
/// [`SystemSocketProvider::set_default_interface`].
pub fn get_interface(local_ip: Ipv4Addr) -> anyhow::Result<LocalInterface> {
    NetworkInterface::show()?
        .into_iter()
        .find(|iface| iface.addr.iter().any(|a| a.ip() == IpAddr::V4(local_ip)))
        .map(|iface| LocalInterface {
            index: iface.index,
            #[cfg(unix)]
            name: Some(iface.name),
        })
        .ok_or_else(|| anyhow!("no interface has address {local_ip}"))
}
