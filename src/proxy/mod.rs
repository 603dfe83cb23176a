//! Proxy tunnels for outgoing TCP connections.
//!
//! A proxy layer connects its inner socket to the proxy server instead of the
//! requested target. The proxy handshake starts once the event loop reports the
//! connection as established; application data is held back with
//! `ErrorKind::WouldBlock` until the proxy confirmed the tunnel.

use bytes::{Buf, BytesMut};
use rust_p2p_socket_core::socket::{Address, ConnState, Socket, SocketOption};
use std::io;
use std::net::SocketAddr;

mod https;
mod socks5;

pub use https::HttpsHandshake;
pub use socks5::Socks5Handshake;

use crate::config::ProxyServer;

pub type Socks5ProxySocket = ProxySocket<Socks5Handshake>;
pub type HttpsProxySocket = ProxySocket<HttpsHandshake>;

const READ_CHUNK: usize = 1024;

/// Client side of a proxy protocol, independent of any socket.
pub trait ProxyHandshake: Send {
    /// Queue the first request for `target` into `out`.
    fn start(&mut self, target: &Address, out: &mut BytesMut) -> io::Result<()>;
    /// Consume proxy replies from `input` and queue follow-up requests into `out`.
    /// Returns `true` once the tunnel is established; unconsumed bytes in
    /// `input` then belong to the application.
    fn advance(&mut self, input: &mut BytesMut, out: &mut BytesMut) -> io::Result<bool>;
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum ProxyState {
    Idle,
    Connecting,
    Handshaking,
    Established,
    Failed,
}

pub struct ProxySocket<H> {
    inner: Box<dyn Socket>,
    proxy: Address,
    target: Option<Address>,
    handshake: H,
    state: ProxyState,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl ProxySocket<Socks5Handshake> {
    pub fn socks5(inner: Box<dyn Socket>, server: &ProxyServer) -> Self {
        let handshake = Socks5Handshake::new(&server.username, &server.password);
        ProxySocket::new(inner, server.address.clone(), handshake)
    }
}

impl ProxySocket<HttpsHandshake> {
    pub fn https(inner: Box<dyn Socket>, user_agent: &str, server: &ProxyServer) -> Self {
        let handshake = HttpsHandshake::new(user_agent, &server.username, &server.password);
        ProxySocket::new(inner, server.address.clone(), handshake)
    }
}

impl<H: ProxyHandshake> ProxySocket<H> {
    pub fn new(inner: Box<dyn Socket>, proxy: Address, handshake: H) -> Self {
        Self {
            inner,
            proxy,
            target: None,
            handshake,
            state: ProxyState::Idle,
            read_buf: BytesMut::new(),
            write_buf: BytesMut::new(),
        }
    }
    pub fn proxy_addr(&self) -> &Address {
        &self.proxy
    }
    pub fn is_established(&self) -> bool {
        self.state == ProxyState::Established
    }

    fn flush(&mut self) -> io::Result<()> {
        while !self.write_buf.is_empty() {
            match self.inner.send(&self.write_buf) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
                Ok(len) => self.write_buf.advance(len),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn fail(&mut self, e: io::Error) -> io::Error {
        log::warn!("proxy {} handshake failed: {:?}", self.proxy, e);
        self.state = ProxyState::Failed;
        e
    }

    /// Read one chunk of proxy replies and advance the handshake.
    fn drive_handshake(&mut self) -> io::Result<()> {
        self.flush()?;
        let mut chunk = [0u8; READ_CHUNK];
        let len = self.inner.recv(&mut chunk)?;
        if len == 0 {
            let e = io::Error::new(io::ErrorKind::UnexpectedEof, "proxy closed the connection");
            return Err(self.fail(e));
        }
        self.read_buf.extend_from_slice(&chunk[..len]);
        match self.handshake.advance(&mut self.read_buf, &mut self.write_buf) {
            Ok(true) => {
                log::debug!("proxy tunnel to {:?} established", self.target);
                self.state = ProxyState::Established;
                self.flush()
            }
            Ok(false) => Ok(()),
            Err(e) => Err(self.fail(e)),
        }
    }
}

impl<H: ProxyHandshake> Socket for ProxySocket<H> {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.target
            .as_ref()
            .map(|target| target.socket_addr())
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }
    fn bind(&mut self, addr: SocketAddr) -> io::Result<()> {
        self.inner.bind(addr)
    }
    fn connect(&mut self, addr: &Address) -> io::Result<()> {
        if self.state != ProxyState::Idle {
            return Err(io::Error::from(io::ErrorKind::AlreadyExists));
        }
        self.inner.connect(&self.proxy)?;
        self.target = Some(addr.clone());
        self.state = ProxyState::Connecting;
        Ok(())
    }
    fn listen(&mut self, _backlog: i32) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "proxy sockets cannot listen",
        ))
    }
    fn accept(&mut self) -> io::Result<(Box<dyn Socket>, SocketAddr)> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.state {
            ProxyState::Established => {
                self.flush()?;
                if !self.write_buf.is_empty() {
                    return Err(io::Error::from(io::ErrorKind::WouldBlock));
                }
                self.inner.send(buf)
            }
            ProxyState::Handshaking => {
                self.drive_handshake()?;
                Err(io::Error::from(io::ErrorKind::WouldBlock))
            }
            ProxyState::Connecting => Err(io::Error::from(io::ErrorKind::WouldBlock)),
            ProxyState::Idle | ProxyState::Failed => {
                Err(io::Error::from(io::ErrorKind::NotConnected))
            }
        }
    }
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.state {
                ProxyState::Established => {
                    if self.read_buf.is_empty() {
                        return self.inner.recv(buf);
                    }
                    let len = buf.len().min(self.read_buf.len());
                    buf[..len].copy_from_slice(&self.read_buf[..len]);
                    self.read_buf.advance(len);
                    return Ok(len);
                }
                ProxyState::Handshaking => self.drive_handshake()?,
                ProxyState::Connecting => {
                    return Err(io::Error::from(io::ErrorKind::WouldBlock))
                }
                ProxyState::Idle | ProxyState::Failed => {
                    return Err(io::Error::from(io::ErrorKind::NotConnected))
                }
            }
        }
    }
    fn send_to(&mut self, _buf: &[u8], _addr: SocketAddr) -> io::Result<usize> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }
    fn recv_from(&mut self, _buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }
    fn set_option(&mut self, option: SocketOption) -> io::Result<()> {
        self.inner.set_option(option)
    }
    fn state(&self) -> ConnState {
        match self.state {
            ProxyState::Idle => self.inner.state(),
            ProxyState::Connecting | ProxyState::Handshaking => ConnState::Connecting,
            ProxyState::Established => ConnState::Connected,
            ProxyState::Failed => ConnState::Closed,
        }
    }
    fn on_connected(&mut self) -> io::Result<()> {
        self.inner.on_connected()?;
        if self.state != ProxyState::Connecting {
            return Ok(());
        }
        let target = self
            .target
            .clone()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        self.handshake.start(&target, &mut self.write_buf)?;
        self.state = ProxyState::Handshaking;
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::MockShared;

    fn server() -> ProxyServer {
        ProxyServer::new(Address::new("10.0.0.1:1080".parse().unwrap()))
    }

    #[test]
    fn connect_goes_to_proxy() {
        let shared = MockShared::new();
        let mut socket = Socks5ProxySocket::socks5(shared.socket(), &server());
        let target = Address::new("1.2.3.4:443".parse().unwrap());
        socket.connect(&target).unwrap();
        assert_eq!(shared.events(), vec!["connect 10.0.0.1:1080"]);
        assert_eq!(socket.peer_addr().unwrap(), target.socket_addr());
        assert_eq!(socket.state(), ConnState::Connecting);
        assert!(shared.take_outbound().is_empty());

        let e = socket.send(b"data").unwrap_err();
        assert_eq!(e.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn dropping_proxy_releases_inner() {
        let shared = MockShared::new();
        let socket = HttpsProxySocket::https(shared.socket(), "agent", &server());
        assert_eq!(shared.outstanding(), 1);
        drop(socket);
        assert_eq!(shared.outstanding(), 0);
    }
}
