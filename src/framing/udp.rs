use bytes::BytesMut;
use rust_p2p_socket_core::socket::{ConnState, Socket, SocketOption};
use std::io;
use std::net::SocketAddr;

use super::PacketSocket;

/// Largest UDP payload.
const MAX_DATAGRAM: usize = 65535;

pub struct UdpPacketSocket {
    inner: Box<dyn Socket>,
}

impl UdpPacketSocket {
    pub fn new(inner: Box<dyn Socket>) -> Self {
        Self { inner }
    }
}

impl PacketSocket for UdpPacketSocket {
    fn send_packet(&mut self, packet: &[u8]) -> io::Result<usize> {
        self.inner.send(packet)
    }
    fn send_to(&mut self, packet: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.inner.send_to(packet, addr)
    }
    fn recv_packet(&mut self) -> io::Result<(BytesMut, SocketAddr)> {
        let mut buf = BytesMut::zeroed(MAX_DATAGRAM);
        let (len, addr) = self.inner.recv_from(&mut buf)?;
        buf.truncate(len);
        Ok((buf, addr))
    }
    fn accept(&mut self) -> io::Result<(Box<dyn PacketSocket>, SocketAddr)> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "udp sockets do not accept connections",
        ))
    }
    fn set_option(&mut self, option: SocketOption) -> io::Result<()> {
        self.inner.set_option(option)
    }
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
    fn remote_addr(&self) -> io::Result<SocketAddr> {
        self.inner.peer_addr()
    }
    fn state(&self) -> ConnState {
        // bound datagram sockets are usable right away
        ConnState::Connected
    }
    fn on_connected(&mut self) -> io::Result<()> {
        Ok(())
    }
}
