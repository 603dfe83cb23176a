//! Packet sockets: the outermost layer handed to callers.
//!
//! UDP keeps datagram boundaries by itself. Over TCP a [`FrameCodec`]
//! delimits packets inside the byte stream.

use bytes::BytesMut;
use rust_p2p_socket_core::socket::{ConnState, SocketOption};
use std::io;
use std::net::SocketAddr;

mod stun;
mod tcp;
mod udp;

pub use stun::StunTcpCodec;
pub use tcp::{FrameCodec, LengthPrefixedCodec, TcpPacketSocket, LISTEN_BACKLOG};
pub use udp::UdpPacketSocket;

/// A non-blocking socket that sends and receives whole packets.
pub trait PacketSocket: Send {
    /// Send one packet to the connected peer.
    ///
    /// A stream socket that cannot write the whole frame keeps the rest and
    /// sends it on the next call or [`PacketSocket::flush`].
    fn send_packet(&mut self, packet: &[u8]) -> io::Result<usize>;
    fn send_to(&mut self, packet: &[u8], addr: SocketAddr) -> io::Result<usize>;
    /// Next complete packet and its sender, `WouldBlock` if none is ready.
    fn recv_packet(&mut self) -> io::Result<(BytesMut, SocketAddr)>;
    fn accept(&mut self) -> io::Result<(Box<dyn PacketSocket>, SocketAddr)>;
    /// Write out buffered frame bytes.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
    fn set_option(&mut self, option: SocketOption) -> io::Result<()>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
    fn remote_addr(&self) -> io::Result<SocketAddr>;
    fn state(&self) -> ConnState;
    fn on_connected(&mut self) -> io::Result<()>;
}
