use bytes::{Buf, BufMut, BytesMut};
use dyn_clone::DynClone;
use rust_p2p_socket_core::socket::{ConnState, Socket, SocketOption};
use std::io;
use std::net::SocketAddr;

use super::PacketSocket;

pub const LISTEN_BACKLOG: i32 = 5;

const READ_CHUNK: usize = 64 * 1024;

/// Delimits packets in a byte stream.
pub trait FrameCodec: DynClone + Send {
    /// Total length of the frame starting at `buf[0]`, `None` while the
    /// header is incomplete.
    fn frame_len(&self, buf: &[u8]) -> io::Result<Option<usize>>;
    fn encode(&self, packet: &[u8], out: &mut BytesMut) -> io::Result<()>;
    /// Payload of one complete frame.
    fn decode(&self, frame: BytesMut) -> BytesMut;
}

dyn_clone::clone_trait_object!(FrameCodec);

/// Big-endian `u16` length followed by the packet.
#[derive(Clone, Copy, Debug, Default)]
pub struct LengthPrefixedCodec;

impl FrameCodec for LengthPrefixedCodec {
    fn frame_len(&self, buf: &[u8]) -> io::Result<Option<usize>> {
        if buf.len() < 2 {
            return Ok(None);
        }
        Ok(Some(2 + u16::from_be_bytes([buf[0], buf[1]]) as usize))
    }
    fn encode(&self, packet: &[u8], out: &mut BytesMut) -> io::Result<()> {
        if packet.len() > u16::MAX as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "packet too large for a 16-bit length prefix",
            ));
        }
        out.reserve(2 + packet.len());
        out.put_u16(packet.len() as u16);
        out.put_slice(packet);
        Ok(())
    }
    fn decode(&self, mut frame: BytesMut) -> BytesMut {
        frame.split_off(2)
    }
}

/// Packet framing over a stream [`Socket`] (plain TCP or any tunnel on top).
pub struct TcpPacketSocket {
    inner: Box<dyn Socket>,
    codec: Box<dyn FrameCodec>,
    listening: bool,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl TcpPacketSocket {
    /// Frames an outgoing or accepted connection.
    pub fn new(inner: Box<dyn Socket>, codec: Box<dyn FrameCodec>) -> Self {
        Self {
            inner,
            codec,
            listening: false,
            read_buf: BytesMut::new(),
            write_buf: BytesMut::new(),
        }
    }

    /// Starts listening on an already bound socket.
    pub fn listen(mut inner: Box<dyn Socket>, codec: Box<dyn FrameCodec>) -> io::Result<Self> {
        inner.listen(LISTEN_BACKLOG)?;
        let mut socket = Self::new(inner, codec);
        socket.listening = true;
        Ok(socket)
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    fn next_frame(&mut self) -> io::Result<Option<BytesMut>> {
        match self.codec.frame_len(&self.read_buf)? {
            Some(len) if self.read_buf.len() >= len => {
                let frame = self.read_buf.split_to(len);
                Ok(Some(self.codec.decode(frame)))
            }
            _ => Ok(None),
        }
    }
}

impl PacketSocket for TcpPacketSocket {
    fn send_packet(&mut self, packet: &[u8]) -> io::Result<usize> {
        if self.listening {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        }
        self.flush()?;
        if !self.write_buf.is_empty() {
            return Err(io::Error::from(io::ErrorKind::WouldBlock));
        }
        self.codec.encode(packet, &mut self.write_buf)?;
        match self.flush() {
            Err(e) if e.kind() != io::ErrorKind::WouldBlock => Err(e),
            _ => Ok(packet.len()),
        }
    }
    fn send_to(&mut self, packet: &[u8], addr: SocketAddr) -> io::Result<usize> {
        if self.inner.peer_addr().is_ok_and(|peer| peer != addr) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "stream socket is connected to another peer",
            ));
        }
        self.send_packet(packet)
    }
    fn recv_packet(&mut self) -> io::Result<(BytesMut, SocketAddr)> {
        if self.listening {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        }
        loop {
            if let Some(packet) = self.next_frame()? {
                return Ok((packet, self.remote_addr()?));
            }
            let filled = self.read_buf.len();
            self.read_buf.resize(filled + READ_CHUNK, 0);
            let len = match self.inner.recv(&mut self.read_buf[filled..]) {
                Ok(len) => len,
                Err(e) => {
                    self.read_buf.truncate(filled);
                    return Err(e);
                }
            };
            self.read_buf.truncate(filled + len);
            if len == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by peer",
                ));
            }
        }
    }
    fn accept(&mut self) -> io::Result<(Box<dyn PacketSocket>, SocketAddr)> {
        if !self.listening {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "socket is not listening",
            ));
        }
        let (mut socket, addr) = self.inner.accept()?;
        if let Err(e) = socket.set_option(SocketOption::NoDelay(true)) {
            log::warn!("set nodelay on connection from {addr} failed: {e:?}");
        }
        let codec = dyn_clone::clone_box(&*self.codec);
        Ok((Box::new(TcpPacketSocket::new(socket, codec)), addr))
    }
    fn flush(&mut self) -> io::Result<()> {
        while !self.write_buf.is_empty() {
            match self.inner.send(&self.write_buf) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
                Ok(len) => self.write_buf.advance(len),
                Err(e) => return Err(e),
            }
        }
        Ok(())
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
        self.inner.state()
    }
    fn on_connected(&mut self) -> io::Result<()> {
        self.inner.on_connected()?;
        match self.flush() {
            Err(e) if e.kind() != io::ErrorKind::WouldBlock => Err(e),
            _ => Ok(()),
        }
    }
}
