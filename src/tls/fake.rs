use bytes::{Buf, BufMut, BytesMut};
use rust_p2p_socket_core::socket::{Address, ConnState, Socket, SocketOption};
use std::io;
use std::net::SocketAddr;

const RECORD_HANDSHAKE: u8 = 0x16;
const VERSION_TLS10: [u8; 2] = [0x03, 0x01];
const HANDSHAKE_CLIENT_HELLO: u8 = 0x01;
const HANDSHAKE_SERVER_HELLO: u8 = 0x02;
const CIPHER_RSA_AES128_SHA: u16 = 0x002f;

pub const CLIENT_HELLO_LEN: usize = 50;
pub const SERVER_HELLO_LEN: usize = 47;

const READ_CHUNK: usize = 256;

fn hello_header(out: &mut BytesMut, handshake_type: u8, len: usize) {
    out.put_u8(RECORD_HANDSHAKE);
    out.put_slice(&VERSION_TLS10);
    out.put_u16((len - 5) as u16);
    out.put_u8(handshake_type);
    out.put_u8(0);
    out.put_u16((len - 9) as u16);
    out.put_slice(&VERSION_TLS10);
    out.put_slice(&rand::random::<[u8; 32]>());
    // empty session id
    out.put_u8(0);
}

/// A TLS 1.0 ClientHello record with a random nonce and no extensions.
pub fn client_hello() -> BytesMut {
    let mut out = BytesMut::with_capacity(CLIENT_HELLO_LEN);
    hello_header(&mut out, HANDSHAKE_CLIENT_HELLO, CLIENT_HELLO_LEN);
    out.put_u16(2);
    out.put_u16(CIPHER_RSA_AES128_SHA);
    out.put_slice(&[1, 0]);
    out
}

/// The ServerHello record answering [`client_hello`].
pub fn server_hello() -> BytesMut {
    let mut out = BytesMut::with_capacity(SERVER_HELLO_LEN);
    hello_header(&mut out, HANDSHAKE_SERVER_HELLO, SERVER_HELLO_LEN);
    out.put_u16(CIPHER_RSA_AES128_SHA);
    out.put_u8(0);
    out
}

fn is_hello(buf: &[u8], handshake_type: u8, len: usize) -> bool {
    buf.len() >= len
        && buf[0] == RECORD_HANDSHAKE
        && buf[1..3] == VERSION_TLS10
        && u16::from_be_bytes([buf[3], buf[4]]) as usize == len - 5
        && buf[5] == handshake_type
        && u32::from_be_bytes([0, buf[6], buf[7], buf[8]]) as usize == len - 9
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Role {
    Client,
    Server,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum FakeState {
    Idle,
    AwaitHello,
    Established,
    Failed,
}

/// Makes a plain TCP stream open like a TLS session.
///
/// Each side sends one hello record; everything after that passes through
/// unencrypted. Enough to get past middleboxes that only admit port-443
/// traffic starting with a TLS handshake.
pub struct FakeTlsSocket {
    inner: Box<dyn Socket>,
    role: Role,
    state: FakeState,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl FakeTlsSocket {
    /// Client side; the hello goes out once the connection is established.
    pub fn new(inner: Box<dyn Socket>) -> Self {
        Self::with_role(inner, Role::Client, FakeState::Idle)
    }

    /// Server side of a connection accepted by a fake-TLS listener.
    pub fn accepted(inner: Box<dyn Socket>) -> Self {
        Self::with_role(inner, Role::Server, FakeState::AwaitHello)
    }

    fn with_role(inner: Box<dyn Socket>, role: Role, state: FakeState) -> Self {
        Self {
            inner,
            role,
            state,
            read_buf: BytesMut::new(),
            write_buf: BytesMut::new(),
        }
    }

    pub fn is_established(&self) -> bool {
        self.state == FakeState::Established
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

    fn drive_handshake(&mut self) -> io::Result<()> {
        self.flush()?;
        let (expected_type, expected_len) = match self.role {
            Role::Client => (HANDSHAKE_SERVER_HELLO, SERVER_HELLO_LEN),
            Role::Server => (HANDSHAKE_CLIENT_HELLO, CLIENT_HELLO_LEN),
        };
        let mut chunk = [0u8; READ_CHUNK];
        let want = expected_len.saturating_sub(self.read_buf.len()).max(1);
        let len = self.inner.recv(&mut chunk[..want])?;
        if len == 0 {
            self.state = FakeState::Failed;
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "peer closed during fake tls handshake",
            ));
        }
        self.read_buf.extend_from_slice(&chunk[..len]);
        if self.read_buf.len() < expected_len {
            return Ok(());
        }
        if !is_hello(&self.read_buf, expected_type, expected_len) {
            log::warn!("fake tls: unexpected hello from peer");
            self.state = FakeState::Failed;
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "not a fake tls hello",
            ));
        }
        self.read_buf.advance(expected_len);
        if self.role == Role::Server {
            self.write_buf.extend_from_slice(&server_hello());
        }
        log::debug!("fake tls established as {:?}", self.role);
        self.state = FakeState::Established;
        self.flush()
    }
}

impl Socket for FakeTlsSocket {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.inner.peer_addr()
    }
    fn bind(&mut self, addr: SocketAddr) -> io::Result<()> {
        self.inner.bind(addr)
    }
    fn connect(&mut self, addr: &Address) -> io::Result<()> {
        self.inner.connect(addr)
    }
    fn listen(&mut self, backlog: i32) -> io::Result<()> {
        self.role = Role::Server;
        self.inner.listen(backlog)
    }
    fn accept(&mut self) -> io::Result<(Box<dyn Socket>, SocketAddr)> {
        let (socket, addr) = self.inner.accept()?;
        Ok((Box::new(FakeTlsSocket::accepted(socket)), addr))
    }
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.state {
            FakeState::Established => {
                self.flush()?;
                if !self.write_buf.is_empty() {
                    return Err(io::Error::from(io::ErrorKind::WouldBlock));
                }
                self.inner.send(buf)
            }
            FakeState::AwaitHello => {
                self.drive_handshake()?;
                Err(io::Error::from(io::ErrorKind::WouldBlock))
            }
            FakeState::Idle => Err(io::Error::from(io::ErrorKind::WouldBlock)),
            FakeState::Failed => Err(io::Error::from(io::ErrorKind::NotConnected)),
        }
    }
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.state {
                FakeState::Established => {
                    if self.read_buf.is_empty() {
                        return self.inner.recv(buf);
                    }
                    let len = buf.len().min(self.read_buf.len());
                    buf[..len].copy_from_slice(&self.read_buf[..len]);
                    self.read_buf.advance(len);
                    return Ok(len);
                }
                FakeState::AwaitHello => self.drive_handshake()?,
                FakeState::Idle => return Err(io::Error::from(io::ErrorKind::WouldBlock)),
                FakeState::Failed => return Err(io::Error::from(io::ErrorKind::NotConnected)),
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
            FakeState::Established => self.inner.state(),
            FakeState::Failed => ConnState::Closed,
            FakeState::Idle if self.inner.state() == ConnState::Closed => ConnState::Closed,
            FakeState::Idle | FakeState::AwaitHello => ConnState::Connecting,
        }
    }
    fn on_connected(&mut self) -> io::Result<()> {
        self.inner.on_connected()?;
        if self.role == Role::Client && self.state == FakeState::Idle {
            self.write_buf.extend_from_slice(&client_hello());
            self.state = FakeState::AwaitHello;
            self.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::MockShared;
    use std::sync::atomic::Ordering;

    #[test]
    fn hello_records() {
        let hello = client_hello();
        assert_eq!(hello.len(), CLIENT_HELLO_LEN);
        assert!(is_hello(&hello, HANDSHAKE_CLIENT_HELLO, CLIENT_HELLO_LEN));
        assert!(!is_hello(&hello, HANDSHAKE_SERVER_HELLO, CLIENT_HELLO_LEN));
        let hello = server_hello();
        assert_eq!(hello.len(), SERVER_HELLO_LEN);
        assert!(is_hello(&hello, HANDSHAKE_SERVER_HELLO, SERVER_HELLO_LEN));
        assert_ne!(client_hello()[11..43], client_hello()[11..43]);
    }

    #[test]
    fn client_sends_hello_and_waits_for_server() {
        let shared = MockShared::new();
        let mut socket = FakeTlsSocket::new(shared.socket());
        socket
            .connect(&Address::new("192.0.2.10:443".parse().unwrap()))
            .unwrap();
        assert!(shared.take_outbound().is_empty());
        socket.on_connected().unwrap();
        let hello = shared.take_outbound();
        assert!(is_hello(&hello, HANDSHAKE_CLIENT_HELLO, CLIENT_HELLO_LEN));
        assert_eq!(socket.state(), ConnState::Connecting);

        let e = socket.send(b"early").unwrap_err();
        assert_eq!(e.kind(), io::ErrorKind::WouldBlock);

        shared.push_inbound(&server_hello());
        shared.push_inbound(b"data");
        let mut buf = [0u8; 16];
        let len = socket.recv(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"data");
        assert_eq!(socket.state(), ConnState::Connected);
        socket.send(b"reply").unwrap();
        assert_eq!(shared.take_outbound(), b"reply");
    }

    #[test]
    fn accepted_socket_answers_client_hello() {
        let shared = MockShared::new();
        let mut listener = FakeTlsSocket::new(shared.socket());
        listener.listen(5).unwrap();
        shared.pending_accepts.store(1, Ordering::SeqCst);
        let (mut accepted, _) = listener.accept().unwrap();

        let mut buf = [0u8; 16];
        let e = accepted.recv(&mut buf).unwrap_err();
        assert_eq!(e.kind(), io::ErrorKind::WouldBlock);

        shared.push_inbound(&client_hello());
        let e = accepted.recv(&mut buf).unwrap_err();
        assert_eq!(e.kind(), io::ErrorKind::WouldBlock);
        let answer = shared.take_outbound();
        assert!(is_hello(&answer, HANDSHAKE_SERVER_HELLO, SERVER_HELLO_LEN));
        assert_eq!(accepted.state(), ConnState::Connected);
    }

    #[test]
    fn garbage_hello_fails() {
        let shared = MockShared::new();
        let mut socket = FakeTlsSocket::accepted(shared.socket());
        shared.push_inbound(&[0x47; CLIENT_HELLO_LEN]);
        let mut buf = [0u8; 16];
        let e = socket.recv(&mut buf).unwrap_err();
        assert_eq!(e.kind(), io::ErrorKind::InvalidData);
        assert_eq!(socket.state(), ConnState::Closed);
        drop(socket);
        assert_eq!(shared.outstanding(), 0);
    }
}
