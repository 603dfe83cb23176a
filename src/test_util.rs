//! Socket doubles shared by the unit tests.

use bytes::BytesMut;
use parking_lot::Mutex;
use rust_p2p_socket_core::socket::{
    Address, AddressFamily, ConnState, Socket, SocketOption, SocketProvider, SocketType,
};
use std::collections::HashSet;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// State shared by a [`MockProvider`] and every socket it handed out.
#[derive(Default)]
pub(crate) struct MockShared {
    outstanding: AtomicUsize,
    pub(crate) fail_create: AtomicBool,
    pub(crate) fail_bind: AtomicBool,
    pub(crate) fail_connect: AtomicBool,
    pub(crate) pending_accepts: AtomicUsize,
    pub(crate) occupied: Mutex<HashSet<u16>>,
    events: Mutex<Vec<String>>,
    inbound: Mutex<BytesMut>,
    outbound: Mutex<BytesMut>,
}

impl MockShared {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
    pub(crate) fn socket(self: &Arc<Self>) -> Box<dyn Socket> {
        Box::new(self.mock())
    }
    fn mock(self: &Arc<Self>) -> MockSocket {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        MockSocket {
            shared: self.clone(),
            bound: None,
            peer: None,
            state: ConnState::Closed,
        }
    }
    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }
    pub(crate) fn event(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }
    pub(crate) fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
    pub(crate) fn push_inbound(&self, data: &[u8]) {
        self.inbound.lock().extend_from_slice(data);
    }
    pub(crate) fn take_outbound(&self) -> Vec<u8> {
        self.outbound.lock().split().to_vec()
    }
}

pub(crate) struct MockProvider {
    pub(crate) shared: Arc<MockShared>,
}

impl MockProvider {
    pub(crate) fn new() -> (Arc<MockProvider>, Arc<MockShared>) {
        let shared = MockShared::new();
        (
            Arc::new(MockProvider {
                shared: shared.clone(),
            }),
            shared,
        )
    }
}

impl SocketProvider for MockProvider {
    fn create_socket(
        &self,
        family: AddressFamily,
        socket_type: SocketType,
    ) -> io::Result<Box<dyn Socket>> {
        if self.shared.fail_create.load(Ordering::SeqCst) {
            return Err(io::Error::from(io::ErrorKind::OutOfMemory));
        }
        self.shared
            .event(format!("create {family:?} {socket_type:?}"));
        Ok(self.shared.socket())
    }
}

pub(crate) struct MockSocket {
    shared: Arc<MockShared>,
    bound: Option<SocketAddr>,
    peer: Option<SocketAddr>,
    state: ConnState,
}

impl Drop for MockSocket {
    fn drop(&mut self) {
        self.shared.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Socket for MockSocket {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.bound
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }
    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.peer
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }
    fn bind(&mut self, addr: SocketAddr) -> io::Result<()> {
        if self.shared.fail_bind.load(Ordering::SeqCst)
            || self.shared.occupied.lock().contains(&addr.port())
        {
            return Err(io::Error::from(io::ErrorKind::AddrInUse));
        }
        self.shared.event(format!("bind {addr}"));
        self.bound = Some(addr);
        Ok(())
    }
    fn connect(&mut self, addr: &Address) -> io::Result<()> {
        if self.shared.fail_connect.load(Ordering::SeqCst) {
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused));
        }
        self.shared.event(format!("connect {}", addr.socket_addr()));
        self.peer = Some(addr.socket_addr());
        self.state = ConnState::Connecting;
        Ok(())
    }
    fn listen(&mut self, backlog: i32) -> io::Result<()> {
        self.shared.event(format!("listen {backlog}"));
        Ok(())
    }
    fn accept(&mut self) -> io::Result<(Box<dyn Socket>, SocketAddr)> {
        let pending = &self.shared.pending_accepts;
        if pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
        {
            return Err(io::Error::from(io::ErrorKind::WouldBlock));
        }
        self.shared.event("accept");
        let addr: SocketAddr = "10.0.0.9:50000".parse().unwrap();
        let mut socket = self.shared.mock();
        socket.peer = Some(addr);
        socket.state = ConnState::Connected;
        Ok((Box::new(socket), addr))
    }
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.shared.outbound.lock().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inbound = self.shared.inbound.lock();
        if inbound.is_empty() {
            return Err(io::Error::from(io::ErrorKind::WouldBlock));
        }
        let len = buf.len().min(inbound.len());
        buf[..len].copy_from_slice(&inbound.split_to(len));
        Ok(len)
    }
    fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.shared.event(format!("send_to {addr}"));
        self.send(buf)
    }
    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let len = self.recv(buf)?;
        Ok((len, "10.0.0.9:50000".parse().unwrap()))
    }
    fn set_option(&mut self, option: SocketOption) -> io::Result<()> {
        self.shared.event(format!("option {option:?}"));
        Ok(())
    }
    fn state(&self) -> ConnState {
        self.state
    }
    fn on_connected(&mut self) -> io::Result<()> {
        self.state = ConnState::Connected;
        Ok(())
    }
}
