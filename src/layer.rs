use rust_p2p_socket_core::socket::Socket;

use crate::config::ProxyServer;
use crate::error::Result;
use crate::framing::{
    LengthPrefixedCodec, PacketSocket, StunTcpCodec, TcpPacketSocket, UdpPacketSocket,
};
use crate::proxy::ProxySocket;
use crate::resolver::{AsyncResolver, BasicResolver};
use crate::tls::{FakeTlsSocket, RustlsAdapter, TlsAdapter};

/// Constructs the layers a socket factory stacks on top of raw sockets.
///
/// Every method takes ownership of the socket it wraps. When a method fails
/// the socket has been dropped with it.
pub trait LayerFactory: Send + Sync {
    fn socks5_proxy(&self, inner: Box<dyn Socket>, server: &ProxyServer) -> Result<Box<dyn Socket>>;
    fn https_proxy(
        &self,
        inner: Box<dyn Socket>,
        user_agent: &str,
        server: &ProxyServer,
    ) -> Result<Box<dyn Socket>>;
    fn tls_adapter(&self, inner: Box<dyn Socket>) -> Result<Box<dyn TlsAdapter>>;
    fn fake_tls(&self, inner: Box<dyn Socket>) -> Result<Box<dyn Socket>>;
    /// STUN-TCP framing. A `listen` socket must already be bound.
    fn stun_tcp(&self, inner: Box<dyn Socket>, listen: bool) -> Result<Box<dyn PacketSocket>>;
    /// Length-prefixed framing. A `listen` socket must already be bound.
    fn tcp(&self, inner: Box<dyn Socket>, listen: bool) -> Result<Box<dyn PacketSocket>>;
    fn udp(&self, inner: Box<dyn Socket>) -> Result<Box<dyn PacketSocket>>;
    fn resolver(&self) -> Box<dyn AsyncResolver>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BasicLayerFactory;

impl LayerFactory for BasicLayerFactory {
    fn socks5_proxy(
        &self,
        inner: Box<dyn Socket>,
        server: &ProxyServer,
    ) -> Result<Box<dyn Socket>> {
        Ok(Box::new(ProxySocket::socks5(inner, server)))
    }
    fn https_proxy(
        &self,
        inner: Box<dyn Socket>,
        user_agent: &str,
        server: &ProxyServer,
    ) -> Result<Box<dyn Socket>> {
        Ok(Box::new(ProxySocket::https(inner, user_agent, server)))
    }
    fn tls_adapter(&self, inner: Box<dyn Socket>) -> Result<Box<dyn TlsAdapter>> {
        Ok(Box::new(RustlsAdapter::new(inner)))
    }
    fn fake_tls(&self, inner: Box<dyn Socket>) -> Result<Box<dyn Socket>> {
        Ok(Box::new(FakeTlsSocket::new(inner)))
    }
    fn stun_tcp(&self, inner: Box<dyn Socket>, listen: bool) -> Result<Box<dyn PacketSocket>> {
        let codec = Box::new(StunTcpCodec);
        Ok(if listen {
            Box::new(TcpPacketSocket::listen(inner, codec)?)
        } else {
            Box::new(TcpPacketSocket::new(inner, codec))
        })
    }
    fn tcp(&self, inner: Box<dyn Socket>, listen: bool) -> Result<Box<dyn PacketSocket>> {
        let codec = Box::new(LengthPrefixedCodec);
        Ok(if listen {
            Box::new(TcpPacketSocket::listen(inner, codec)?)
        } else {
            Box::new(TcpPacketSocket::new(inner, codec))
        })
    }
    fn udp(&self, inner: Box<dyn Socket>) -> Result<Box<dyn PacketSocket>> {
        Ok(Box::new(UdpPacketSocket::new(inner)))
    }
    fn resolver(&self) -> Box<dyn AsyncResolver> {
        Box::new(BasicResolver::new())
    }
}
