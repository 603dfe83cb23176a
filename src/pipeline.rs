//! Step-by-step construction of an outgoing TCP packet socket.
//!
//! Each step consumes the pipeline and hands back the next one. A failing step
//! returns the error and drops the pipeline, which drops every layer built so
//! far, so no half-built socket ever escapes.

use rust_p2p_socket_core::bind::{bind_socket, PortRange};
use rust_p2p_socket_core::error::Error as CoreError;
use rust_p2p_socket_core::socket::{Address, Socket, SocketOption};

use crate::config::{PacketSocketOptions, ProxyInfo, TcpOptions, TlsMode};
use crate::error::Result;
use crate::framing::PacketSocket;
use crate::layer::LayerFactory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Created,
    Bound,
    ProxyWrapped,
    TlsInitiated,
    FakeTlsWrapped,
    Connecting,
    Framed,
    Ready,
}

pub struct ClientPipeline<'a> {
    layers: &'a dyn LayerFactory,
    remote: &'a Address,
    socket: Box<dyn Socket>,
    stage: Stage,
}

impl<'a> ClientPipeline<'a> {
    pub fn new(socket: Box<dyn Socket>, layers: &'a dyn LayerFactory, remote: &'a Address) -> Self {
        log::debug!("client socket to {}: {:?}", remote, Stage::Created);
        Self {
            layers,
            remote,
            socket,
            stage: Stage::Created,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn enter(&mut self, stage: Stage) {
        log::debug!("client socket to {}: {:?} -> {:?}", self.remote, self.stage, stage);
        self.stage = stage;
    }

    /// Binds to `local`. A wildcard address that fails to bind is left to
    /// the implicit bind of connect.
    pub fn bind(mut self, local: &Address) -> Result<Self> {
        if let Err(e) = bind_socket(self.socket.as_mut(), local, PortRange::ANY) {
            if !local.is_any_ip() {
                log::error!("TCP bind failed: {e}");
                return Err(e.into());
            }
            log::warn!("TCP bind to {local} failed, connecting unbound: {e}");
        }
        self.enter(Stage::Bound);
        Ok(self)
    }

    pub fn proxy(mut self, proxy: &ProxyInfo, user_agent: &str) -> Result<Self> {
        match proxy {
            ProxyInfo::None => return Ok(self),
            ProxyInfo::Socks5(server) => {
                self.socket = self.layers.socks5_proxy(self.socket, server)?;
            }
            ProxyInfo::Https(server) => {
                self.socket = self.layers.https_proxy(self.socket, user_agent, server)?;
            }
        }
        self.enter(Stage::ProxyWrapped);
        Ok(self)
    }

    pub fn tls(mut self, mode: TlsMode, options: &TcpOptions) -> Result<Self> {
        match mode {
            TlsMode::None => {}
            TlsMode::Real | TlsMode::Insecure => {
                let mut adapter = self.layers.tls_adapter(self.socket)?;
                adapter.set_alpn_protocols(&options.tls_alpn_protocols);
                adapter.set_elliptic_curves(&options.tls_elliptic_curves);
                adapter.set_ignore_bad_cert(mode == TlsMode::Insecure);
                let host = self.remote.host();
                if let Err(e) = adapter.start_tls(&host) {
                    log::error!("start tls to {host} failed: {e}");
                    return Err(e);
                }
                self.socket = adapter.into_socket();
                self.enter(Stage::TlsInitiated);
            }
            TlsMode::Fake => {
                self.socket = self.layers.fake_tls(self.socket)?;
                self.enter(Stage::FakeTlsWrapped);
            }
        }
        Ok(self)
    }

    /// Issues the non-blocking connect. Completion is reported to the
    /// returned socket through `on_connected`.
    pub fn connect(mut self) -> Result<Self> {
        if let Err(source) = self.socket.connect(self.remote) {
            log::error!("TCP connect to {} failed: {source}", self.remote);
            return Err(CoreError::Connect {
                addr: self.remote.socket_addr(),
                source,
            }
            .into());
        }
        self.enter(Stage::Connecting);
        Ok(self)
    }

    pub fn frame(self, opts: PacketSocketOptions) -> Result<Box<dyn PacketSocket>> {
        let Self {
            layers,
            remote,
            socket,
            stage,
        } = self;
        let stun = opts.contains(PacketSocketOptions::STUN);
        let mut framed = if stun {
            layers.stun_tcp(socket, false)?
        } else {
            layers.tcp(socket, false)?
        };
        log::debug!("client socket to {remote}: {stage:?} -> {:?}, stun: {stun}", Stage::Framed);
        if let Err(e) = framed.set_option(SocketOption::NoDelay(true)) {
            log::warn!("set nodelay failed: {e:?}");
        }
        log::debug!("client socket to {remote}: {:?} -> {:?}", Stage::Framed, Stage::Ready);
        Ok(framed)
    }
}
