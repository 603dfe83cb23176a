use rust_p2p_socket_core::bind::{bind_socket, PortRange};
use rust_p2p_socket_core::context::SocketContext;
use rust_p2p_socket_core::error::Error as CoreError;
use rust_p2p_socket_core::socket::{
    Address, AddressFamily, Socket, SocketOption, SocketProvider, SocketType,
};
use std::sync::Arc;

use crate::config::{PacketSocketOptions, ProxyInfo, TcpOptions, TlsMode};
use crate::error::{Error, Result};
use crate::framing::PacketSocket;
use crate::layer::{BasicLayerFactory, LayerFactory};
use crate::pipeline::ClientPipeline;
use crate::resolver::AsyncResolver;

/// Builds ready-to-use packet sockets.
pub trait PacketSocketFactory {
    /// UDP socket bound to `address`, scanning `min_port..=max_port` unless
    /// both are 0.
    fn create_udp_socket(
        &self,
        address: &Address,
        min_port: u16,
        max_port: u16,
    ) -> Result<Box<dyn PacketSocket>>;

    /// Listening TCP socket. Only fake TLS is available on listening sockets.
    fn create_server_tcp_socket(
        &self,
        local: &Address,
        min_port: u16,
        max_port: u16,
        opts: PacketSocketOptions,
    ) -> Result<Box<dyn PacketSocket>>;

    /// Outgoing TCP socket to `remote`, optionally through `proxy` and TLS.
    ///
    /// The connect is only issued; the caller's event loop reports completion
    /// through [`PacketSocket::on_connected`].
    fn create_client_tcp_socket(
        &self,
        local: &Address,
        remote: &Address,
        proxy: &ProxyInfo,
        user_agent: &str,
        options: &TcpOptions,
    ) -> Result<Box<dyn PacketSocket>>;

    fn create_client_tcp_socket_with_opts(
        &self,
        local: &Address,
        remote: &Address,
        proxy: &ProxyInfo,
        user_agent: &str,
        opts: PacketSocketOptions,
    ) -> Result<Box<dyn PacketSocket>> {
        self.create_client_tcp_socket(local, remote, proxy, user_agent, &opts.into())
    }

    fn create_resolver(&self) -> Box<dyn AsyncResolver>;
}

pub struct BasicPacketSocketFactory {
    context: SocketContext,
    layers: Box<dyn LayerFactory>,
}

impl Default for BasicPacketSocketFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl BasicPacketSocketFactory {
    /// A factory bound to the calling thread, using the provider installed
    /// for it with [`set_thread_provider`](rust_p2p_socket_core::context::set_thread_provider).
    pub fn new() -> Self {
        Self {
            context: SocketContext::current_thread(),
            layers: Box::new(BasicLayerFactory),
        }
    }
    pub fn with_provider(provider: Arc<dyn SocketProvider>) -> Self {
        Self {
            context: SocketContext::with_provider(provider),
            layers: Box::new(BasicLayerFactory),
        }
    }
    pub fn set_layers(mut self, layers: impl LayerFactory + 'static) -> Self {
        self.layers = Box::new(layers);
        self
    }

    fn create_socket(
        &self,
        family: AddressFamily,
        socket_type: SocketType,
    ) -> Result<Box<dyn Socket>> {
        let provider = self.context.provider()?;
        provider
            .create_socket(family, socket_type)
            .map_err(|e| CoreError::Unavailable(e).into())
    }
}

impl PacketSocketFactory for BasicPacketSocketFactory {
    fn create_udp_socket(
        &self,
        address: &Address,
        min_port: u16,
        max_port: u16,
    ) -> Result<Box<dyn PacketSocket>> {
        let range = PortRange::new(min_port, max_port)?;
        let mut socket = self.create_socket(address.family(), SocketType::Datagram)?;
        match bind_socket(socket.as_mut(), address, range) {
            Ok(local) => log::debug!("udp socket bound to {local}"),
            Err(e) => {
                log::error!("UDP bind failed: {e}");
                return Err(e.into());
            }
        }
        self.layers.udp(socket)
    }

    fn create_server_tcp_socket(
        &self,
        local: &Address,
        min_port: u16,
        max_port: u16,
        opts: PacketSocketOptions,
    ) -> Result<Box<dyn PacketSocket>> {
        if opts.contains(PacketSocketOptions::TLS)
            || opts.contains(PacketSocketOptions::TLS_INSECURE)
        {
            log::error!("TLS is not supported on listening sockets, {opts:?}");
            return Err(Error::TlsNotSupported);
        }
        let mode = opts.tls_mode()?;
        let range = PortRange::new(min_port, max_port)?;
        let mut socket = self.create_socket(local.family(), SocketType::Stream)?;
        match bind_socket(socket.as_mut(), local, range) {
            Ok(addr) => log::debug!("tcp listener bound to {addr}"),
            Err(e) => {
                log::error!("TCP bind failed: {e}");
                return Err(e.into());
            }
        }
        if mode == TlsMode::Fake {
            socket = self.layers.fake_tls(socket)?;
        }
        if let Err(e) = socket.set_option(SocketOption::NoDelay(true)) {
            log::warn!("set nodelay failed: {e:?}");
        }
        if opts.contains(PacketSocketOptions::STUN) {
            self.layers.stun_tcp(socket, true)
        } else {
            self.layers.tcp(socket, true)
        }
    }

    fn create_client_tcp_socket(
        &self,
        local: &Address,
        remote: &Address,
        proxy: &ProxyInfo,
        user_agent: &str,
        options: &TcpOptions,
    ) -> Result<Box<dyn PacketSocket>> {
        let mode = options.tls_mode()?;
        let socket = self.create_socket(local.family(), SocketType::Stream)?;
        ClientPipeline::new(socket, self.layers.as_ref(), remote)
            .bind(local)?
            .proxy(proxy, user_agent)?
            .tls(mode, options)?
            .connect()?
            .frame(options.opts)
    }

    fn create_resolver(&self) -> Box<dyn AsyncResolver> {
        self.layers.resolver()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyServer;
    use crate::test_util::{MockProvider, MockShared};
    use crate::tls::TlsAdapter;
    use rust_p2p_socket_core::context;
    use std::sync::atomic::Ordering;

    /// Records which layers get built, then builds the real ones.
    struct RecordingLayers {
        shared: Arc<MockShared>,
    }

    impl LayerFactory for RecordingLayers {
        fn socks5_proxy(
            &self,
            inner: Box<dyn Socket>,
            server: &ProxyServer,
        ) -> Result<Box<dyn Socket>> {
            self.shared.event("layer socks5");
            BasicLayerFactory.socks5_proxy(inner, server)
        }
        fn https_proxy(
            &self,
            inner: Box<dyn Socket>,
            user_agent: &str,
            server: &ProxyServer,
        ) -> Result<Box<dyn Socket>> {
            self.shared.event(format!("layer https {user_agent}"));
            BasicLayerFactory.https_proxy(inner, user_agent, server)
        }
        fn tls_adapter(&self, inner: Box<dyn Socket>) -> Result<Box<dyn TlsAdapter>> {
            self.shared.event("layer tls");
            BasicLayerFactory.tls_adapter(inner)
        }
        fn fake_tls(&self, inner: Box<dyn Socket>) -> Result<Box<dyn Socket>> {
            self.shared.event("layer fake_tls");
            BasicLayerFactory.fake_tls(inner)
        }
        fn stun_tcp(&self, inner: Box<dyn Socket>, listen: bool) -> Result<Box<dyn PacketSocket>> {
            self.shared.event(format!("layer stun_tcp listen={listen}"));
            BasicLayerFactory.stun_tcp(inner, listen)
        }
        fn tcp(&self, inner: Box<dyn Socket>, listen: bool) -> Result<Box<dyn PacketSocket>> {
            self.shared.event(format!("layer tcp listen={listen}"));
            BasicLayerFactory.tcp(inner, listen)
        }
        fn udp(&self, inner: Box<dyn Socket>) -> Result<Box<dyn PacketSocket>> {
            self.shared.event("layer udp");
            BasicLayerFactory.udp(inner)
        }
        fn resolver(&self) -> Box<dyn AsyncResolver> {
            BasicLayerFactory.resolver()
        }
    }

    fn factory() -> (BasicPacketSocketFactory, Arc<MockShared>) {
        let (provider, shared) = MockProvider::new();
        let factory = BasicPacketSocketFactory::with_provider(provider).set_layers(RecordingLayers {
            shared: shared.clone(),
        });
        (factory, shared)
    }

    fn addr(s: &str) -> Address {
        Address::new(s.parse().unwrap())
    }

    fn https_proxy() -> ProxyInfo {
        ProxyInfo::Https(ProxyServer::new(addr("10.0.0.42:3128")).set_credentials("user", "pass"))
    }

    #[test]
    fn client_layer_order() {
        let (factory, shared) = factory();
        let remote =
            Address::with_hostname("turn.example.org", "198.51.100.7:443".parse().unwrap());
        let options = TcpOptions::new(PacketSocketOptions::TLS | PacketSocketOptions::STUN)
            .set_alpn_protocols(vec!["stun.turn".to_string()]);
        let socket = factory
            .create_client_tcp_socket(
                &Address::any(AddressFamily::V4),
                &remote,
                &https_proxy(),
                "agent/1.0",
                &options,
            )
            .unwrap();
        assert_eq!(
            shared.events(),
            vec![
                "create V4 Stream",
                "bind 0.0.0.0:0",
                "layer https agent/1.0",
                "layer tls",
                "connect 10.0.0.42:3128",
                "layer stun_tcp listen=false",
                "option NoDelay(true)",
            ]
        );
        assert_eq!(socket.state(), rust_p2p_socket_core::socket::ConnState::Connecting);
        assert_eq!(shared.outstanding(), 1);
        drop(socket);
        assert_eq!(shared.outstanding(), 0);
    }

    #[test]
    fn plain_client_without_proxy() {
        let (factory, shared) = factory();
        let _socket = factory
            .create_client_tcp_socket_with_opts(
                &addr("192.168.1.5:0"),
                &addr("198.51.100.7:80"),
                &ProxyInfo::None,
                "",
                PacketSocketOptions::TLS_FAKE,
            )
            .unwrap();
        assert_eq!(
            shared.events(),
            vec![
                "create V4 Stream",
                "bind 192.168.1.5:0",
                "layer fake_tls",
                "connect 198.51.100.7:80",
                "layer tcp listen=false",
                "option NoDelay(true)",
            ]
        );
    }

    #[test]
    fn conflicting_tls_options_rejected_before_any_socket() {
        let flags = [
            PacketSocketOptions::TLS,
            PacketSocketOptions::TLS_FAKE,
            PacketSocketOptions::TLS_INSECURE,
        ];
        let (factory, shared) = factory();
        let mut combos = vec![flags[0] | flags[1] | flags[2]];
        for (i, a) in flags.iter().enumerate() {
            for b in flags.iter().skip(i + 1) {
                combos.push(*a | *b);
            }
        }
        for opts in combos {
            let result = factory.create_client_tcp_socket_with_opts(
                &Address::any(AddressFamily::V4),
                &addr("198.51.100.7:443"),
                &ProxyInfo::None,
                "",
                opts,
            );
            assert!(matches!(result, Err(Error::ConflictingTlsOptions(o)) if o == opts));
        }
        assert!(shared.events().is_empty());
    }

    #[test]
    fn server_tls_always_rejected() {
        let (factory, shared) = factory();
        for opts in [
            PacketSocketOptions::TLS,
            PacketSocketOptions::TLS_INSECURE,
            PacketSocketOptions::TLS | PacketSocketOptions::STUN,
            PacketSocketOptions::TLS | PacketSocketOptions::TLS_FAKE,
        ] {
            let result = factory.create_server_tcp_socket(&addr("0.0.0.0:0"), 0, 0, opts);
            assert!(matches!(result, Err(Error::TlsNotSupported)));
        }
        assert!(shared.events().is_empty());
    }

    #[test]
    fn server_fake_tls_stun() {
        let (factory, shared) = factory();
        let mut listener = factory
            .create_server_tcp_socket(
                &addr("0.0.0.0:0"),
                7000,
                7001,
                PacketSocketOptions::TLS_FAKE | PacketSocketOptions::STUN,
            )
            .unwrap();
        assert_eq!(
            shared.events(),
            vec![
                "create V4 Stream",
                "bind 0.0.0.0:7000",
                "layer fake_tls",
                "option NoDelay(true)",
                "layer stun_tcp listen=true",
                "listen 5",
            ]
        );
        assert_eq!(listener.local_addr().unwrap().port(), 7000);

        shared.pending_accepts.store(1, Ordering::SeqCst);
        let (mut conn, _) = listener.accept().unwrap();
        shared.push_inbound(&crate::tls::client_hello());
        assert_eq!(
            conn.recv_packet().unwrap_err().kind(),
            std::io::ErrorKind::WouldBlock
        );
        assert_eq!(shared.take_outbound().len(), crate::tls::SERVER_HELLO_LEN);
    }

    #[test]
    fn wildcard_bind_failure_still_connects() {
        let (factory, shared) = factory();
        shared.fail_bind.store(true, Ordering::SeqCst);
        let socket = factory
            .create_client_tcp_socket_with_opts(
                &Address::any(AddressFamily::V4),
                &addr("198.51.100.7:80"),
                &ProxyInfo::None,
                "",
                PacketSocketOptions::empty(),
            )
            .unwrap();
        assert!(shared.events().contains(&"connect 198.51.100.7:80".to_string()));
        drop(socket);
        assert_eq!(shared.outstanding(), 0);
    }

    #[test]
    fn specific_bind_failure_aborts() {
        let (factory, shared) = factory();
        shared.fail_bind.store(true, Ordering::SeqCst);
        let result = factory.create_client_tcp_socket_with_opts(
            &addr("192.168.1.5:0"),
            &addr("198.51.100.7:80"),
            &https_proxy(),
            "",
            PacketSocketOptions::TLS,
        );
        assert!(matches!(result, Err(Error::Core(CoreError::Bind { .. }))));
        assert!(!shared
            .events()
            .iter()
            .any(|e| e.starts_with("connect") || e.starts_with("layer")));
        assert_eq!(shared.outstanding(), 0);
    }

    #[test]
    fn failures_after_bind_release_everything() {
        let (factory, shared) = factory();
        shared.fail_connect.store(true, Ordering::SeqCst);
        let result = factory.create_client_tcp_socket_with_opts(
            &Address::any(AddressFamily::V4),
            &addr("198.51.100.7:443"),
            &https_proxy(),
            "agent",
            PacketSocketOptions::TLS_INSECURE,
        );
        assert!(matches!(result, Err(Error::Core(CoreError::Connect { .. }))));
        assert_eq!(shared.outstanding(), 0);

        shared.fail_connect.store(false, Ordering::SeqCst);
        let options = TcpOptions::new(PacketSocketOptions::TLS)
            .set_elliptic_curves(vec!["sect163k1".to_string()]);
        let result = factory.create_client_tcp_socket(
            &Address::any(AddressFamily::V4),
            &addr("198.51.100.7:443"),
            &ProxyInfo::Socks5(ProxyServer::new(addr("10.0.0.1:1080"))),
            "",
            &options,
        );
        assert!(matches!(result, Err(Error::UnsupportedCurve(_))));
        assert_eq!(shared.outstanding(), 0);

        shared.fail_create.store(true, Ordering::SeqCst);
        let result = factory.create_udp_socket(&addr("0.0.0.0:0"), 0, 0);
        assert!(matches!(result, Err(Error::Core(CoreError::Unavailable(_)))));
    }

    #[test]
    fn udp_port_range() {
        let (factory, shared) = factory();
        shared.occupied.lock().extend([5000, 5001]);
        let socket = factory.create_udp_socket(&addr("0.0.0.0:0"), 5000, 5002).unwrap();
        assert_eq!(socket.local_addr().unwrap().port(), 5002);
        assert_eq!(
            shared.events(),
            vec!["create V4 Datagram", "bind 0.0.0.0:5002", "layer udp"]
        );
        drop(socket);

        shared.occupied.lock().insert(5002);
        let result = factory.create_udp_socket(&addr("0.0.0.0:0"), 5000, 5002);
        assert!(matches!(
            result,
            Err(Error::Core(CoreError::PortRangeExhausted { min: 5000, max: 5002, .. }))
        ));
        assert_eq!(shared.outstanding(), 0);

        let result = factory.create_udp_socket(&addr("0.0.0.0:0"), 9, 8);
        assert!(matches!(
            result,
            Err(Error::Core(CoreError::InvalidPortRange { min: 9, max: 8 }))
        ));
    }

    #[test]
    fn thread_bound_factory() {
        let (provider, shared) = MockProvider::new();
        context::set_thread_provider(provider);
        let factory = BasicPacketSocketFactory::new();
        factory.create_udp_socket(&addr("127.0.0.1:0"), 0, 0).unwrap();
        assert_eq!(shared.events()[0], "create V4 Datagram");
        context::clear_thread_provider();

        let result = std::thread::spawn(move || {
            factory
                .create_udp_socket(&addr("127.0.0.1:0"), 0, 0)
                .map(|_| ())
        })
        .join()
        .unwrap();
        assert!(matches!(result, Err(Error::Core(CoreError::WrongThread))));
    }

    #[test]
    fn resolver_from_factory() {
        let (factory, _shared) = factory();
        let mut resolver = factory.create_resolver();
        resolver.start(&addr("203.0.113.9:53"));
        assert!(resolver.is_done());
        assert!(resolver.resolved_address(AddressFamily::V4).is_some());
    }
}
