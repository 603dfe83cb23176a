use rust_p2p_socket_core::socket::{Address, ConnState, Socket, SocketOption};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{
    ClientConfig, ClientConnection, DigitallySignedStruct, NamedGroup, RootCertStore,
    SignatureScheme,
};
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use super::TlsAdapter;
use crate::error::{Error, Result};

/// rustls client over any [`Socket`].
pub struct RustlsAdapter {
    inner: Box<dyn Socket>,
    alpn_protocols: Vec<String>,
    elliptic_curves: Vec<String>,
    ignore_bad_cert: bool,
    conn: Option<ClientConnection>,
    eof: bool,
}

impl RustlsAdapter {
    pub fn new(inner: Box<dyn Socket>) -> Self {
        Self {
            inner,
            alpn_protocols: Vec::new(),
            elliptic_curves: Vec::new(),
            ignore_bad_cert: false,
            conn: None,
            eof: false,
        }
    }

    /// Protocol chosen by the server, once the handshake got that far.
    pub fn negotiated_alpn(&self) -> Option<&[u8]> {
        self.conn.as_ref().and_then(|conn| conn.alpn_protocol())
    }

    pub fn is_handshaking(&self) -> bool {
        self.conn.as_ref().map_or(true, |conn| conn.is_handshaking())
    }

    fn client_config(&self) -> Result<ClientConfig> {
        let mut provider = rustls::crypto::ring::default_provider();
        if !self.elliptic_curves.is_empty() {
            let mut groups = Vec::with_capacity(self.elliptic_curves.len());
            for name in &self.elliptic_curves {
                let group = named_group(name)
                    .and_then(|named| provider.kx_groups.iter().find(|g| g.name() == named))
                    .copied()
                    .ok_or_else(|| Error::UnsupportedCurve(name.clone()))?;
                groups.push(group);
            }
            provider.kx_groups = groups;
        }
        let algorithms = provider.signature_verification_algorithms;
        let builder = ClientConfig::builder_with_provider(Arc::new(provider))
            .with_safe_default_protocol_versions()?;
        let mut config = if self.ignore_bad_cert {
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(InsecureVerifier { algorithms }))
                .with_no_client_auth()
        } else {
            let mut root_store = RootCertStore::empty();
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            builder
                .with_root_certificates(root_store)
                .with_no_client_auth()
        };
        config.alpn_protocols = self
            .alpn_protocols
            .iter()
            .map(|p| p.as_bytes().to_vec())
            .collect();
        Ok(config)
    }
}

fn named_group(name: &str) -> Option<NamedGroup> {
    match name.to_ascii_lowercase().as_str() {
        "x25519" => Some(NamedGroup::X25519),
        "x448" => Some(NamedGroup::X448),
        "p-256" | "prime256v1" | "secp256r1" => Some(NamedGroup::secp256r1),
        "p-384" | "secp384r1" => Some(NamedGroup::secp384r1),
        "p-521" | "secp521r1" => Some(NamedGroup::secp521r1),
        _ => None,
    }
}

struct SocketIo<'a>(&'a mut Box<dyn Socket>);

impl Read for SocketIo<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.recv(buf)
    }
}

impl Write for SocketIo<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.send(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn flush_tls(conn: &mut ClientConnection, inner: &mut Box<dyn Socket>) -> io::Result<()> {
    while conn.wants_write() {
        match conn.write_tls(&mut SocketIo(&mut *inner)) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn not_started() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "tls not started")
}

impl TlsAdapter for RustlsAdapter {
    fn set_alpn_protocols(&mut self, protocols: &[String]) {
        self.alpn_protocols = protocols.to_vec();
    }
    fn set_elliptic_curves(&mut self, curves: &[String]) {
        self.elliptic_curves = curves.to_vec();
    }
    fn set_ignore_bad_cert(&mut self, ignore: bool) {
        self.ignore_bad_cert = ignore;
    }
    fn start_tls(&mut self, hostname: &str) -> Result<()> {
        let server_name = match hostname.parse::<IpAddr>() {
            Ok(ip) => ServerName::from(ip),
            Err(_) => ServerName::try_from(hostname.to_string())
                .map_err(|_| Error::InvalidServerName(hostname.to_string()))?,
        };
        let config = self.client_config()?;
        let conn = ClientConnection::new(Arc::new(config), server_name)?;
        log::debug!(
            "tls handshake to {} started, verify certificate: {}",
            hostname,
            !self.ignore_bad_cert
        );
        self.conn = Some(conn);
        Ok(())
    }
    fn into_socket(self: Box<Self>) -> Box<dyn Socket> {
        self
    }
}

impl Socket for RustlsAdapter {
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
        if self.conn.is_none() {
            return Err(not_started());
        }
        self.inner.connect(addr)
    }
    fn listen(&mut self, _backlog: i32) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "tls client sockets cannot listen",
        ))
    }
    fn accept(&mut self) -> io::Result<(Box<dyn Socket>, SocketAddr)> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        let Self { conn, inner, .. } = self;
        let conn = conn.as_mut().ok_or_else(not_started)?;
        let len = conn.writer().write(buf)?;
        flush_tls(conn, inner)?;
        if len == 0 && !buf.is_empty() {
            // plaintext buffer full until the handshake completes
            return Err(io::Error::from(io::ErrorKind::WouldBlock));
        }
        Ok(len)
    }
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Self {
            conn, inner, eof, ..
        } = self;
        let conn = conn.as_mut().ok_or_else(not_started)?;
        loop {
            match conn.reader().read(buf) {
                Ok(len) => return Ok(len),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if *eof {
                        return Ok(0);
                    }
                }
                Err(e) => return Err(e),
            }
            flush_tls(conn, inner)?;
            match conn.read_tls(&mut SocketIo(&mut *inner)) {
                Ok(0) => *eof = true,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    flush_tls(conn, inner)?;
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
            if let Err(e) = conn.process_new_packets() {
                // deliver the alert before giving up
                let _ = flush_tls(conn, inner);
                return Err(io::Error::new(io::ErrorKind::InvalidData, e));
            }
            flush_tls(conn, inner)?;
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
        match self.inner.state() {
            ConnState::Connected if !self.is_handshaking() => ConnState::Connected,
            ConnState::Closed => ConnState::Closed,
            _ => ConnState::Connecting,
        }
    }
    fn on_connected(&mut self) -> io::Result<()> {
        self.inner.on_connected()?;
        let Self { conn, inner, .. } = self;
        match conn.as_mut() {
            Some(conn) => flush_tls(conn, inner),
            None => Ok(()),
        }
    }
}

/// Accepts any certificate chain but still checks handshake signatures.
struct InsecureVerifier {
    algorithms: WebPkiSupportedAlgorithms,
}

impl fmt::Debug for InsecureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InsecureVerifier")
    }
}

impl ServerCertVerifier for InsecureVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}
