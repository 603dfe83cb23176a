//! TLS layers: a rustls client adapter and a fake-TLS record framer.

use rust_p2p_socket_core::socket::Socket;

use crate::error::Result;

mod fake;
mod rustls_adapter;

pub use fake::{client_hello, server_hello, FakeTlsSocket, CLIENT_HELLO_LEN, SERVER_HELLO_LEN};
pub use rustls_adapter::RustlsAdapter;

/// A TLS client layer that is configured, then started before connecting.
///
/// `start_tls` only queues the ClientHello; it is written once the wrapped
/// socket reports the connection as established.
pub trait TlsAdapter: Socket {
    fn set_alpn_protocols(&mut self, protocols: &[String]);
    fn set_elliptic_curves(&mut self, curves: &[String]);
    /// Skip certificate validation. Off unless explicitly requested.
    fn set_ignore_bad_cert(&mut self, ignore: bool);
    fn start_tls(&mut self, hostname: &str) -> Result<()>;
    fn into_socket(self: Box<Self>) -> Box<dyn Socket>;
}
