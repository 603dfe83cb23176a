//! Packet sockets for peer-to-peer connections.
//!
//! [`BasicPacketSocketFactory`] turns raw sockets into ready-to-use packet
//! sockets: UDP, listening TCP, and outgoing TCP optionally tunneled through a
//! SOCKS5 or HTTPS proxy and wrapped in real or fake TLS.
//!
//! ```no_run
//! use rustp2p_socket::config::{Address, PacketSocketOptions, ProxyInfo};
//! use rustp2p_socket::{BasicPacketSocketFactory, PacketSocketFactory};
//!
//! # fn main() -> rustp2p_socket::error::Result<()> {
//! let factory = BasicPacketSocketFactory::new();
//! let local = Address::new("0.0.0.0:0".parse().unwrap());
//! let remote = Address::with_hostname("turn.example.org", "198.51.100.7:443".parse().unwrap());
//! let proxy = ProxyInfo::from_parts("socks5", "127.0.0.1", 1080, "", "")?;
//! let socket = factory.create_client_tcp_socket_with_opts(
//!     &local,
//!     &remote,
//!     &proxy,
//!     "my-agent/1.0",
//!     PacketSocketOptions::TLS | PacketSocketOptions::STUN,
//! )?;
//! # drop(socket);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod factory;
pub mod framing;
pub mod layer;
pub mod pipeline;
pub mod proxy;
pub mod resolver;
pub mod tls;

#[cfg(test)]
mod test_util;

pub use factory::{BasicPacketSocketFactory, PacketSocketFactory};
pub use framing::PacketSocket;
pub use rust_p2p_socket_core as socket_core;
