//! # rust-p2p-socket-core - Raw sockets for peer-to-peer socket pipelines
//!
//! This crate provides the bottom layer that `rustp2p-socket` builds its
//! layered sockets on:
//!
//! - [`socket`] - The non-blocking [`socket::Socket`] trait, addresses and the
//!   socket2 based [`socket::SystemSocketProvider`]
//! - [`bind`] - Binding a socket, optionally scanning a local port range
//! - [`context`] - Thread-bound or explicit socket providers
//! - [`error`] - Error type shared by the above
//!
//! ## Binding within a port range
//!
//! ```rust,no_run
//! use rust_p2p_socket_core::bind::{bind_socket, PortRange};
//! use rust_p2p_socket_core::socket::{Address, SocketProvider, SocketType, SystemSocketProvider};
//!
//! # fn main() -> rust_p2p_socket_core::error::Result<()> {
//! let address = Address::new("0.0.0.0:0".parse().unwrap());
//! let provider = SystemSocketProvider::new();
//! let mut socket = provider.create_socket(address.family(), SocketType::Datagram)?;
//! let local_addr = bind_socket(socket.as_mut(), &address, PortRange::new(40000, 40100)?)?;
//! println!("bound to {local_addr}");
//! # Ok(())
//! # }
//! ```

pub mod bind;
pub mod context;
pub mod error;
pub mod socket;
