use std::io;

use thiserror::Error;

use crate::config::PacketSocketOptions;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] rust_p2p_socket_core::error::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("at most one TLS mode may be set, got {0:?}")]
    ConflictingTlsOptions(PacketSocketOptions),
    #[error("TLS is not supported on listening sockets")]
    TlsNotSupported,
    #[error(transparent)]
    Tls(#[from] rustls::Error),
    #[error("invalid server name: {0}")]
    InvalidServerName(String),
    #[error("unsupported elliptic curve: {0}")]
    UnsupportedCurve(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, Error>;
