use std::io;
use std::net::{IpAddr, SocketAddr};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("io")]
    Io(#[from] io::Error),
    #[error("socket unavailable: {0}")]
    Unavailable(#[source] io::Error),
    #[error("bind {addr} failed: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("no port available for {ip} in range {min}-{max}")]
    PortRangeExhausted { ip: IpAddr, min: u16, max: u16 },
    #[error("invalid port range: {min}-{max}")]
    InvalidPortRange { min: u16, max: u16 },
    #[error("connect {addr} failed: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("socket factory called from a thread that does not own it")]
    WrongThread,
}

pub type Result<T, E = Error> = ::std::result::Result<T, E>;
