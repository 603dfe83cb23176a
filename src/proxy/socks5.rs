use bytes::{Buf, BufMut, BytesMut};
use rust_p2p_socket_core::socket::Address;
use std::io;
use std::net::IpAddr;

use super::ProxyHandshake;

const SOCKS5_VERSION: u8 = 0x05;
const AUTH_NONE: u8 = 0x00;
const AUTH_PASSWORD: u8 = 0x02;
const AUTH_PASSWORD_VERSION: u8 = 0x01;
const CMD_CONNECT: u8 = 0x01;

const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

const REP_SUCCESS: u8 = 0x00;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Step {
    Greeting,
    Auth,
    Connect,
    Done,
}

/// RFC 1928 CONNECT with optional RFC 1929 username/password authentication.
pub struct Socks5Handshake {
    username: String,
    password: String,
    target: Option<Address>,
    step: Step,
}

impl Socks5Handshake {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            target: None,
            step: Step::Greeting,
        }
    }

    fn connect_request(&self, out: &mut BytesMut) -> io::Result<()> {
        let target = self
            .target
            .as_ref()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        out.put_slice(&[SOCKS5_VERSION, CMD_CONNECT, 0x00]);
        match (target.hostname(), target.ip()) {
            (Some(hostname), _) if hostname.len() <= u8::MAX as usize => {
                out.put_u8(ATYP_DOMAIN);
                out.put_u8(hostname.len() as u8);
                out.put_slice(hostname.as_bytes());
            }
            (_, IpAddr::V4(ip)) => {
                out.put_u8(ATYP_IPV4);
                out.put_slice(&ip.octets());
            }
            (_, IpAddr::V6(ip)) => {
                out.put_u8(ATYP_IPV6);
                out.put_slice(&ip.octets());
            }
        }
        out.put_u16(target.port());
        Ok(())
    }

    fn auth_request(&self, out: &mut BytesMut) {
        out.put_u8(AUTH_PASSWORD_VERSION);
        out.put_u8(self.username.len() as u8);
        out.put_slice(self.username.as_bytes());
        out.put_u8(self.password.len() as u8);
        out.put_slice(self.password.as_bytes());
    }
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

impl ProxyHandshake for Socks5Handshake {
    fn start(&mut self, target: &Address, out: &mut BytesMut) -> io::Result<()> {
        if self.username.len() > u8::MAX as usize || self.password.len() > u8::MAX as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "socks5 credentials longer than 255 bytes",
            ));
        }
        self.target = Some(target.clone());
        self.step = Step::Greeting;
        if self.username.is_empty() {
            out.put_slice(&[SOCKS5_VERSION, 1, AUTH_NONE]);
        } else {
            out.put_slice(&[SOCKS5_VERSION, 2, AUTH_NONE, AUTH_PASSWORD]);
        }
        Ok(())
    }

    fn advance(&mut self, input: &mut BytesMut, out: &mut BytesMut) -> io::Result<bool> {
        loop {
            match self.step {
                Step::Greeting => {
                    if input.len() < 2 {
                        return Ok(false);
                    }
                    let reply = input.split_to(2);
                    if reply[0] != SOCKS5_VERSION {
                        return Err(invalid("not a socks5 proxy"));
                    }
                    match reply[1] {
                        AUTH_NONE => {
                            self.connect_request(out)?;
                            self.step = Step::Connect;
                        }
                        AUTH_PASSWORD if !self.username.is_empty() => {
                            self.auth_request(out);
                            self.step = Step::Auth;
                        }
                        _ => {
                            return Err(io::Error::new(
                                io::ErrorKind::PermissionDenied,
                                "socks5 proxy accepts none of the offered auth methods",
                            ))
                        }
                    }
                }
                Step::Auth => {
                    if input.len() < 2 {
                        return Ok(false);
                    }
                    let reply = input.split_to(2);
                    if reply[1] != 0x00 {
                        return Err(io::Error::new(
                            io::ErrorKind::PermissionDenied,
                            "socks5 authentication failed",
                        ));
                    }
                    self.connect_request(out)?;
                    self.step = Step::Connect;
                }
                Step::Connect => {
                    if input.len() < 5 {
                        return Ok(false);
                    }
                    if input[0] != SOCKS5_VERSION {
                        return Err(invalid("not a socks5 reply"));
                    }
                    if input[1] != REP_SUCCESS {
                        return Err(io::Error::new(
                            io::ErrorKind::ConnectionRefused,
                            format!("socks5 connect failed, reply {}", input[1]),
                        ));
                    }
                    let len = match input[3] {
                        ATYP_IPV4 => 4 + 4 + 2,
                        ATYP_IPV6 => 4 + 16 + 2,
                        ATYP_DOMAIN => 4 + 1 + input[4] as usize + 2,
                        _ => return Err(invalid("unknown socks5 address type")),
                    };
                    if input.len() < len {
                        return Ok(false);
                    }
                    input.advance(len);
                    self.step = Step::Done;
                }
                Step::Done => return Ok(true),
            }
        }
    }
}
