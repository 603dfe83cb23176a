use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::{BufMut, BytesMut};
use rust_p2p_socket_core::socket::Address;
use std::io;

use super::ProxyHandshake;

const MAX_RESPONSE_HEADER: usize = 8 * 1024;

/// HTTP `CONNECT` tunnel, optionally with basic proxy authentication.
pub struct HttpsHandshake {
    user_agent: String,
    username: String,
    password: String,
}

impl HttpsHandshake {
    pub fn new(user_agent: &str, username: &str, password: &str) -> Self {
        Self {
            user_agent: user_agent.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

fn authority(target: &Address) -> String {
    match target.hostname() {
        Some(hostname) => format!("{}:{}", hostname, target.port()),
        None => target.socket_addr().to_string(),
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

impl ProxyHandshake for HttpsHandshake {
    fn start(&mut self, target: &Address, out: &mut BytesMut) -> io::Result<()> {
        let authority = authority(target);
        let mut request = format!(
            "CONNECT {authority} HTTP/1.0\r\n\
             User-Agent: {}\r\n\
             Host: {authority}\r\n\
             Content-Length: 0\r\n\
             Proxy-Connection: Keep-Alive\r\n",
            self.user_agent
        );
        if !self.username.is_empty() {
            let credentials = BASE64.encode(format!("{}:{}", self.username, self.password));
            request.push_str(&format!("Proxy-Authorization: Basic {credentials}\r\n"));
        }
        request.push_str("\r\n");
        out.put_slice(request.as_bytes());
        Ok(())
    }

    fn advance(&mut self, input: &mut BytesMut, _out: &mut BytesMut) -> io::Result<bool> {
        let Some(end) = find_header_end(input) else {
            if input.len() > MAX_RESPONSE_HEADER {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "proxy response header too large",
                ));
            }
            return Ok(false);
        };
        let header = input.split_to(end + 4);
        let header = String::from_utf8_lossy(&header);
        let status_line = header.lines().next().unwrap_or_default();
        let mut parts = status_line.split_whitespace();
        let version = parts.next().unwrap_or_default();
        let code = parts.next().and_then(|code| code.parse::<u16>().ok());
        if !version.starts_with("HTTP/") {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("not an http response: {status_line:?}"),
            ));
        }
        match code {
            Some(200..=299) => Ok(true),
            Some(407) => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "proxy authentication required",
            )),
            _ => Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("proxy refused the tunnel: {status_line:?}"),
            )),
        }
    }
}
