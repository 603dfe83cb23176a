use rust_p2p_socket_core::socket::{Address, AddressFamily};
use std::io;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::thread;
use std::time::Duration;

/// Resolves the hostname of an [`Address`] without blocking the caller.
pub trait AsyncResolver: Send {
    fn start(&mut self, address: &Address);
    /// Polls for the result.
    fn is_done(&mut self) -> bool;
    /// Blocks up to `timeout` for the result, returns whether it arrived.
    fn wait(&mut self, timeout: Duration) -> bool;
    /// First resolved address of `family`, with the original hostname and port.
    fn resolved_address(&self, family: AddressFamily) -> Option<Address>;
    fn error(&self) -> Option<&io::Error>;
}

/// Runs the system resolver on a worker thread.
#[derive(Default)]
pub struct BasicResolver {
    address: Option<Address>,
    pending: Option<flume::Receiver<io::Result<Vec<IpAddr>>>>,
    resolved: Vec<IpAddr>,
    error: Option<io::Error>,
}

impl BasicResolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn finish(&mut self, result: io::Result<Vec<IpAddr>>) {
        self.pending = None;
        match result {
            Ok(ips) if ips.is_empty() => {
                self.error = Some(io::Error::new(
                    io::ErrorKind::NotFound,
                    "host has no addresses",
                ))
            }
            Ok(ips) => self.resolved = ips,
            Err(e) => {
                log::debug!("resolve {:?} failed: {:?}", self.address, e);
                self.error = Some(e)
            }
        }
    }
}

fn lookup(host: &str) -> io::Result<Vec<IpAddr>> {
    Ok((host, 0)
        .to_socket_addrs()?
        .map(|addr| addr.ip())
        .collect())
}

fn worker_exited() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "resolver thread exited")
}

impl AsyncResolver for BasicResolver {
    fn start(&mut self, address: &Address) {
        self.address = Some(address.clone());
        self.resolved.clear();
        self.error = None;
        self.pending = None;
        let host = match address.hostname() {
            Some(host) if host.parse::<IpAddr>().is_err() => host.to_string(),
            Some(host) => {
                // hostname is an IP literal
                self.resolved = host.parse::<IpAddr>().into_iter().collect();
                return;
            }
            None => {
                self.resolved = vec![address.ip()];
                return;
            }
        };
        let (sender, receiver) = flume::bounded(1);
        let spawned = thread::Builder::new()
            .name("resolver".into())
            .spawn(move || {
                let _ = sender.send(lookup(&host));
            });
        match spawned {
            Ok(_) => self.pending = Some(receiver),
            Err(e) => self.finish(Err(e)),
        }
    }
    fn is_done(&mut self) -> bool {
        let Some(receiver) = self.pending.as_ref() else {
            return true;
        };
        match receiver.try_recv() {
            Ok(result) => self.finish(result),
            Err(flume::TryRecvError::Empty) => return false,
            Err(flume::TryRecvError::Disconnected) => self.finish(Err(worker_exited())),
        }
        true
    }
    fn wait(&mut self, timeout: Duration) -> bool {
        let Some(receiver) = self.pending.as_ref() else {
            return true;
        };
        match receiver.recv_timeout(timeout) {
            Ok(result) => self.finish(result),
            Err(flume::RecvTimeoutError::Timeout) => return false,
            Err(flume::RecvTimeoutError::Disconnected) => self.finish(Err(worker_exited())),
        }
        true
    }
    fn resolved_address(&self, family: AddressFamily) -> Option<Address> {
        let address = self.address.as_ref()?;
        let ip = self
            .resolved
            .iter()
            .find(|ip| ip.is_ipv4() == family.is_ipv4())?;
        let addr = SocketAddr::new(*ip, address.port());
        Some(match address.hostname() {
            Some(host) => Address::with_hostname(host, addr),
            None => Address::new(addr),
        })
    }
    fn error(&self) -> Option<&io::Error> {
        self.error.as_ref()
    }
}
