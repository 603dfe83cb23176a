use crate::socket::{LocalInterface, SocketInterfaceExt};
use std::io;

#[cfg(any(target_os = "linux", target_os = "android"))]
impl SocketInterfaceExt for socket2::Socket {
    fn set_ip_unicast_if(&self, interface: &LocalInterface) -> io::Result<()> {
        if let Some(name) = interface.name.as_ref() {
            self.bind_device(Some(name.as_bytes()))?;
        }
        Ok(())
    }
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
impl SocketInterfaceExt for socket2::Socket {
    fn set_ip_unicast_if(&self, interface: &LocalInterface) -> io::Result<()> {
        self.bind_device_by_index_v4(std::num::NonZeroU32::new(interface.index))?;
        Ok(())
    }
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios"
)))]
impl SocketInterfaceExt for socket2::Socket {}
