use std::io;
use std::net::Ipv4Addr;
use std::os::windows::io::AsRawSocket;

use windows_sys::core::PCSTR;
use windows_sys::Win32::NetworkManagement::IpHelper::GetBestInterfaceEx;
use windows_sys::Win32::Networking::WinSock::{
    htonl, setsockopt, WSAIoctl, AF_INET, IPPROTO_IP, IP_UNICAST_IF, SIO_UDP_CONNRESET, SOCKADDR,
    SOCKADDR_IN, SOCKET_ERROR,
};

use crate::socket::{LocalInterface, SocketInterfaceExt};

impl SocketInterfaceExt for socket2::Socket {
    fn set_ip_unicast_if(&self, interface: &LocalInterface) -> io::Result<()> {
        log::debug!("set_ip_unicast_if ={interface:?}");
        let index = interface.index;
        let raw_socket = self.as_raw_socket();
        let result = unsafe {
            let best_interface = htonl(index);
            setsockopt(
                raw_socket as usize,
                IPPROTO_IP,
                IP_UNICAST_IF,
                &best_interface as *const _ as PCSTR,
                std::mem::size_of_val(&best_interface) as i32,
            )
        };
        if result == SOCKET_ERROR {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

/// Interface Windows routes traffic for `dest_ip` through.
pub fn get_best_interface(dest_ip: Ipv4Addr) -> anyhow::Result<LocalInterface> {
    // SAFETY: all-zero is a valid SOCKADDR_IN
    let mut dest: SOCKADDR_IN = unsafe { std::mem::zeroed() };
    dest.sin_family = AF_INET;
    dest.sin_addr.S_un.S_addr = u32::from_ne_bytes(dest_ip.octets());
    let mut index = 0u32;
    let code = unsafe { GetBestInterfaceEx(&dest as *const _ as *mut SOCKADDR, &mut index) };
    if code != 0 {
        let e = io::Error::from_raw_os_error(code as i32);
        return Err(anyhow::anyhow!("no route to {dest_ip}: {e}"));
    }
    Ok(LocalInterface { index })
}

pub(crate) fn ignore_conn_reset(socket: &socket2::Socket) -> io::Result<()> {
    let socket_raw = socket.as_raw_socket() as usize;
    let mut bytes_returned: u32 = 0;
    let mut flag: u32 = 0;

    // SIO_UDP_CONNRESET off: ICMP port unreachable must not fail later reads
    let result = unsafe {
        WSAIoctl(
            socket_raw,
            SIO_UDP_CONNRESET,
            &mut flag as *mut _ as *mut _,
            std::mem::size_of_val(&flag) as u32,
            std::ptr::null_mut(),
            0,
            &mut bytes_returned as *mut _,
            std::ptr::null_mut(),
            None,
        )
    };

    if result == SOCKET_ERROR {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
