//! UDP socket setup
//!
//! Creates the one socket a client or proxy talks to nodes through.

use std::io;
use std::net::{SocketAddrV4, UdpSocket};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::config::Config;
use crate::error::Result;

/// Open and bind the protocol socket
///
/// Buffer sizing failures are tolerated; refusing broadcast or the
/// requested interface is not. If the well-known port is taken (another
/// instance on the same host) the socket falls back to an ephemeral port,
/// which nodes answer just as well.
pub fn open_socket(config: &Config) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

    if let Err(e) = socket.set_recv_buffer_size(config.socket_buffer_size) {
        tracing::warn!("Could not set receive buffer to {} bytes: {}", config.socket_buffer_size, e);
    }
    if let Err(e) = socket.set_send_buffer_size(config.socket_buffer_size) {
        tracing::warn!("Could not set send buffer to {} bytes: {}", config.socket_buffer_size, e);
    }

    socket.set_broadcast(true)?;

    if let Some(name) = config.interface.as_deref() {
        bind_interface(&socket, name)?;
    }

    match socket.bind(&SockAddr::from(config.bind_addr)) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
            tracing::warn!("{} already in use, binding an ephemeral port", config.bind_addr);
            let fallback = SocketAddrV4::new(*config.bind_addr.ip(), 0);
            socket.bind(&SockAddr::from(fallback))?;
        }
        Err(e) => return Err(e.into()),
    }

    let socket: UdpSocket = socket.into();
    tracing::debug!("Protocol socket bound to {:?}", socket.local_addr());
    Ok(socket)
}

#[cfg(any(target_os = "android", target_os = "fuchsia", target_os = "linux"))]
fn bind_interface(socket: &Socket, name: &str) -> Result<()> {
    socket.bind_device(Some(name.as_bytes()))?;
    Ok(())
}

#[cfg(not(any(target_os = "android", target_os = "fuchsia", target_os = "linux")))]
fn bind_interface(_socket: &Socket, name: &str) -> Result<()> {
    Err(crate::error::SanError::Config(format!(
        "binding to interface {} is not supported on this platform",
        name
    )))
}
