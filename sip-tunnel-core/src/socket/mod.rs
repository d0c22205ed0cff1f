use anyhow::Context;
use socket2::Protocol;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

/// Wildcard address of the same family as `remote`, on an ephemeral port.
pub fn unspecified_for(remote: &SocketAddr) -> SocketAddr {
    if remote.is_ipv4() {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
    } else {
        SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
    }
}

pub fn bind_udp(addr: SocketAddr) -> anyhow::Result<socket2::Socket> {
    let socket = if addr.is_ipv4() {
        socket2::Socket::new(
            socket2::Domain::IPV4,
            socket2::Type::DGRAM,
            Some(Protocol::UDP),
        )?
    } else {
        let socket = socket2::Socket::new(
            socket2::Domain::IPV6,
            socket2::Type::DGRAM,
            Some(Protocol::UDP),
        )?;
        socket
            .set_only_v6(true)
            .with_context(|| format!("set_only_v6 failed: {}", &addr))?;
        socket
    };
    socket.set_nonblocking(true)?;
    socket
        .bind(&addr.into())
        .with_context(|| format!("bind_udp {}", addr))?;
    Ok(socket)
}

/// Bind a tokio UDP socket able to reach `remote`. Must run inside a runtime.
pub fn bind_udp_for(remote: &SocketAddr) -> anyhow::Result<tokio::net::UdpSocket> {
    let socket = bind_udp(unspecified_for(remote))?;
    let std_socket: std::net::UdpSocket = socket.into();
    Ok(tokio::net::UdpSocket::from_std(std_socket)?)
}
