//! Contract of the relay connection (the tunnel client).
//!
//! The relay is a black box speaking its own wire protocol to the tunnel
//! servers. Its callbacks run on threads it owns.

use sip_tunnel_core::server::ServerAddr;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

/// One logical datagram stream carried over the relay.
pub trait TunnelSocket: Send + Sync {
    fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<usize>;
    /// `Ok(None)` means no datagram is pending.
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>>;
    fn has_pending_data(&self) -> bool;
}

pub type ConnectivityCallback = Box<dyn Fn(bool) + Send + Sync + 'static>;

pub trait RelayClient: Send + Sync {
    fn add_server(&self, addr: &ServerAddr);
    fn remove_all_servers(&self);
    fn set_http_proxy(
        &self,
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
    );
    fn set_http_proxy_auth(&self, username: Option<&str>, password: Option<&str>);
    fn set_connectivity_callback(&self, callback: ConnectivityCallback);
    fn start(&self);
    fn reconnect(&self);
    fn destroy(&self);
    fn is_started(&self) -> bool;
    fn is_ready(&self) -> bool;
    fn open_stream(&self, port: u16) -> Option<Box<dyn TunnelSocket>>;
    fn close_stream(&self, socket: Box<dyn TunnelSocket>);
}

pub trait RelayFactory: Send + Sync {
    fn create(&self) -> io::Result<Arc<dyn RelayClient>>;
}
