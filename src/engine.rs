//! What the tunnel subsystem needs from the signaling and media engines.
//!
//! The signaling engine keeps its own call and registration state machine;
//! the coordinator only snapshots and overrides its transport settings,
//! pauses and resumes registration, and swaps the [`Transport`] it sends and
//! receives through.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// OS level socket handle as seen by a readiness wait.
pub type SocketId = u64;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FdSet {
    fds: Vec<SocketId>,
}

impl FdSet {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn insert(&mut self, fd: SocketId) {
        if !self.fds.contains(&fd) {
            self.fds.push(fd);
        }
    }
    pub fn remove(&mut self, fd: SocketId) {
        self.fds.retain(|v| *v != fd);
    }
    pub fn contains(&self, fd: SocketId) -> bool {
        self.fds.contains(&fd)
    }
    pub fn clear(&mut self) {
        self.fds.clear();
    }
    pub fn len(&self) -> usize {
        self.fds.len()
    }
    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = &SocketId> {
        self.fds.iter()
    }
}

impl<const N: usize> From<[SocketId; N]> for FdSet {
    fn from(fds: [SocketId; N]) -> Self {
        let mut set = FdSet::new();
        for fd in fds {
            set.insert(fd);
        }
        set
    }
}

/// Interest and result sets of one readiness wait. On return each set only
/// holds the descriptors that are ready.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FdSets {
    pub read: Option<FdSet>,
    pub write: Option<FdSet>,
    pub except: Option<FdSet>,
}

impl FdSets {
    pub fn read(fds: FdSet) -> Self {
        Self {
            read: Some(fds),
            write: None,
            except: None,
        }
    }
    pub(crate) fn clear_write_except(&mut self) {
        if let Some(write) = self.write.as_mut() {
            write.clear();
        }
        if let Some(except) = self.except.as_mut() {
            except.clear();
        }
    }
}

/// Low level datagram primitives the signaling engine performs its I/O with.
pub trait Transport: Send + Sync {
    fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<usize>;
    /// `Ok((0, None))` means nothing was available.
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, Option<SocketAddr>)>;
    /// `timeout == None` waits forever; returns the number of ready descriptors.
    fn wait_ready(&self, timeout: Option<Duration>, sets: &mut FdSets) -> io::Result<usize>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FirewallPolicy {
    #[default]
    NoFirewall,
    NatAddress,
    Stun,
    Ice,
    Upnp,
}

/// Local ports the signaling engine listens on; `0` disables a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransportConfig {
    pub udp_port: u16,
    pub tcp_port: u16,
    pub tls_port: u16,
    pub dtls_port: u16,
}

impl TransportConfig {
    pub fn udp_only(udp_port: u16) -> Self {
        Self {
            udp_port,
            ..Default::default()
        }
    }
}

pub trait SignalingEngine: Send + Sync {
    fn firewall_policy(&self) -> FirewallPolicy;
    fn set_firewall_policy(&self, policy: FirewallPolicy);
    fn transport_config(&self) -> TransportConfig;
    fn set_transport_config(&self, config: TransportConfig);
    /// Start de-registering the default account; completes over later iterations.
    fn pause_registration(&self);
    /// Register the default account again with the current transport settings.
    fn resume_registration(&self);
    fn is_registered(&self) -> bool;
    fn is_deregistered(&self) -> bool;
    /// Run one iteration of the engine's own event loop.
    fn drive_iteration(&self);
    /// The unhooked transport, used for pass-through waits.
    fn native_transport(&self) -> Arc<dyn Transport>;
    /// Descriptor the engine reads inbound signaling from.
    fn native_socket(&self) -> SocketId;
    /// Descriptor used to wake the engine's loop for control-plane work.
    fn control_socket(&self) -> SocketId;
    /// `None` restores the native transport.
    fn install_transport_hook(&self, hook: Option<Arc<dyn Transport>>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaStream {
    AudioRtp,
    AudioRtcp,
    VideoRtp,
    VideoRtcp,
}

/// Datagram transport of one media stream.
pub trait RtpTransport: Send {
    fn send_to(&mut self, buf: &[u8], dest: SocketAddr) -> usize;
    /// `(0, None)` means nothing was available.
    fn recv_from(&mut self, buf: &mut [u8]) -> (usize, Option<SocketAddr>);
    fn close(&mut self);
}

pub trait RtpTransportFactory: Send + Sync {
    fn create(&self, stream: MediaStream, port: u16) -> Option<Box<dyn RtpTransport>>;
}

pub trait MediaEngine: Send + Sync {
    /// `None` restores the media engine's own sockets.
    fn install_rtp_transport_factory(&self, factory: Option<Arc<dyn RtpTransportFactory>>);
}
