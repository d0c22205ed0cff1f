//! Tunneled replacement of the signaling engine's transport primitives.
//!
//! [`TunnelTransport`] is installed into the signaling engine while the
//! tunnel is ready. Every access to the tunneled signaling socket goes
//! through [`SocketSlot`], whose lock is also held while the socket is closed
//! or replaced, so an in-flight send or receive never sees a half torn down
//! stream.

use crate::engine::{FdSet, FdSets, SocketId, Transport};
use crate::relay::{RelayClient, TunnelSocket};
use parking_lot::Mutex;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

mod rtp;

pub use rtp::{TunnelRtpFactory, TunnelRtpTransport};

/// Swappable handle to the tunneled signaling socket. At most one socket is
/// installed; the previous one is always closed before another is opened.
#[derive(Clone, Default)]
pub struct SocketSlot {
    socket: Arc<Mutex<Option<Box<dyn TunnelSocket>>>>,
}

impl SocketSlot {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn is_installed(&self) -> bool {
        self.socket.lock().is_some()
    }
    pub(crate) fn open(&self, relay: &dyn RelayClient, port: u16) -> bool {
        let mut guard = self.socket.lock();
        if let Some(old) = guard.take() {
            relay.close_stream(old);
        }
        *guard = relay.open_stream(port);
        guard.is_some()
    }
    pub(crate) fn close(&self, relay: &dyn RelayClient) {
        if let Some(old) = self.socket.lock().take() {
            relay.close_stream(old);
        }
    }
    fn with<R>(&self, f: impl FnOnce(Option<&dyn TunnelSocket>) -> R) -> R {
        let guard = self.socket.lock();
        f(guard.as_deref())
    }
    fn has_pending_data(&self) -> bool {
        self.with(|socket| socket.is_some_and(|s| s.has_pending_data()))
    }
}

pub struct TunnelTransport {
    slot: SocketSlot,
    native: Arc<dyn Transport>,
    native_socket: SocketId,
    control_socket: SocketId,
    poll_interval: Duration,
}

impl TunnelTransport {
    pub fn new(
        slot: SocketSlot,
        native: Arc<dyn Transport>,
        native_socket: SocketId,
        control_socket: SocketId,
        poll_interval: Duration,
    ) -> Self {
        Self {
            slot,
            native,
            native_socket,
            control_socket,
            poll_interval,
        }
    }

    /// The engine's inbound datagram wait: wake up as soon as the tunnel has
    /// data, or when the caller's timeout runs out, while still letting
    /// control-plane wakeups through.
    fn wait_inbound(&self, timeout: Duration, sets: &mut FdSets) -> io::Result<usize> {
        let begin = Instant::now();
        loop {
            if self.slot.has_pending_data() {
                // the engine believes its socket is readable and calls recv_from next
                sets.read = Some(FdSet::from([self.native_socket]));
                sets.clear_write_except();
                return Ok(1);
            }
            let elapsed = begin.elapsed();
            if elapsed >= timeout {
                sets.read = Some(FdSet::from([self.native_socket, self.control_socket]));
                sets.clear_write_except();
                return Ok(0);
            }
            let slice = self.poll_interval.min(timeout - elapsed);
            let mut control = FdSets::read(FdSet::from([self.control_socket]));
            match self.native.wait_ready(Some(slice), &mut control) {
                Ok(0) => {}
                Ok(n) => {
                    sets.read = control.read;
                    sets.clear_write_except();
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    log::debug!("control wait {e:?}");
                    std::thread::sleep(slice);
                }
            }
        }
    }
}

impl Transport for TunnelTransport {
    fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<usize> {
        self.slot.with(|socket| {
            let Some(socket) = socket else {
                // between two tunnel states; the engine retransmits
                return Ok(buf.len());
            };
            match socket.send_to(buf, dest) {
                Ok(len) => Ok(len),
                Err(e) => {
                    log::debug!("tunnel send_to {dest} {e:?}");
                    Ok(buf.len())
                }
            }
        })
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, Option<SocketAddr>)> {
        self.slot.with(|socket| {
            let Some(socket) = socket else {
                return Ok((0, None));
            };
            match socket.recv_from(buf) {
                Ok(Some((len, src))) => Ok((len, Some(src))),
                Ok(None) => Ok((0, None)),
                Err(e) => {
                    log::debug!("tunnel recv_from {e:?}");
                    Ok((0, None))
                }
            }
        })
    }

    fn wait_ready(&self, timeout: Option<Duration>, sets: &mut FdSets) -> io::Result<usize> {
        match timeout {
            Some(timeout) if !timeout.is_zero() && sets.read.is_some() => {
                self.wait_inbound(timeout, sets)
            }
            _ => self.native.wait_ready(timeout, sets),
        }
    }
}
