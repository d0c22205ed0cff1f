use crate::engine::{MediaStream, RtpTransport, RtpTransportFactory};
use crate::relay::{RelayClient, TunnelSocket};
use std::net::SocketAddr;
use std::sync::Arc;

/// Hands the media engine one tunnel stream per RTP/RTCP socket it asks for.
pub struct TunnelRtpFactory {
    relay: Arc<dyn RelayClient>,
}

impl TunnelRtpFactory {
    pub fn new(relay: Arc<dyn RelayClient>) -> Self {
        Self { relay }
    }
}

impl RtpTransportFactory for TunnelRtpFactory {
    fn create(&self, stream: MediaStream, port: u16) -> Option<Box<dyn RtpTransport>> {
        match self.relay.open_stream(port) {
            Some(socket) => {
                log::debug!("{stream:?} tunneled on port {port}");
                Some(Box::new(TunnelRtpTransport {
                    socket: Some(socket),
                    relay: self.relay.clone(),
                }))
            }
            None => {
                log::warn!("relay refused {stream:?} stream on port {port}");
                None
            }
        }
    }
}

pub struct TunnelRtpTransport {
    socket: Option<Box<dyn TunnelSocket>>,
    relay: Arc<dyn RelayClient>,
}

impl RtpTransport for TunnelRtpTransport {
    fn send_to(&mut self, buf: &[u8], dest: SocketAddr) -> usize {
        let Some(socket) = self.socket.as_ref() else {
            return buf.len();
        };
        match socket.send_to(buf, dest) {
            Ok(len) => len,
            Err(e) => {
                log::debug!("rtp send_to {dest} {e:?}");
                buf.len()
            }
        }
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> (usize, Option<SocketAddr>) {
        let Some(socket) = self.socket.as_ref() else {
            return (0, None);
        };
        match socket.recv_from(buf) {
            Ok(Some((len, src))) => (len, Some(src)),
            Ok(None) => (0, None),
            Err(e) => {
                log::debug!("rtp recv_from {e:?}");
                (0, None)
            }
        }
    }

    fn close(&mut self) {
        if let Some(socket) = self.socket.take() {
            self.relay.close_stream(socket);
        }
    }
}

impl Drop for TunnelRtpTransport {
    fn drop(&mut self) {
        self.close();
    }
}
