//! UDP mirror probing.
//!
//! A mirror is a plain UDP echo service running next to a tunnel relay. If a
//! datagram sent to it comes back within the configured delay, direct UDP
//! works and tunneling is not needed. A timeout and a hard failure are
//! reported the same way: `udp_reachable == false`.

use crate::error::{Error, Result};
use crate::server::ServerAddr;
use anyhow::anyhow;
use async_shutdown::ShutdownManager;
use bytes::{BufMut, Bytes, BytesMut};
use crossbeam_utils::atomic::AtomicCell;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

/// Number of datagrams sent per probe, spread over the delay threshold.
const PROBE_ATTEMPTS: u32 = 3;
const MIN_RESEND_INTERVAL: Duration = Duration::from_millis(1);

/// Invoked exactly once when a probe run completes. Dropped without being
/// called if the run is stopped first.
pub type ProbeCallback = Box<dyn FnOnce(bool) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Idle,
    Probing,
    Done,
}

pub trait MirrorProbe: Send {
    fn start(&mut self, on_done: ProbeCallback);
    fn stop(&mut self);
    fn state(&self) -> ProbeState;
}

/// Builds one probe per auto-detection candidate.
pub trait ProbeFactory: Send + Sync {
    fn create(&self, server: &ServerAddr) -> Option<Box<dyn MirrorProbe>>;
}

pub struct ProbeClient {
    target: String,
    delay: Duration,
    state: Arc<AtomicCell<ProbeState>>,
    shutdown_manager: Option<ShutdownManager<()>>,
    handle: Handle,
}

impl ProbeClient {
    pub fn new(server: &ServerAddr, handle: Handle) -> Result<Self> {
        let (Some(target), Some(mirror)) = (server.mirror_target(), server.mirror()) else {
            return Err(Error::NoMirror(server.to_string()));
        };
        Ok(Self {
            target,
            delay: mirror.delay(),
            state: Arc::new(AtomicCell::new(ProbeState::Idle)),
            shutdown_manager: None,
            handle,
        })
    }
    pub fn target(&self) -> &str {
        &self.target
    }
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl MirrorProbe for ProbeClient {
    fn start(&mut self, on_done: ProbeCallback) {
        if self.state.load() == ProbeState::Probing {
            log::warn!("probe to {} restarted while running", self.target);
            self.stop();
        }
        let shutdown_manager = ShutdownManager::<()>::new();
        let fut = shutdown_manager.wrap_cancel(probe(self.target.clone(), self.delay));
        let state = self.state.clone();
        let target = self.target.clone();
        state.store(ProbeState::Probing);
        self.handle.spawn(async move {
            match fut.await {
                Ok(udp_reachable) => {
                    state.store(ProbeState::Done);
                    log::info!("mirror probe {target}: udp_reachable={udp_reachable}");
                    on_done(udp_reachable);
                }
                Err(_) => {
                    log::debug!("mirror probe {target} stopped");
                }
            }
        });
        self.shutdown_manager = Some(shutdown_manager);
    }

    fn stop(&mut self) {
        if let Some(shutdown_manager) = self.shutdown_manager.take() {
            _ = shutdown_manager.trigger_shutdown(());
        }
        _ = self
            .state
            .compare_exchange(ProbeState::Probing, ProbeState::Idle);
    }

    fn state(&self) -> ProbeState {
        self.state.load()
    }
}

impl Drop for ProbeClient {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn probe(target: String, delay: Duration) -> bool {
    within_delay(&target, delay, probe_impl(&target, delay)).await
}

/// The whole run, name resolution included, must finish within `delay`.
async fn within_delay<F>(target: &str, delay: Duration, run: F) -> bool
where
    F: Future<Output = anyhow::Result<()>>,
{
    match tokio::time::timeout(delay, run).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            log::debug!("mirror probe {target} failed: {e:?}");
            false
        }
        Err(_) => {
            log::debug!("mirror probe {target} no echo within {delay:?}");
            false
        }
    }
}

/// Resolves once the mirror echoed the nonce back.
async fn probe_impl(target: &str, delay: Duration) -> anyhow::Result<()> {
    let remote = tokio::net::lookup_host(target)
        .await?
        .next()
        .ok_or_else(|| anyhow!("no address for {target}"))?;
    let socket = crate::socket::bind_udp_for(&remote)?;
    let request = nonce_packet(rand::random());
    let resend_interval = (delay / PROBE_ATTEMPTS).max(MIN_RESEND_INTERVAL);

    let mut buf = [0u8; 64];
    let mut ticker = tokio::time::interval(resend_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = socket.send_to(&request, remote).await {
                    log::debug!("mirror probe send to {remote} {e:?}");
                }
            }
            rs = socket.recv_from(&mut buf) => {
                match rs {
                    Ok((len, _)) => {
                        if buf[..len] == request[..] {
                            return Ok(());
                        }
                    }
                    Err(e) => {
                        log::debug!("mirror probe recv from {remote} {e:?}");
                    }
                }
            }
        }
    }
}

fn nonce_packet(nonce: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(8);
    buf.put_u64(nonce);
    buf.freeze()
}

/// Creates [`ProbeClient`]s on a tokio runtime.
#[derive(Clone)]
pub struct UdpProbeFactory {
    handle: Handle,
}

impl UdpProbeFactory {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }
    /// Uses the runtime of the calling context. Panics outside a runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl ProbeFactory for UdpProbeFactory {
    fn create(&self, server: &ServerAddr) -> Option<Box<dyn MirrorProbe>> {
        match ProbeClient::new(server, self.handle.clone()) {
            Ok(client) => Some(Box::new(client)),
            Err(e) => {
                log::warn!("cannot probe {server}: {e}");
                None
            }
        }
    }
}
