//! Scripted stand-ins for the engines, the relay and the probes.

use crate::engine::{
    FdSets, FirewallPolicy, MediaEngine, RtpTransportFactory, SignalingEngine, SocketId,
    Transport, TransportConfig,
};
use crate::relay::{ConnectivityCallback, RelayClient, RelayFactory, TunnelSocket};
use parking_lot::Mutex;
use sip_tunnel_core::probe::{MirrorProbe, ProbeCallback, ProbeFactory, ProbeState};
use sip_tunnel_core::server::ServerAddr;
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const NATIVE_SOCKET: SocketId = 3;
pub const CONTROL_SOCKET: SocketId = 4;

#[derive(Default)]
pub struct SocketState {
    port: u16,
    sent: Mutex<Vec<(Vec<u8>, SocketAddr)>>,
    inbox: Mutex<VecDeque<(Vec<u8>, SocketAddr)>>,
    fail: AtomicBool,
}

impl SocketState {
    pub fn port(&self) -> u16 {
        self.port
    }
    pub fn sent(&self) -> Vec<(Vec<u8>, SocketAddr)> {
        self.sent.lock().clone()
    }
    pub fn deliver(&self, buf: &[u8], from: SocketAddr) {
        self.inbox.lock().push_back((buf.to_vec(), from));
    }
    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

pub struct MockSocket(Arc<SocketState>);

impl TunnelSocket for MockSocket {
    fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<usize> {
        if self.0.fail.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "relay gone"));
        }
        self.0.sent.lock().push((buf.to_vec(), dest));
        Ok(buf.len())
    }
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        if self.0.fail.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "relay gone"));
        }
        Ok(self.0.inbox.lock().pop_front().map(|(data, from)| {
            let len = data.len().min(buf.len());
            buf[..len].copy_from_slice(&data[..len]);
            (len, from)
        }))
    }
    fn has_pending_data(&self) -> bool {
        !self.0.inbox.lock().is_empty()
    }
}

#[derive(Default)]
pub struct MockRelay {
    servers: Mutex<Vec<ServerAddr>>,
    proxy: Mutex<Option<(String, u16, Option<String>, Option<String>)>>,
    callback: Mutex<Option<ConnectivityCallback>>,
    streams: Mutex<Vec<Arc<SocketState>>>,
    closed: AtomicUsize,
    started: AtomicBool,
    ready: AtomicBool,
    destroyed: AtomicBool,
    reconnects: AtomicUsize,
    refuse_streams: AtomicBool,
}

impl MockRelay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
    pub fn servers(&self) -> Vec<ServerAddr> {
        self.servers.lock().clone()
    }
    pub fn proxy(&self) -> Option<(String, u16, Option<String>, Option<String>)> {
        self.proxy.lock().clone()
    }
    pub fn stream(&self, index: usize) -> Arc<SocketState> {
        self.streams.lock()[index].clone()
    }
    pub fn opened(&self) -> usize {
        self.streams.lock().len()
    }
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
    pub fn destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
    pub fn reconnects(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }
    pub fn refuse_streams(&self, refuse: bool) {
        self.refuse_streams.store(refuse, Ordering::SeqCst);
    }
    /// Report connectivity the way the relay's own thread would.
    pub fn fire(&self, connected: bool) {
        self.ready.store(connected, Ordering::SeqCst);
        if let Some(callback) = self.callback.lock().as_ref() {
            callback(connected);
        }
    }
}

impl RelayClient for MockRelay {
    fn add_server(&self, addr: &ServerAddr) {
        self.servers.lock().push(addr.clone());
    }
    fn remove_all_servers(&self) {
        self.servers.lock().clear();
    }
    fn set_http_proxy(
        &self,
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
    ) {
        *self.proxy.lock() = Some((
            host.to_string(),
            port,
            username.map(str::to_string),
            password.map(str::to_string),
        ));
    }
    fn set_http_proxy_auth(&self, username: Option<&str>, password: Option<&str>) {
        let mut guard = self.proxy.lock();
        let entry = guard.get_or_insert_with(|| (String::new(), 0, None, None));
        entry.2 = username.map(str::to_string);
        entry.3 = password.map(str::to_string);
    }
    fn set_connectivity_callback(&self, callback: ConnectivityCallback) {
        *self.callback.lock() = Some(callback);
    }
    fn start(&self) {
        self.started.store(true, Ordering::SeqCst);
    }
    fn reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
    }
    fn destroy(&self) {
        self.started.store(false, Ordering::SeqCst);
        self.ready.store(false, Ordering::SeqCst);
        self.destroyed.store(true, Ordering::SeqCst);
    }
    fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
    fn open_stream(&self, port: u16) -> Option<Box<dyn TunnelSocket>> {
        if self.refuse_streams.load(Ordering::SeqCst) {
            return None;
        }
        let state = Arc::new(SocketState {
            port,
            ..Default::default()
        });
        self.streams.lock().push(state.clone());
        Some(Box::new(MockSocket(state)))
    }
    fn close_stream(&self, socket: Box<dyn TunnelSocket>) {
        drop(socket);
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MockRelayFactory {
    created: Mutex<Vec<Arc<MockRelay>>>,
    fail: AtomicBool,
}

impl MockRelayFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
    pub fn created(&self) -> usize {
        self.created.lock().len()
    }
    pub fn relay(&self, index: usize) -> Arc<MockRelay> {
        self.created.lock()[index].clone()
    }
    pub fn last(&self) -> Arc<MockRelay> {
        self.created.lock().last().cloned().expect("no relay created")
    }
    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl RelayFactory for MockRelayFactory {
    fn create(&self) -> io::Result<Arc<dyn RelayClient>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "no tunnel support"));
        }
        let relay = MockRelay::new();
        self.created.lock().push(relay.clone());
        Ok(relay)
    }
}

/// Real readiness wait of the engine: sleeps for the timeout unless told to
/// report the control descriptor ready.
#[derive(Default)]
pub struct MockNative {
    waits: AtomicUsize,
    control_ready_at: Mutex<Option<usize>>,
    timeouts: Mutex<Vec<Option<Duration>>>,
    read_sets: Mutex<Vec<Vec<SocketId>>>,
}

impl MockNative {
    pub fn waits(&self) -> usize {
        self.waits.load(Ordering::SeqCst)
    }
    /// The wait after `n` idle ones reports the control descriptor.
    pub fn control_ready_after(&self, n: usize) {
        *self.control_ready_at.lock() = Some(n);
    }
    pub fn timeouts(&self) -> Vec<Option<Duration>> {
        self.timeouts.lock().clone()
    }
    pub fn waited_on_control_only(&self, control: SocketId) -> bool {
        self.read_sets.lock().iter().all(|set| set == &vec![control])
    }
}

impl Transport for MockNative {
    fn send_to(&self, buf: &[u8], _dest: SocketAddr) -> io::Result<usize> {
        Ok(buf.len())
    }
    fn recv_from(&self, _buf: &mut [u8]) -> io::Result<(usize, Option<SocketAddr>)> {
        Ok((0, None))
    }
    fn wait_ready(&self, timeout: Option<Duration>, sets: &mut FdSets) -> io::Result<usize> {
        let call = self.waits.fetch_add(1, Ordering::SeqCst);
        self.timeouts.lock().push(timeout);
        self.read_sets.lock().push(
            sets.read
                .as_ref()
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default(),
        );
        if *self.control_ready_at.lock() == Some(call) {
            return Ok(sets.read.as_ref().map_or(0, |set| set.len()));
        }
        if let Some(timeout) = timeout {
            std::thread::sleep(timeout);
        }
        if let Some(read) = sets.read.as_mut() {
            read.clear();
        }
        Ok(0)
    }
}

/// Registration completes on the first iteration after it is requested,
/// unless `stuck` is set.
pub struct MockEngine {
    policy: Mutex<FirewallPolicy>,
    transport: Mutex<TransportConfig>,
    registered: AtomicBool,
    unregistering: AtomicBool,
    stuck: AtomicBool,
    pauses: AtomicUsize,
    resumes: AtomicUsize,
    iterations: AtomicUsize,
    hook: Mutex<Option<Arc<dyn Transport>>>,
    hook_installs: AtomicUsize,
    native: Arc<MockNative>,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            policy: Mutex::new(FirewallPolicy::Ice),
            transport: Mutex::new(TransportConfig {
                udp_port: 5060,
                tcp_port: 5060,
                tls_port: 5061,
                dtls_port: 0,
            }),
            registered: AtomicBool::new(false),
            unregistering: AtomicBool::new(false),
            stuck: AtomicBool::new(false),
            pauses: AtomicUsize::new(0),
            resumes: AtomicUsize::new(0),
            iterations: AtomicUsize::new(0),
            hook: Mutex::new(None),
            hook_installs: AtomicUsize::new(0),
            native: Arc::new(MockNative::default()),
        })
    }
    pub fn set_registered(&self, registered: bool) {
        self.registered.store(registered, Ordering::SeqCst);
    }
    pub fn set_stuck(&self, stuck: bool) {
        self.stuck.store(stuck, Ordering::SeqCst);
    }
    pub fn pauses(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }
    pub fn resumes(&self) -> usize {
        self.resumes.load(Ordering::SeqCst)
    }
    pub fn iterations(&self) -> usize {
        self.iterations.load(Ordering::SeqCst)
    }
    pub fn hook(&self) -> Option<Arc<dyn Transport>> {
        self.hook.lock().clone()
    }
    pub fn hook_installs(&self) -> usize {
        self.hook_installs.load(Ordering::SeqCst)
    }
}

impl SignalingEngine for MockEngine {
    fn firewall_policy(&self) -> FirewallPolicy {
        *self.policy.lock()
    }
    fn set_firewall_policy(&self, policy: FirewallPolicy) {
        *self.policy.lock() = policy;
    }
    fn transport_config(&self) -> TransportConfig {
        *self.transport.lock()
    }
    fn set_transport_config(&self, config: TransportConfig) {
        *self.transport.lock() = config;
    }
    fn pause_registration(&self) {
        self.pauses.fetch_add(1, Ordering::SeqCst);
        self.unregistering.store(true, Ordering::SeqCst);
    }
    fn resume_registration(&self) {
        self.resumes.fetch_add(1, Ordering::SeqCst);
        self.unregistering.store(false, Ordering::SeqCst);
        self.registered.store(true, Ordering::SeqCst);
    }
    fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }
    fn is_deregistered(&self) -> bool {
        !self.registered.load(Ordering::SeqCst)
    }
    fn drive_iteration(&self) {
        self.iterations.fetch_add(1, Ordering::SeqCst);
        if self.unregistering.load(Ordering::SeqCst) && !self.stuck.load(Ordering::SeqCst) {
            self.unregistering.store(false, Ordering::SeqCst);
            self.registered.store(false, Ordering::SeqCst);
        }
    }
    fn native_transport(&self) -> Arc<dyn Transport> {
        self.native.clone()
    }
    fn native_socket(&self) -> SocketId {
        NATIVE_SOCKET
    }
    fn control_socket(&self) -> SocketId {
        CONTROL_SOCKET
    }
    fn install_transport_hook(&self, hook: Option<Arc<dyn Transport>>) {
        if hook.is_some() {
            self.hook_installs.fetch_add(1, Ordering::SeqCst);
        }
        *self.hook.lock() = hook;
    }
}

#[derive(Default)]
pub struct MockMedia {
    factory: Mutex<Option<Arc<dyn RtpTransportFactory>>>,
    installs: AtomicUsize,
}

impl MockMedia {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
    pub fn factory(&self) -> Option<Arc<dyn RtpTransportFactory>> {
        self.factory.lock().clone()
    }
    pub fn installs(&self) -> usize {
        self.installs.load(Ordering::SeqCst)
    }
}

impl MediaEngine for MockMedia {
    fn install_rtp_transport_factory(&self, factory: Option<Arc<dyn RtpTransportFactory>>) {
        if factory.is_some() {
            self.installs.fetch_add(1, Ordering::SeqCst);
        }
        *self.factory.lock() = factory;
    }
}

pub struct ProbeRecord {
    pub server: ServerAddr,
    callback: Mutex<Option<ProbeCallback>>,
    stopped: AtomicBool,
}

impl ProbeRecord {
    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

struct MockProbe(Arc<ProbeRecord>);

impl MirrorProbe for MockProbe {
    fn start(&mut self, on_done: ProbeCallback) {
        *self.0.callback.lock() = Some(on_done);
    }
    fn stop(&mut self) {
        self.0.stopped.store(true, Ordering::SeqCst);
        self.0.callback.lock().take();
    }
    fn state(&self) -> ProbeState {
        if self.0.callback.lock().is_some() {
            ProbeState::Probing
        } else {
            ProbeState::Done
        }
    }
}

/// Probes never finish on their own; tests complete them with [`MockProbeFactory::complete`].
#[derive(Default)]
pub struct MockProbeFactory {
    probes: Mutex<Vec<Arc<ProbeRecord>>>,
}

impl MockProbeFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
    pub fn started(&self) -> usize {
        self.probes.lock().len()
    }
    pub fn probe(&self, index: usize) -> Arc<ProbeRecord> {
        self.probes.lock()[index].clone()
    }
    /// Fire the callback of the `index`-th probe created, from another thread.
    pub fn complete(&self, index: usize, udp_reachable: bool) {
        let callback = self.probe(index).callback.lock().take();
        if let Some(callback) = callback {
            std::thread::spawn(move || callback(udp_reachable))
                .join()
                .expect("probe callback panicked");
        }
    }
}

impl ProbeFactory for MockProbeFactory {
    fn create(&self, server: &ServerAddr) -> Option<Box<dyn MirrorProbe>> {
        let record = Arc::new(ProbeRecord {
            server: server.clone(),
            callback: Mutex::new(None),
            stopped: AtomicBool::new(false),
        });
        self.probes.lock().push(record.clone());
        Some(Box::new(MockProbe(record)))
    }
}
