//! The tunnel state machine.
//!
//! [`TunnelCoordinator`] lives on the host's tick thread. Relay and probe
//! callbacks never touch it directly: they post an [`Event`] to its queue and
//! [`TunnelCoordinator::iterate`] applies the backlog on the next tick, in
//! arrival order.

use crate::config::{CoordinatorConfig, HttpProxy};
use crate::engine::{FirewallPolicy, MediaEngine, SignalingEngine, Transport, TransportConfig};
use crate::event::{Event, EventQueue, QueuedEvent};
use crate::relay::{RelayClient, RelayFactory};
use crate::transport::{SocketSlot, TunnelRtpFactory, TunnelTransport};
use sip_tunnel_core::probe::ProbeFactory;
use sip_tunnel_core::server::ServerAddr;
use std::sync::Arc;

mod auto_detect;
mod state;

use auto_detect::AutoDetect;
pub use state::{LinkState, Phase, RestorePoint};

pub struct TunnelCoordinator {
    config: CoordinatorConfig,
    engine: Arc<dyn SignalingEngine>,
    media: Arc<dyn MediaEngine>,
    relay_factory: Arc<dyn RelayFactory>,
    probe_factory: Arc<dyn ProbeFactory>,
    servers: Vec<ServerAddr>,
    http_proxy: HttpProxy,
    relay: Option<Arc<dyn RelayClient>>,
    relay_generation: u64,
    sip_socket: SocketSlot,
    hook: Arc<TunnelTransport>,
    hooks_installed: bool,
    link: LinkState,
    auto_detect: AutoDetect,
    events: EventQueue,
}

impl TunnelCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        engine: Arc<dyn SignalingEngine>,
        media: Arc<dyn MediaEngine>,
        relay_factory: Arc<dyn RelayFactory>,
        probe_factory: Arc<dyn ProbeFactory>,
    ) -> Self {
        let sip_socket = SocketSlot::new();
        let hook = Arc::new(TunnelTransport::new(
            sip_socket.clone(),
            engine.native_transport(),
            engine.native_socket(),
            engine.control_socket(),
            config.wait_poll_interval,
        ));
        Self {
            config,
            engine,
            media,
            relay_factory,
            probe_factory,
            servers: Vec::new(),
            http_proxy: HttpProxy::default(),
            relay: None,
            relay_generation: 0,
            sip_socket,
            hook,
            hooks_installed: false,
            link: LinkState::Disabled,
            auto_detect: AutoDetect::default(),
            events: EventQueue::new(),
        }
    }

    pub fn servers(&self) -> &[ServerAddr] {
        &self.servers
    }

    pub fn add_server(&mut self, addr: ServerAddr) {
        if !addr.is_usable() {
            log::warn!("tunnel server with empty host added, it will not work");
        }
        if let Some(relay) = &self.relay {
            relay.add_server(&addr);
        }
        self.servers.push(addr);
    }

    pub fn add_server_with_probe(&mut self, addr: ServerAddr, mirror_port: u16, delay_ms: u32) {
        self.add_server(ServerAddr::with_mirror(
            addr.host(),
            addr.port(),
            mirror_port,
            delay_ms,
        ));
    }

    pub fn clear_servers(&mut self) {
        self.servers.clear();
        self.auto_detect.stop();
        if let Some(relay) = &self.relay {
            relay.remove_all_servers();
        }
    }

    pub fn http_proxy(&self) -> &HttpProxy {
        &self.http_proxy
    }

    pub fn set_http_proxy(&mut self, proxy: HttpProxy) {
        self.http_proxy = proxy;
        if let Some(relay) = &self.relay {
            apply_http_proxy(relay.as_ref(), &self.http_proxy);
        }
    }

    pub fn set_http_proxy_auth(&mut self, username: Option<String>, password: Option<String>) {
        self.http_proxy.username = username;
        self.http_proxy.password = password;
        if let Some(relay) = &self.relay {
            relay.set_http_proxy_auth(
                self.http_proxy.username.as_deref(),
                self.http_proxy.password.as_deref(),
            );
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.link.is_enabled()
    }

    pub fn link_state(&self) -> LinkState {
        self.link
    }

    /// Tunneled signaling is up: enabled, confirmed on a tick, and the relay
    /// still reports ready.
    pub fn is_ready(&self) -> bool {
        self.link.phase() == Some(Phase::Ready)
            && self.relay.as_ref().is_some_and(|r| r.is_ready())
    }

    pub fn is_started(&self) -> bool {
        self.relay.as_ref().is_some_and(|r| r.is_started())
    }

    pub fn hooks_installed(&self) -> bool {
        self.hooks_installed
    }

    pub fn auto_detect_in_progress(&self) -> bool {
        self.auto_detect.in_progress()
    }

    /// Producers may post events through a clone of this queue.
    pub fn events(&self) -> &EventQueue {
        &self.events
    }

    pub fn enable(&mut self, on: bool) {
        match (on, self.link) {
            (true, LinkState::Disabled) => {
                log::info!("turning tunnel on");
                let restore = RestorePoint::capture(self.engine.as_ref());
                self.link = LinkState::Enabled {
                    restore,
                    phase: Phase::Connecting,
                };
                self.wait_unregistration();
                self.start_relay();
            }
            (false, LinkState::Enabled { restore, .. }) => {
                log::info!("turning tunnel off");
                self.wait_unregistration();
                self.link = LinkState::Disabled;
                self.stop_relay();
                restore.restore(self.engine.as_ref());
                self.engine.resume_registration();
            }
            _ => {
                log::debug!("tunnel already {}", if on { "on" } else { "off" });
            }
        }
    }

    pub fn reconnect(&mut self) {
        if !self.link.is_enabled() {
            return;
        }
        if let Some(relay) = &self.relay {
            relay.reconnect();
        } else {
            // creation failed when the tunnel was turned on
            self.start_relay();
        }
    }

    /// Run the mirror probes from the first candidate, abandoning any run in
    /// progress.
    pub fn auto_detect(&mut self) {
        if !auto_detect::has_candidates(&self.servers) {
            log::error!("no udp mirror configured, tunnel auto detection aborted");
            return;
        }
        if self.auto_detect.in_progress() {
            log::warn!("tunnel auto detection already running, restarting it");
        }
        self.auto_detect.begin();
        self.start_probe(0);
    }

    /// Abandon the probe sequence in progress; its pending result is ignored.
    pub fn stop_auto_detect(&mut self) {
        if self.auto_detect.in_progress() {
            log::info!("tunnel auto detection stopped");
        }
        self.auto_detect.stop();
    }

    /// Apply every event posted since the previous tick.
    pub fn iterate(&mut self) {
        for QueuedEvent { seq, event } in self.events.drain() {
            log::debug!("tunnel event #{seq} {event:?}");
            match event {
                Event::ConnectivityChanged { connected, relay } => {
                    self.on_connectivity(connected, relay)
                }
                Event::ProbeResult {
                    udp_reachable,
                    run,
                    index,
                } => self.on_probe_result(udp_reachable, run, index),
            }
        }
    }

    /// Let a pending de-registration go out before the transport changes
    /// underneath it. Returns the number of polls spent waiting.
    pub(crate) fn wait_unregistration(&self) -> usize {
        if !self.engine.is_registered() {
            return 0;
        }
        self.engine.pause_registration();
        let mut polls = 0;
        loop {
            self.engine.drive_iteration();
            if self.engine.is_deregistered() {
                break;
            }
            if polls >= self.config.unregister_max_polls {
                log::warn!("timeout waiting for unregistration, giving up");
                break;
            }
            polls += 1;
            std::thread::sleep(self.config.unregister_poll_interval);
        }
        polls
    }

    fn start_relay(&mut self) {
        let relay = match &self.relay {
            Some(relay) => relay.clone(),
            None => match self.create_relay() {
                Some(relay) => relay,
                None => return,
            },
        };
        relay.start();
        if !self.sip_socket.is_installed()
            && !self
                .sip_socket
                .open(relay.as_ref(), self.config.sip_stream_port)
        {
            log::warn!(
                "relay refused signaling stream on port {}",
                self.config.sip_stream_port
            );
        }
    }

    fn create_relay(&mut self) -> Option<Arc<dyn RelayClient>> {
        let relay = match self.relay_factory.create() {
            Ok(relay) => relay,
            Err(e) => {
                log::error!("cannot create tunnel relay: {e:?}");
                return None;
            }
        };
        self.relay_generation += 1;
        let generation = self.relay_generation;
        let events = self.events.clone();
        relay.set_connectivity_callback(Box::new(move |connected| {
            events.push(Event::ConnectivityChanged {
                connected,
                relay: generation,
            });
        }));
        for addr in &self.servers {
            relay.add_server(addr);
        }
        if self.http_proxy.is_configured() {
            apply_http_proxy(relay.as_ref(), &self.http_proxy);
        }
        self.relay = Some(relay.clone());
        Some(relay)
    }

    fn stop_relay(&mut self) {
        self.uninstall_hooks();
        if let Some(relay) = self.relay.take() {
            self.sip_socket.close(relay.as_ref());
            relay.destroy();
        }
    }

    fn install_hooks(&mut self, relay: Arc<dyn RelayClient>) {
        let hook: Arc<dyn Transport> = self.hook.clone();
        self.engine.install_transport_hook(Some(hook));
        self.media
            .install_rtp_transport_factory(Some(Arc::new(TunnelRtpFactory::new(relay))));
        self.hooks_installed = true;
    }

    fn uninstall_hooks(&mut self) {
        self.media.install_rtp_transport_factory(None);
        self.engine.install_transport_hook(None);
        self.hooks_installed = false;
    }

    fn on_connectivity(&mut self, connected: bool, generation: u64) {
        let relay = match &self.relay {
            Some(relay) if generation == self.relay_generation => relay.clone(),
            _ => {
                log::debug!("dropping connectivity event of stale relay {generation}");
                return;
            }
        };
        let Some(phase) = self.link.phase() else {
            log::debug!("dropping connectivity event, tunnel is off");
            return;
        };
        if connected {
            if phase == Phase::Ready {
                return;
            }
            log::info!("tunnel is up, registering now");
            self.engine.set_firewall_policy(FirewallPolicy::NoFirewall);
            self.install_hooks(relay);
            self.engine
                .set_transport_config(TransportConfig::udp_only(random_sip_port()));
            self.engine.resume_registration();
            self.link = self.link.with_phase(Phase::Ready);
        } else {
            log::info!("tunnel connection lost");
            if self.engine.is_registered() {
                // register again once the tunnel is back
                self.engine.pause_registration();
                self.engine.drive_iteration();
            }
            self.link = self.link.with_phase(Phase::Disconnected);
        }
    }

    fn start_probe(&mut self, index: usize) -> bool {
        let Some(server) = auto_detect::candidate(&self.servers, index) else {
            return false;
        };
        let run = self.auto_detect.run();
        match self.probe_factory.create(server) {
            Some(mut probe) => {
                let events = self.events.clone();
                probe.start(Box::new(move |udp_reachable| {
                    events.push(Event::ProbeResult {
                        udp_reachable,
                        run,
                        index,
                    });
                }));
                self.auto_detect.advance(index, Some(probe));
            }
            None => {
                self.auto_detect.advance(index, None);
                self.events.push(Event::ProbeResult {
                    udp_reachable: false,
                    run,
                    index,
                });
            }
        }
        true
    }

    fn on_probe_result(&mut self, udp_reachable: bool, run: u64, index: usize) {
        if !self.auto_detect.is_current(run, index) {
            log::debug!("dropping stale probe result run={run} index={index}");
            return;
        }
        if udp_reachable {
            log::info!("direct udp works, tunnel not required");
            self.auto_detect.stop();
            self.enable(false);
            return;
        }
        if self.start_probe(index + 1) {
            log::info!("tunnel required, enabling; trying backup udp mirror");
        } else {
            log::info!("tunnel required, enabling; no backup udp mirror available");
            self.auto_detect.stop();
        }
        self.enable(true);
    }
}

impl Drop for TunnelCoordinator {
    fn drop(&mut self) {
        self.auto_detect.stop();
        if self.relay.is_some() {
            self.stop_relay();
        }
    }
}

fn apply_http_proxy(relay: &dyn RelayClient, proxy: &HttpProxy) {
    relay.set_http_proxy(
        &proxy.host,
        proxy.port,
        proxy.username.as_deref(),
        proxy.password.as_deref(),
    );
}

/// Ephemeral local port for tunneled signaling.
fn random_sip_port() -> u16 {
    1024 + (rand::random::<u16>() & 0xDFFF)
}
