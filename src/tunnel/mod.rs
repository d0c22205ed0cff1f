//! Config-backed front of the coordinator.
//!
//! [`Tunnel`] keeps a [`TunnelConfig`] and a [`ConfigStore`] in step with the
//! [`TunnelCoordinator`]: every setting change is applied to the coordinator
//! and written back to the store.

use crate::config::{ConfigStore, HttpProxy, TunnelConfig, TunnelMode};
use crate::coordinator::TunnelCoordinator;
use crate::error::Result;
use sip_tunnel_core::server::ServerAddr;

pub struct Tunnel<S: ConfigStore> {
    coordinator: TunnelCoordinator,
    store: S,
    config: TunnelConfig,
}

impl<S: ConfigStore> Tunnel<S> {
    /// Loads the persisted settings, hands them to `coordinator` and applies
    /// the stored mode.
    pub fn new(mut coordinator: TunnelCoordinator, store: S) -> Self {
        let config = TunnelConfig::load(&store);
        for addr in &config.servers {
            coordinator.add_server(addr.clone());
        }
        if config.http_proxy.is_configured() {
            coordinator.set_http_proxy(config.http_proxy.clone());
        }
        log::debug!(
            "tunnel loaded with {} server(s), mode {}",
            config.servers.len(),
            config.mode
        );
        let mut tunnel = Self {
            coordinator,
            store,
            config,
        };
        tunnel.apply_mode();
        tunnel
    }

    pub fn servers(&self) -> &[ServerAddr] {
        &self.config.servers
    }

    pub fn add_server(&mut self, addr: ServerAddr) {
        self.coordinator.add_server(addr.clone());
        self.config.servers.push(addr);
        self.save();
    }

    /// Adds a server written as `host:port[:mirror_port:delay_ms]`.
    pub fn add_server_token(&mut self, token: &str) -> Result<()> {
        let addr: ServerAddr = token.parse()?;
        self.add_server(addr);
        Ok(())
    }

    /// Removes the first entry equal to `addr`. Returns false if there was none.
    pub fn remove_server(&mut self, addr: &ServerAddr) -> bool {
        if !self.config.remove_server(addr) {
            return false;
        }
        self.coordinator.clear_servers();
        for addr in &self.config.servers {
            self.coordinator.add_server(addr.clone());
        }
        self.save();
        true
    }

    pub fn clean_servers(&mut self) {
        self.coordinator.clear_servers();
        self.config.servers.clear();
        self.save();
    }

    pub fn mode(&self) -> TunnelMode {
        self.config.mode
    }

    pub fn set_mode(&mut self, mode: TunnelMode) {
        log::info!("tunnel mode {} -> {}", self.config.mode, mode);
        self.config.mode = mode;
        self.config.enabled = mode != TunnelMode::Never;
        self.save();
        self.apply_mode();
    }

    pub fn http_proxy(&self) -> &HttpProxy {
        &self.config.http_proxy
    }

    pub fn set_http_proxy(&mut self, proxy: HttpProxy) {
        self.coordinator.set_http_proxy(proxy.clone());
        self.config.http_proxy = proxy;
        self.save();
    }

    pub fn set_http_proxy_auth(&mut self, username: Option<String>, password: Option<String>) {
        self.coordinator
            .set_http_proxy_auth(username.clone(), password.clone());
        self.config.http_proxy.username = username;
        self.config.http_proxy.password = password;
        self.save();
    }

    pub fn iterate(&mut self) {
        self.coordinator.iterate();
    }

    pub fn coordinator(&self) -> &TunnelCoordinator {
        &self.coordinator
    }
    pub fn coordinator_mut(&mut self) -> &mut TunnelCoordinator {
        &mut self.coordinator
    }
    pub fn store(&self) -> &S {
        &self.store
    }

    fn apply_mode(&mut self) {
        match self.config.mode {
            TunnelMode::Never => {
                self.coordinator.stop_auto_detect();
                self.coordinator.enable(false);
            }
            TunnelMode::Always => {
                self.coordinator.stop_auto_detect();
                self.coordinator.enable(true);
            }
            TunnelMode::Auto => self.coordinator.auto_detect(),
        }
    }

    fn save(&mut self) {
        self.config.save(&mut self.store);
    }
}
