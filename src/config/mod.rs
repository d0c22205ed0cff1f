use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sip_tunnel_core::server::{format_server_list, parse_server_list, ServerAddr};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

mod store;

pub use store::{ConfigStore, MemoryStore};

pub const SECTION: &str = "tunnel";
pub const KEY_SERVERS: &str = "server_addresses";
pub const KEY_ENABLED: &str = "enabled";
pub const KEY_MODE: &str = "mode";
pub const KEY_PROXY_HOST: &str = "http_proxy_host";
pub const KEY_PROXY_PORT: &str = "http_proxy_port";
pub const KEY_PROXY_USERNAME: &str = "http_proxy_username";
pub const KEY_PROXY_PASSWORD: &str = "http_proxy_password";

pub const DEFAULT_SIP_STREAM_PORT: u16 = 5060;
pub const DEFAULT_HTTP_PROXY_PORT: u16 = 8080;
pub(crate) const UNREGISTER_POLL_INTERVAL: Duration = Duration::from_millis(20);
pub(crate) const UNREGISTER_MAX_POLLS: usize = 100;
pub(crate) const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Port requested from the relay for the signaling stream.
    pub sip_stream_port: u16,
    pub unregister_poll_interval: Duration,
    pub unregister_max_polls: usize,
    /// Granularity of the tunneled readiness wait.
    pub wait_poll_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            sip_stream_port: DEFAULT_SIP_STREAM_PORT,
            unregister_poll_interval: UNREGISTER_POLL_INTERVAL,
            unregister_max_polls: UNREGISTER_MAX_POLLS,
            wait_poll_interval: WAIT_POLL_INTERVAL,
        }
    }
}

impl CoordinatorConfig {
    pub fn set_sip_stream_port(mut self, sip_stream_port: u16) -> Self {
        self.sip_stream_port = sip_stream_port;
        self
    }
    pub fn set_unregister_poll_interval(mut self, unregister_poll_interval: Duration) -> Self {
        self.unregister_poll_interval = unregister_poll_interval;
        self
    }
    pub fn set_unregister_max_polls(mut self, unregister_max_polls: usize) -> Self {
        self.unregister_max_polls = unregister_max_polls;
        self
    }
    pub fn set_wait_poll_interval(mut self, wait_poll_interval: Duration) -> Self {
        self.wait_poll_interval = wait_poll_interval;
        self
    }
}

/// When the tunnel is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelMode {
    #[default]
    Never,
    Always,
    /// Decided by probing the relays' UDP mirrors.
    Auto,
}

impl fmt::Display for TunnelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TunnelMode::Never => "never",
            TunnelMode::Always => "always",
            TunnelMode::Auto => "auto",
        })
    }
}

impl FromStr for TunnelMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "never" => Ok(TunnelMode::Never),
            "always" => Ok(TunnelMode::Always),
            "auto" => Ok(TunnelMode::Auto),
            other => Err(Error::InvalidArgument(format!("tunnel mode {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpProxy {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl HttpProxy {
    pub fn new<H: Into<String>>(host: H, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
        }
    }
    pub fn set_auth(mut self, username: Option<String>, password: Option<String>) -> Self {
        self.username = username;
        self.password = password;
        self
    }
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty()
    }
}

/// Tunnel settings as persisted between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelConfig {
    pub servers: Vec<ServerAddr>,
    #[serde(default)]
    pub http_proxy: HttpProxy,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub mode: TunnelMode,
}

impl TunnelConfig {
    /// Missing or unreadable values fall back to defaults; bad server tokens are skipped.
    pub fn load(store: &dyn ConfigStore) -> Self {
        let servers = store
            .get(SECTION, KEY_SERVERS)
            .map(|list| parse_server_list(&list))
            .unwrap_or_default();
        let enabled = store
            .get(SECTION, KEY_ENABLED)
            .map(|v| parse_flag(&v))
            .unwrap_or(false);
        let mode = match store.get(SECTION, KEY_MODE) {
            Some(v) => v.parse().unwrap_or_else(|e| {
                log::warn!("{e}, tunnel stays off");
                TunnelMode::Never
            }),
            // written before the mode existed
            None if enabled => TunnelMode::Always,
            None => TunnelMode::Never,
        };
        let http_proxy = HttpProxy {
            host: store.get(SECTION, KEY_PROXY_HOST).unwrap_or_default(),
            port: store
                .get(SECTION, KEY_PROXY_PORT)
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_HTTP_PROXY_PORT),
            username: store.get(SECTION, KEY_PROXY_USERNAME),
            password: store.get(SECTION, KEY_PROXY_PASSWORD),
        };
        Self {
            servers,
            http_proxy,
            enabled,
            mode,
        }
    }

    pub fn save(&self, store: &mut dyn ConfigStore) {
        let servers = format_server_list(&self.servers);
        store.set(
            SECTION,
            KEY_SERVERS,
            (!servers.is_empty()).then_some(servers.as_str()),
        );
        store.set(SECTION, KEY_ENABLED, Some(if self.enabled { "1" } else { "0" }));
        store.set(SECTION, KEY_MODE, Some(self.mode.to_string().as_str()));
        if self.http_proxy.is_configured() {
            store.set(SECTION, KEY_PROXY_HOST, Some(self.http_proxy.host.as_str()));
            store.set(
                SECTION,
                KEY_PROXY_PORT,
                Some(self.http_proxy.port.to_string().as_str()),
            );
        } else {
            store.set(SECTION, KEY_PROXY_HOST, None);
            store.set(SECTION, KEY_PROXY_PORT, None);
        }
        store.set(SECTION, KEY_PROXY_USERNAME, self.http_proxy.username.as_deref());
        store.set(SECTION, KEY_PROXY_PASSWORD, self.http_proxy.password.as_deref());
    }

    /// Removes the first entry equal to `addr`.
    pub fn remove_server(&mut self, addr: &ServerAddr) -> bool {
        match self.servers.iter().position(|s| s == addr) {
            Some(index) => {
                self.servers.remove(index);
                true
            }
            None => false,
        }
    }
}

fn parse_flag(v: &str) -> bool {
    matches!(v.trim(), "1" | "true" | "yes" | "on")
}
