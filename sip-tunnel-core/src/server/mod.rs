//! Relay server addressing.
//!
//! A [`ServerAddr`] names one tunnel relay and, optionally, the UDP mirror
//! that runs next to it. Server lists are persisted as space separated tokens
//! of the form `host:port[:mirror_port:delay_ms]`; IPv6 literals are written
//! in brackets (`[::1]:443`).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// UDP mirror attached to a relay: the port echoing probe datagrams and the
/// longest round trip still considered "direct UDP works".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MirrorConfig {
    pub port: u16,
    pub delay_ms: u32,
}

impl MirrorConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms as u64)
    }
}

/// Address of one tunnel relay. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerAddr {
    host: String,
    port: u16,
    #[serde(default)]
    mirror: Option<MirrorConfig>,
}

impl ServerAddr {
    pub fn new<H: Into<String>>(host: H, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            mirror: None,
        }
    }
    pub fn with_mirror<H: Into<String>>(
        host: H,
        port: u16,
        mirror_port: u16,
        delay_ms: u32,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            mirror: Some(MirrorConfig {
                port: mirror_port,
                delay_ms,
            }),
        }
    }
    pub fn host(&self) -> &str {
        &self.host
    }
    pub fn port(&self) -> u16 {
        self.port
    }
    pub fn mirror(&self) -> Option<&MirrorConfig> {
        self.mirror.as_ref()
    }
    /// A relay without a host can be stored but never reached.
    pub fn is_usable(&self) -> bool {
        !self.host.is_empty()
    }
    /// `host:mirror_port`, suitable for name resolution.
    pub fn mirror_target(&self) -> Option<String> {
        self.mirror.map(|m| join_host_port(&self.host, m.port))
    }
}

fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

impl fmt::Display for ServerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join_host_port(&self.host, self.port))?;
        if let Some(mirror) = &self.mirror {
            write!(f, ":{}:{}", mirror.port, mirror.delay_ms)?;
        }
        Ok(())
    }
}

impl FromStr for ServerAddr {
    type Err = Error;

    fn from_str(token: &str) -> Result<Self> {
        let (host, rest) = if let Some(bracketed) = token.strip_prefix('[') {
            let (host, rest) = bracketed
                .split_once(']')
                .ok_or_else(|| Error::InvalidToken(token.to_string()))?;
            let rest = rest
                .strip_prefix(':')
                .ok_or_else(|| Error::InvalidToken(token.to_string()))?;
            (host, rest)
        } else {
            token
                .split_once(':')
                .ok_or_else(|| Error::InvalidToken(token.to_string()))?
        };
        if host.is_empty() {
            return Err(Error::EmptyHost);
        }
        let fields: Vec<&str> = rest.split(':').collect();
        match fields.as_slice() {
            [port] => Ok(ServerAddr::new(host, parse_port(port)?)),
            [port, mirror_port, delay_ms] => {
                let delay_ms = delay_ms
                    .parse::<u32>()
                    .map_err(|_| Error::InvalidToken(token.to_string()))?;
                Ok(ServerAddr::with_mirror(
                    host,
                    parse_port(port)?,
                    parse_port(mirror_port)?,
                    delay_ms,
                ))
            }
            _ => Err(Error::InvalidToken(token.to_string())),
        }
    }
}

fn parse_port(s: &str) -> Result<u16> {
    s.parse::<u16>()
        .map_err(|_| Error::InvalidPort(s.to_string()))
}

/// Parse a space separated server list. Bad tokens are logged and skipped.
pub fn parse_server_list(list: &str) -> Vec<ServerAddr> {
    let mut servers = Vec::new();
    for token in list.split_whitespace() {
        match token.parse::<ServerAddr>() {
            Ok(addr) => servers.push(addr),
            Err(e) => {
                log::warn!("skipping tunnel server token {token:?}: {e}")
            }
        }
    }
    servers
}

pub fn format_server_list(servers: &[ServerAddr]) -> String {
    servers
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
