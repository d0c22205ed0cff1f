//! Carries a SIP user agent's signaling and RTP media through a relay when
//! direct UDP is blocked.
//!
//! The host wires its signaling engine, media engine and relay client into a
//! [`TunnelCoordinator`] (or a config-backed [`Tunnel`]) and calls
//! [`TunnelCoordinator::iterate`] on every tick of its main loop. Relay and
//! probe callbacks arrive on their own threads and are applied on that tick.
//!
//! ```
//! use sip_tunnel::config::{MemoryStore, TunnelMode, ConfigStore, SECTION, KEY_MODE};
//! use sip_tunnel::TunnelConfig;
//!
//! let mut store = MemoryStore::new();
//! store.set(SECTION, "server_addresses", Some("relay.example.com:443:12345:1000"));
//! store.set(SECTION, KEY_MODE, Some("auto"));
//! let config = TunnelConfig::load(&store);
//! assert_eq!(config.mode, TunnelMode::Auto);
//! assert!(config.servers[0].mirror().is_some());
//! ```

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod event;
pub mod relay;
pub mod transport;
pub mod tunnel;

#[cfg(test)]
mod mock;

pub use config::{CoordinatorConfig, HttpProxy, TunnelConfig, TunnelMode};
pub use coordinator::{LinkState, Phase, RestorePoint, TunnelCoordinator};
pub use sip_tunnel_core::probe::{ProbeClient, UdpProbeFactory};
pub use sip_tunnel_core::server::ServerAddr;
pub use tunnel::Tunnel;
