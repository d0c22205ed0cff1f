//! # sip-tunnel-core - Leaf building blocks for SIP/RTP tunneling
//!
//! `sip-tunnel-core` holds the pieces of the tunnel subsystem that have no
//! knowledge of the signaling engine: how relay servers are addressed and
//! persisted, and how direct UDP reachability is measured against a mirror
//! server. The higher-level `sip-tunnel` crate drives these from its
//! coordinator.
//!
//! ## Modules
//!
//! - [`server`] - relay server addresses and the `host:port[:mirror_port:delay_ms]` token format
//! - [`probe`] - UDP mirror probe deciding whether tunneling is needed
//! - [`socket`] - low-level socket creation
//!
//! ## Parsing a server list
//!
//! ```rust
//! use sip_tunnel_core::server::{format_server_list, parse_server_list};
//!
//! let servers = parse_server_list("relay.example.com:443:12345:1000 backup.example.com:80");
//! assert_eq!(servers.len(), 2);
//! assert!(servers[0].mirror().is_some());
//! assert_eq!(
//!     format_server_list(&servers),
//!     "relay.example.com:443:12345:1000 backup.example.com:80"
//! );
//! ```
//!
//! ## Probing a mirror
//!
//! ```rust,no_run
//! use sip_tunnel_core::probe::{MirrorProbe, ProbeClient};
//! use sip_tunnel_core::server::ServerAddr;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let server = ServerAddr::with_mirror("relay.example.com", 443, 12345, 1000);
//! let mut probe = ProbeClient::new(&server, tokio::runtime::Handle::current()).unwrap();
//! probe.start(Box::new(|udp_reachable| {
//!     println!("direct udp works: {udp_reachable}");
//! }));
//! # }
//! ```

pub mod error;
pub mod probe;
pub mod server;
pub mod socket;
