//! DNS TXT record synchronization for BIP-353 / BOLT12 payment addresses.
//!
//! Maintains the TXT records that map a username to a reusable Lightning
//! offer, so wallets can resolve `user@domain` identifiers via DNS lookup.
//! One stable contract — publish or retract a record for a username — backed
//! by interchangeable strategies: the Cloudflare REST API, TSIG-signed
//! RFC 2136 dynamic updates, or a no-op stub when publication is disabled.
//!
//! The backend is chosen once at startup from configuration:
//!
//! ```no_run
//! # async fn run() -> bip353_sync::Result<()> {
//! use bip353_sync::DnsBackend;
//!
//! let config = bip353_sync::SyncConfig::from_env()?;
//! let dns = config.select_backend()?;
//!
//! let ttl = dns.publish("alice", "lno1abc...").await?;
//! dns.retract("alice").await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod cloudflare;
pub mod config;
pub mod error;
pub mod record;
pub mod rfc2136;

pub use backend::{DnsBackend, NoopBackend};
pub use cloudflare::{CloudflareBackend, CloudflareConfig};
pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use record::{NamingScheme, RECORD_TTL};
pub use rfc2136::{KeyAlgorithm, Rfc2136Backend, Rfc2136Config, Transport};
