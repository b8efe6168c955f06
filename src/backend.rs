//! The backend capability — one stable contract for publishing and
//! retracting a username's TXT record, implemented by interchangeable
//! strategies with different atomicity characteristics.

use crate::error::Result;
use crate::record::RECORD_TTL;
use async_trait::async_trait;
use tracing::debug;

/// A DNS backend capable of publishing and retracting a username's record.
///
/// Implementations hold only immutable connection state captured at
/// construction, so a single instance is safe to share across concurrent
/// callers (`Arc<dyn DnsBackend>`).
///
/// Dropping a `publish` or `retract` future cancels the call. A cancelled
/// operation leaves external state unspecified; this layer never retries on
/// its own.
#[async_trait]
pub trait DnsBackend: Send + Sync + std::fmt::Debug {
    /// Short backend identifier for logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Ensure exactly one TXT record exists for `username` carrying `offer`,
    /// with the fixed TTL. Safe to call repeatedly with different payloads
    /// for the same username — the later call wins.
    ///
    /// Returns the TTL actually applied, which callers pass to the cache
    /// layer as an expiry hint.
    async fn publish(&self, username: &str, offer: &str) -> Result<u32>;

    /// Ensure no managed TXT record exists for `username`. Succeeds when no
    /// record existed — retraction is idempotent.
    async fn retract(&self, username: &str) -> Result<()>;
}

/// Backend used when DNS publication is disabled or unconfigured.
///
/// Both operations succeed deterministically and perform no I/O, so the
/// caller never observes a failure purely because DNS sync is turned off.
#[derive(Debug)]
pub struct NoopBackend;

#[async_trait]
impl DnsBackend for NoopBackend {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn publish(&self, username: &str, _offer: &str) -> Result<u32> {
        debug!(username = %username, "DNS publication disabled — skipping publish");
        Ok(RECORD_TTL)
    }

    async fn retract(&self, username: &str) -> Result<()> {
        debug!(username = %username, "DNS publication disabled — skipping retract");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_publish_always_succeeds() {
        let backend = NoopBackend;
        assert_eq!(backend.publish("anyone", "anything").await.unwrap(), RECORD_TTL);
        assert_eq!(backend.publish("anyone", "anything").await.unwrap(), RECORD_TTL);
    }

    #[tokio::test]
    async fn test_noop_retract_always_succeeds() {
        let backend = NoopBackend;
        backend.retract("anyone").await.unwrap();
        backend.retract("anyone").await.unwrap();
    }
}
