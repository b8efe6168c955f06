//! Cloudflare REST backend — upserts TXT records through the zone-scoped
//! v4 API.
//!
//! The provider offers no transactional upsert, so every publish is a
//! list-then-act sequence. Calls for the same record name are serialized
//! behind a keyed mutex so concurrent publishes and retracts for one
//! username still converge to at most one external record.

use crate::backend::DnsBackend;
use crate::error::{Result, SyncError};
use crate::record::{NamingScheme, RECORD_TTL};
use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Immutable connection state for the Cloudflare backend, captured at
/// construction and shared read-only across all concurrent calls.
#[derive(Debug, Clone)]
pub struct CloudflareConfig {
    /// API token with DNS edit permission on the zone.
    pub api_token: String,
    /// Identifier of the zone the records live in.
    pub zone_id: String,
    /// Domain the record names are computed under.
    pub domain: String,
    /// Naming scheme for record names and content.
    pub scheme: NamingScheme,
    /// Deadline applied to every API round trip.
    pub timeout: Duration,
}

/// DNS backend writing through the Cloudflare v4 REST API.
#[derive(Debug)]
pub struct CloudflareBackend {
    http: reqwest::Client,
    api_base: String,
    config: CloudflareConfig,
    /// Per-record-name locks serializing the list-then-act sequence.
    /// The map grows with distinct record names; entries are reclaimed
    /// once no call holds them.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

#[derive(Deserialize)]
struct ApiEnvelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Deserialize)]
struct ApiMessage {
    code: i64,
    message: String,
}

/// The subset of a Cloudflare DNS record object this backend reads.
#[derive(Debug, Clone, Deserialize)]
struct ApiRecord {
    id: String,
    name: String,
    content: String,
}

#[derive(Serialize)]
struct WriteRecord<'a> {
    #[serde(rename = "type")]
    rtype: &'a str,
    name: &'a str,
    content: &'a str,
    ttl: u32,
}

impl CloudflareBackend {
    pub fn new(config: CloudflareConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_base: CLOUDFLARE_API_BASE.to_string(),
            config,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Point the backend at a different API base URL. Used by tests and
    /// self-hosted API gateways.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Fetch (or create) the lock guarding `record`, then drop stale
    /// entries nobody else holds.
    async fn record_lock(&self, record: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        let lock = locks
            .entry(record.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        locks.retain(|name, l| name.as_str() == record || Arc::strong_count(l) > 1);
        lock
    }

    fn records_url(&self) -> String {
        format!(
            "{}/zones/{}/dns_records",
            self.api_base, self.config.zone_id
        )
    }

    fn record_url(&self, id: &str) -> String {
        format!(
            "{}/zones/{}/dns_records/{}",
            self.api_base, self.config.zone_id, id
        )
    }

    /// Decode a Cloudflare response envelope, turning `success: false` into
    /// an error carrying the provider's own messages.
    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> anyhow::Result<T> {
        let status = response.status();
        let envelope: ApiEnvelope<T> = response
            .json()
            .await
            .context("failed to decode Cloudflare API response")?;

        if !envelope.success {
            let detail = envelope
                .errors
                .iter()
                .map(|e| format!("{} (code {})", e.message, e.code))
                .collect::<Vec<_>>()
                .join("; ");
            bail!("Cloudflare API error ({status}): {detail}");
        }
        envelope
            .result
            .context("Cloudflare API response missing result")
    }

    /// List existing TXT records at exactly `record`.
    async fn list_records(&self, record: &str) -> anyhow::Result<Vec<ApiRecord>> {
        let response = self
            .http
            .get(self.records_url())
            .bearer_auth(&self.config.api_token)
            .query(&[("type", "TXT"), ("name", record)])
            .send()
            .await
            .context("failed to list DNS records")?;
        Self::decode(response).await
    }

    async fn create_record(&self, record: &str, content: &str) -> anyhow::Result<()> {
        let response = self
            .http
            .post(self.records_url())
            .bearer_auth(&self.config.api_token)
            .json(&WriteRecord {
                rtype: "TXT",
                name: record,
                content,
                ttl: RECORD_TTL,
            })
            .send()
            .await
            .context("failed to create DNS record")?;
        Self::decode::<ApiRecord>(response).await?;
        Ok(())
    }

    async fn update_record(&self, id: &str, record: &str, content: &str) -> anyhow::Result<()> {
        let response = self
            .http
            .put(self.record_url(id))
            .bearer_auth(&self.config.api_token)
            .json(&WriteRecord {
                rtype: "TXT",
                name: record,
                content,
                ttl: RECORD_TTL,
            })
            .send()
            .await
            .with_context(|| format!("failed to update DNS record {id}"))?;
        Self::decode::<ApiRecord>(response).await?;
        Ok(())
    }

    async fn delete_record(&self, id: &str) -> anyhow::Result<()> {
        let response = self
            .http
            .delete(self.record_url(id))
            .bearer_auth(&self.config.api_token)
            .send()
            .await
            .with_context(|| format!("failed to delete DNS record {id}"))?;
        Self::decode::<serde_json::Value>(response).await?;
        Ok(())
    }
}

#[async_trait]
impl DnsBackend for CloudflareBackend {
    fn name(&self) -> &'static str {
        "cloudflare"
    }

    async fn publish(&self, username: &str, offer: &str) -> Result<u32> {
        let record = self.config.scheme.record_name(username, &self.config.domain);
        let content = self.config.scheme.record_content(offer);

        let lock = self.record_lock(&record).await;
        let _guard = lock.lock().await;

        debug!(record = %record, "publishing TXT record via Cloudflare");

        let existing = self
            .list_records(&record)
            .await
            .map_err(|e| SyncError::provider("publish", &record, e))?;

        if existing.len() > 1 {
            // Only possible via writes outside this layer; acts on the
            // first match.
            warn!(
                record = %record,
                matches = existing.len(),
                "multiple TXT records found where one was expected"
            );
        }

        match existing.first() {
            Some(rec) => {
                self.update_record(&rec.id, &record, &content)
                    .await
                    .map_err(|e| SyncError::provider("publish", &record, e))?;
                info!(record = %record, id = %rec.id, "TXT record updated");
            }
            None => {
                self.create_record(&record, &content)
                    .await
                    .map_err(|e| SyncError::provider("publish", &record, e))?;
                info!(record = %record, "TXT record created");
            }
        }

        Ok(RECORD_TTL)
    }

    async fn retract(&self, username: &str) -> Result<()> {
        let record = self.config.scheme.record_name(username, &self.config.domain);

        let lock = self.record_lock(&record).await;
        let _guard = lock.lock().await;

        debug!(record = %record, "retracting TXT record via Cloudflare");

        let existing = self
            .list_records(&record)
            .await
            .map_err(|e| SyncError::provider("retract", &record, e))?;

        let Some(rec) = existing.first() else {
            debug!(record = %record, "no TXT record found — nothing to retract");
            return Ok(());
        };

        self.delete_record(&rec.id)
            .await
            .map_err(|e| SyncError::provider("retract", &record, e))?;

        info!(record = %record, id = %rec.id, "TXT record removed");
        Ok(())
    }
}
