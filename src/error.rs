use thiserror::Error;

/// Errors surfaced by the DNS synchronization layer.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The selected backend's configuration is incomplete or malformed.
    /// Raised at startup only; the process should not come up with one of
    /// these.
    #[error("invalid DNS sync configuration: {0}")]
    Config(String),

    /// An external provider call failed (authentication, network, rate
    /// limiting, malformed response, server refusal). Never retried inside
    /// this layer — retry policy belongs to the caller.
    #[error("{op} failed for {record}: {source}")]
    Provider {
        /// The operation that failed ("publish" or "retract").
        op: &'static str,
        /// The fully-qualified record name the operation targeted.
        record: String,
        #[source]
        source: anyhow::Error,
    },
}

impl SyncError {
    pub(crate) fn provider(op: &'static str, record: &str, source: anyhow::Error) -> Self {
        Self::Provider {
            op,
            record: record.to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
