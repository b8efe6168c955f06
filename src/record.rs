//! Record naming — pure functions from (username, domain, scheme) to the
//! fully-qualified TXT record name and its content.
//!
//! No normalization (case folding, punycode) is applied here: callers must
//! pre-normalize usernames before handing them to this layer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// TTL applied to every record this layer writes, in seconds.
/// Fixed by design — not configurable per call.
pub const RECORD_TTL: u32 = 3600;

/// The record naming scheme in use for a deployment.
///
/// Two schemes coexist across protocol versions. A deployment picks one via
/// configuration; both produce names that are injective in the username for
/// a fixed domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NamingScheme {
    /// `<username>.user._bitcoin-payment.<domain>`, content wrapped as a
    /// `bitcoin:?lno=` URI.
    BitcoinPayment,
    /// `_bip353.<username>.<domain>`, content equal to the raw offer string.
    Bip353,
}

impl NamingScheme {
    /// The fully-qualified TXT record name for `username` under `domain`
    /// (no trailing dot).
    pub fn record_name(&self, username: &str, domain: &str) -> String {
        match self {
            Self::BitcoinPayment => format!("{username}.user._bitcoin-payment.{domain}"),
            Self::Bip353 => format!("_bip353.{username}.{domain}"),
        }
    }

    /// The TXT value carrying `offer`. Length-bounded only by the DNS TXT
    /// limit, which this layer does not separately enforce.
    pub fn record_content(&self, offer: &str) -> String {
        match self {
            Self::BitcoinPayment => format!("bitcoin:?lno={offer}"),
            Self::Bip353 => offer.to_string(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BitcoinPayment => "bitcoin-payment",
            Self::Bip353 => "bip353",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "bitcoin-payment" => Some(Self::BitcoinPayment),
            "bip353" => Some(Self::Bip353),
            _ => None,
        }
    }
}

impl fmt::Display for NamingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
