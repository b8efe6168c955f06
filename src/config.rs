//! Configuration and backend selection.
//!
//! Configuration is read once at startup and selects exactly one backend
//! for the process lifetime: Cloudflare when API credentials are present,
//! the RFC 2136 backend when a nameserver is configured, and the no-op
//! backend otherwise. Present-but-incomplete backend configuration is a
//! fatal error rather than a silent downgrade.

use crate::backend::{DnsBackend, NoopBackend};
use crate::cloudflare::{CloudflareBackend, CloudflareConfig};
use crate::error::{Result, SyncError};
use crate::record::NamingScheme;
use crate::rfc2136::{KeyAlgorithm, Rfc2136Backend, Rfc2136Config, Transport};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Deadline applied to backend round trips unless overridden.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything the DNS synchronization layer reads from the environment.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Master switch; when off, the no-op backend is selected regardless of
    /// anything else.
    pub enabled: bool,
    /// Domain the record names are computed under.
    pub domain: Option<String>,
    /// Naming scheme for record names and content.
    pub scheme: NamingScheme,
    /// Deadline applied to every backend round trip.
    pub timeout: Duration,

    pub cloudflare_api_token: Option<String>,
    pub cloudflare_zone_id: Option<String>,

    /// Nameserver accepting signed updates, `ip` or `ip:port`.
    pub rfc2136_nameserver: Option<String>,
    pub rfc2136_transport: Transport,
    pub rfc2136_key_name: Option<String>,
    /// TSIG shared secret, base64-encoded.
    pub rfc2136_key_secret: Option<String>,
    pub rfc2136_key_algorithm: KeyAlgorithm,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            domain: None,
            scheme: NamingScheme::BitcoinPayment,
            timeout: DEFAULT_TIMEOUT,
            cloudflare_api_token: None,
            cloudflare_zone_id: None,
            rfc2136_nameserver: None,
            rfc2136_transport: Transport::Udp,
            rfc2136_key_name: None,
            rfc2136_key_secret: None,
            rfc2136_key_algorithm: KeyAlgorithm::HmacSha256,
        }
    }
}

impl SyncConfig {
    /// Read configuration from the environment. Unset and empty variables
    /// are treated alike.
    pub fn from_env() -> Result<Self> {
        let mut config = Self {
            enabled: env_opt("BOLT12_ENABLED").as_deref() == Some("true"),
            domain: env_opt("ROOT_DOMAIN"),
            cloudflare_api_token: env_opt("CLOUDFLARE_API_TOKEN"),
            cloudflare_zone_id: env_opt("CLOUDFLARE_ZONE_ID"),
            rfc2136_nameserver: env_opt("RFC2136_NAMESERVER"),
            rfc2136_key_name: env_opt("RFC2136_KEY_NAME"),
            rfc2136_key_secret: env_opt("RFC2136_KEY_SECRET"),
            ..Self::default()
        };

        if let Some(scheme) = env_opt("BIP353_SCHEME") {
            config.scheme = NamingScheme::from_str_loose(&scheme).ok_or_else(|| {
                SyncError::Config(format!(
                    "BIP353_SCHEME must be \"bitcoin-payment\" or \"bip353\", got \"{scheme}\""
                ))
            })?;
        }

        if let Some(transport) = env_opt("RFC2136_PROTOCOL") {
            config.rfc2136_transport =
                Transport::from_str_loose(&transport).ok_or_else(|| {
                    SyncError::Config(format!(
                        "RFC2136_PROTOCOL must be \"udp\" or \"tcp\", got \"{transport}\""
                    ))
                })?;
        }

        if let Some(algorithm) = env_opt("RFC2136_KEY_ALGORITHM") {
            config.rfc2136_key_algorithm = KeyAlgorithm::from_str_loose(&algorithm)
                .ok_or_else(|| {
                    SyncError::Config(format!("unsupported TSIG algorithm \"{algorithm}\""))
                })?;
        }

        if let Some(secs) = env_opt("DNS_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                SyncError::Config(format!("DNS_TIMEOUT_SECS must be an integer, got \"{secs}\""))
            })?;
            config.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Choose the backend this process will use. Evaluated once at startup;
    /// no fallback between backends occurs afterwards.
    pub fn select_backend(&self) -> Result<Arc<dyn DnsBackend>> {
        if !self.enabled {
            info!("BOLT12 DNS record publication is disabled");
            return Ok(Arc::new(NoopBackend));
        }

        if let (Some(api_token), Some(zone_id)) =
            (&self.cloudflare_api_token, &self.cloudflare_zone_id)
        {
            let domain = self.domain.clone().ok_or_else(|| {
                SyncError::Config(
                    "ROOT_DOMAIN must be set when using the Cloudflare backend".to_string(),
                )
            })?;

            info!(zone = %zone_id, domain = %domain, scheme = %self.scheme, "using Cloudflare DNS backend");
            let backend = CloudflareBackend::new(CloudflareConfig {
                api_token: api_token.clone(),
                zone_id: zone_id.clone(),
                domain,
                scheme: self.scheme,
                timeout: self.timeout,
            })?;
            return Ok(Arc::new(backend));
        }

        if let Some(nameserver) = &self.rfc2136_nameserver {
            let (key_name, key_secret) =
                match (&self.rfc2136_key_name, &self.rfc2136_key_secret) {
                    (Some(name), Some(secret)) => (name.clone(), secret.clone()),
                    _ => {
                        return Err(SyncError::Config(
                            "RFC2136_KEY_NAME and RFC2136_KEY_SECRET must both be set when \
                             using the RFC 2136 backend"
                                .to_string(),
                        ))
                    }
                };
            let domain = self.domain.clone().ok_or_else(|| {
                SyncError::Config(
                    "ROOT_DOMAIN must be set when using the RFC 2136 backend".to_string(),
                )
            })?;
            let nameserver = parse_nameserver(nameserver)?;

            info!(
                server = %nameserver,
                transport = %self.rfc2136_transport,
                domain = %domain,
                scheme = %self.scheme,
                "using RFC 2136 dynamic update backend"
            );
            let backend = Rfc2136Backend::new(Rfc2136Config {
                nameserver,
                transport: self.rfc2136_transport,
                key_name,
                key_secret,
                algorithm: self.rfc2136_key_algorithm,
                domain,
                scheme: self.scheme,
                timeout: self.timeout,
            })?;
            return Ok(Arc::new(backend));
        }

        warn!("BOLT12 is enabled but no DNS backend is configured — records will not be published");
        Ok(Arc::new(NoopBackend))
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Parse a nameserver address, defaulting to port 53 when only an IP is
/// given.
fn parse_nameserver(s: &str) -> Result<SocketAddr> {
    if let Ok(addr) = s.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = s.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, 53));
    }
    Err(SyncError::Config(format!(
        "RFC2136_NAMESERVER must be an IP address or IP:port, got \"{s}\""
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cloudflare_config() -> SyncConfig {
        SyncConfig {
            enabled: true,
            domain: Some("example.com".into()),
            cloudflare_api_token: Some("token".into()),
            cloudflare_zone_id: Some("zone123".into()),
            ..SyncConfig::default()
        }
    }

    fn rfc2136_config() -> SyncConfig {
        SyncConfig {
            enabled: true,
            domain: Some("example.com".into()),
            rfc2136_nameserver: Some("192.0.2.1".into()),
            rfc2136_key_name: Some("update-key".into()),
            rfc2136_key_secret: Some("c2VjcmV0LXNlY3JldC1zZWNyZXQ=".into()),
            ..SyncConfig::default()
        }
    }

    #[test]
    fn test_disabled_selects_noop() {
        let config = SyncConfig {
            enabled: false,
            ..cloudflare_config()
        };
        assert_eq!(config.select_backend().unwrap().name(), "noop");
    }

    #[test]
    fn test_unconfigured_selects_noop() {
        let config = SyncConfig {
            enabled: true,
            ..SyncConfig::default()
        };
        assert_eq!(config.select_backend().unwrap().name(), "noop");
    }

    #[test]
    fn test_cloudflare_selected_when_credentials_present() {
        assert_eq!(
            cloudflare_config().select_backend().unwrap().name(),
            "cloudflare"
        );
    }

    #[test]
    fn test_cloudflare_without_domain_fails_fast() {
        let config = SyncConfig {
            domain: None,
            ..cloudflare_config()
        };
        assert!(matches!(
            config.select_backend().unwrap_err(),
            SyncError::Config(_)
        ));
    }

    #[test]
    fn test_rfc2136_selected_when_nameserver_present() {
        assert_eq!(
            rfc2136_config().select_backend().unwrap().name(),
            "rfc2136"
        );
    }

    #[test]
    fn test_rfc2136_with_incomplete_key_fails_fast() {
        let config = SyncConfig {
            rfc2136_key_secret: None,
            ..rfc2136_config()
        };
        assert!(matches!(
            config.select_backend().unwrap_err(),
            SyncError::Config(_)
        ));
    }

    #[test]
    fn test_cloudflare_takes_precedence_over_rfc2136() {
        let config = SyncConfig {
            cloudflare_api_token: Some("token".into()),
            cloudflare_zone_id: Some("zone123".into()),
            ..rfc2136_config()
        };
        assert_eq!(config.select_backend().unwrap().name(), "cloudflare");
    }

    #[test]
    fn test_parse_nameserver_defaults_port() {
        assert_eq!(
            parse_nameserver("192.0.2.1").unwrap(),
            "192.0.2.1:53".parse().unwrap()
        );
        assert_eq!(
            parse_nameserver("192.0.2.1:5353").unwrap(),
            "192.0.2.1:5353".parse().unwrap()
        );
        assert!(parse_nameserver("ns1.example.com").is_err());
    }
}
