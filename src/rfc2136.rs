//! RFC 2136 dynamic-update backend — TSIG-signed atomic updates against an
//! authoritative nameserver.
//!
//! Unlike the REST backend there is no list-then-act sequence: a publish is
//! one signed UPDATE transaction that deletes the existing RRset and adds
//! the replacement record, and a retract is one delete-RRset transaction.
//! The server applies each transaction atomically, so no client-side
//! serialization is needed.

use crate::backend::DnsBackend;
use crate::error::{Result, SyncError};
use crate::record::{NamingScheme, RECORD_TTL};
use anyhow::Context;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hickory_client::client::{Client, SyncClient};
use hickory_client::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_client::rr::rdata::tsig::TsigAlgorithm;
use hickory_client::rr::rdata::TXT;
use hickory_client::rr::{DNSClass, Name, RData, Record, RecordType};
use hickory_client::tcp::TcpClientConnection;
use hickory_client::udp::UdpClientConnection;
use hickory_proto::rr::dnssec::tsig::TSigner;
use hickory_proto::xfer::{DnsRequest, DnsRequestOptions, DnsResponse};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Allowed clock skew on TSIG signatures, in seconds.
const TSIG_FUDGE_SECS: u16 = 300;

/// Transport used for update messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Udp,
    Tcp,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "udp" => Some(Self::Udp),
            "tcp" => Some(Self::Tcp),
            _ => None,
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HMAC algorithm of the TSIG key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    HmacSha256,
    HmacSha384,
    HmacSha512,
}

impl KeyAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HmacSha256 => "hmac-sha256",
            Self::HmacSha384 => "hmac-sha384",
            Self::HmacSha512 => "hmac-sha512",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "hmac-sha256" => Some(Self::HmacSha256),
            "hmac-sha384" => Some(Self::HmacSha384),
            "hmac-sha512" => Some(Self::HmacSha512),
            _ => None,
        }
    }

    fn to_tsig(self) -> TsigAlgorithm {
        match self {
            Self::HmacSha256 => TsigAlgorithm::HmacSha256,
            Self::HmacSha384 => TsigAlgorithm::HmacSha384,
            Self::HmacSha512 => TsigAlgorithm::HmacSha512,
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable connection state for the dynamic-update backend.
#[derive(Debug, Clone)]
pub struct Rfc2136Config {
    /// Nameserver accepting signed updates, with port.
    pub nameserver: SocketAddr,
    /// Transport for update messages.
    pub transport: Transport,
    /// TSIG key name.
    pub key_name: String,
    /// TSIG shared secret, base64-encoded.
    pub key_secret: String,
    /// HMAC algorithm of the key.
    pub algorithm: KeyAlgorithm,
    /// Domain (and zone) the record names are computed under.
    pub domain: String,
    /// Naming scheme for record names and content.
    pub scheme: NamingScheme,
    /// Deadline applied to every update round trip.
    pub timeout: Duration,
}

/// DNS backend sending TSIG-signed RFC 2136 updates.
#[derive(Debug)]
pub struct Rfc2136Backend {
    nameserver: SocketAddr,
    transport: Transport,
    key_name: Name,
    key_bytes: Vec<u8>,
    algorithm: KeyAlgorithm,
    zone: Name,
    domain: String,
    scheme: NamingScheme,
    timeout: Duration,
}

impl Rfc2136Backend {
    pub fn new(config: Rfc2136Config) -> Result<Self> {
        let key_bytes = BASE64
            .decode(&config.key_secret)
            .map_err(|e| SyncError::Config(format!("TSIG secret is not valid base64: {e}")))?;

        let key_name = Name::from_str(&config.key_name)
            .map_err(|e| SyncError::Config(format!("invalid TSIG key name: {e}")))?;

        let domain = config.domain.trim_end_matches('.').to_string();
        let zone = Name::from_str(&format!("{domain}."))
            .map_err(|e| SyncError::Config(format!("invalid zone name: {e}")))?;

        // Fail fast on unusable key material.
        TSigner::new(
            key_bytes.clone(),
            config.algorithm.to_tsig(),
            key_name.clone(),
            TSIG_FUDGE_SECS,
        )
        .map_err(|e| SyncError::Config(format!("invalid TSIG key: {e}")))?;

        Ok(Self {
            nameserver: config.nameserver,
            transport: config.transport,
            key_name,
            key_bytes,
            algorithm: config.algorithm,
            zone,
            domain,
            scheme: config.scheme,
            timeout: config.timeout,
        })
    }

    fn record_fqdn(&self, record: &str) -> anyhow::Result<Name> {
        Name::from_str(&format!("{record}."))
            .with_context(|| format!("invalid record name: {record}"))
    }

    /// Send one signed update transaction and check the response code.
    ///
    /// hickory's sync client does the round trip, so the exchange runs on
    /// the blocking pool; the connection-level timeout bounds it.
    async fn exchange(&self, message: Message, op: &'static str, record: &str) -> Result<()> {
        let nameserver = self.nameserver;
        let transport = self.transport;
        let timeout = self.timeout;
        let key_bytes = self.key_bytes.clone();
        let key_name = self.key_name.clone();
        let algorithm = self.algorithm;

        let response = tokio::task::spawn_blocking(move || -> anyhow::Result<DnsResponse> {
            let signer = TSigner::new(key_bytes, algorithm.to_tsig(), key_name, TSIG_FUDGE_SECS)
                .context("failed to build TSIG signer")?;
            let request = DnsRequest::new(message, DnsRequestOptions::default());

            let response = match transport {
                Transport::Udp => {
                    let conn = UdpClientConnection::with_timeout(nameserver, timeout)
                        .context("failed to open UDP connection")?;
                    let client = SyncClient::with_tsigner(conn, signer);
                    client
                        .send(request)
                        .into_iter()
                        .next()
                        .context("no response from nameserver")??
                }
                Transport::Tcp => {
                    let conn = TcpClientConnection::with_timeout(nameserver, timeout)
                        .context("failed to open TCP connection")?;
                    let client = SyncClient::with_tsigner(conn, signer);
                    client
                        .send(request)
                        .into_iter()
                        .next()
                        .context("no response from nameserver")??
                }
            };
            Ok(response)
        })
        .await
        .map_err(|e| SyncError::provider(op, record, anyhow::anyhow!("update task failed: {e}")))?
        .map_err(|e| SyncError::provider(op, record, e))?;

        match response.response_code() {
            ResponseCode::NoError => Ok(()),
            code => Err(SyncError::provider(
                op,
                record,
                anyhow::anyhow!("nameserver refused update: {code:?}"),
            )),
        }
    }
}

#[async_trait]
impl DnsBackend for Rfc2136Backend {
    fn name(&self) -> &'static str {
        "rfc2136"
    }

    async fn publish(&self, username: &str, offer: &str) -> Result<u32> {
        let record = self.scheme.record_name(username, &self.domain);
        let content = self.scheme.record_content(offer);

        let name = self
            .record_fqdn(&record)
            .map_err(|e| SyncError::provider("publish", &record, e))?;

        let message = update_message(
            &self.zone,
            vec![delete_rrset_record(&name), txt_record(&name, &content)],
        );

        debug!(
            record = %record,
            server = %self.nameserver,
            transport = %self.transport,
            "sending signed RRset replace"
        );
        self.exchange(message, "publish", &record).await?;

        info!(record = %record, "TXT record published");
        Ok(RECORD_TTL)
    }

    async fn retract(&self, username: &str) -> Result<()> {
        let record = self.scheme.record_name(username, &self.domain);

        let name = self
            .record_fqdn(&record)
            .map_err(|e| SyncError::provider("retract", &record, e))?;

        // Deleting an absent RRset is NOERROR on the server side, so
        // retraction is idempotent with no lookup.
        let message = update_message(&self.zone, vec![delete_rrset_record(&name)]);

        debug!(
            record = %record,
            server = %self.nameserver,
            transport = %self.transport,
            "sending signed RRset delete"
        );
        self.exchange(message, "retract", &record).await?;

        info!(record = %record, "TXT record removed");
        Ok(())
    }
}

/// Build an UPDATE message for `zone` carrying `updates` in order.
fn update_message(zone: &Name, updates: Vec<Record>) -> Message {
    let mut message = Message::new();
    message
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Update)
        .set_recursion_desired(false);
    // The zone section of an UPDATE is carried in the query section.
    message.add_query(Query::query(zone.clone(), RecordType::SOA));
    for update in updates {
        message.add_name_server(update);
    }
    message
}

/// Delete-RRset entry: class ANY, TTL 0, empty RDATA (RFC 2136 §2.5.2).
fn delete_rrset_record(name: &Name) -> Record {
    let mut record = Record::from_rdata(name.clone(), 0, RData::TXT(TXT::new(Vec::new())));
    record.set_dns_class(DNSClass::ANY);
    record
}

/// The replacement TXT record.
fn txt_record(name: &Name, content: &str) -> Record {
    let mut record = Record::from_rdata(
        name.clone(),
        RECORD_TTL,
        RData::TXT(TXT::new(chunk_txt(content))),
    );
    record.set_dns_class(DNSClass::IN);
    record
}

/// Split content longer than 255 octets into consecutive character-strings,
/// which resolvers concatenate. Offers are bech32 ASCII, so byte boundaries
/// are character boundaries.
fn chunk_txt(content: &str) -> Vec<String> {
    content
        .as_bytes()
        .chunks(255)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect()
}
