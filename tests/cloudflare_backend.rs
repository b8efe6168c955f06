//! Integration tests for the Cloudflare backend against an in-process mock
//! of the zone-scoped v4 API.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, put};
use axum::{Json, Router};
use bip353_sync::{CloudflareBackend, CloudflareConfig, DnsBackend, NamingScheme, RECORD_TTL};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const API_TOKEN: &str = "test-token";

#[derive(Debug, Clone)]
struct StoredRecord {
    id: String,
    rtype: String,
    name: String,
    content: String,
    ttl: u32,
}

impl StoredRecord {
    fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "type": self.rtype,
            "name": self.name,
            "content": self.content,
            "ttl": self.ttl,
        })
    }
}

#[derive(Clone, Default)]
struct MockZone {
    records: Arc<Mutex<Vec<StoredRecord>>>,
}

#[derive(Deserialize)]
struct WriteBody {
    #[serde(rename = "type")]
    rtype: String,
    name: String,
    content: String,
    ttl: u32,
}

fn ok(result: Value) -> Json<Value> {
    Json(json!({ "success": true, "errors": [], "result": result }))
}

fn auth_error() -> Json<Value> {
    Json(json!({
        "success": false,
        "errors": [{ "code": 10000, "message": "Authentication error" }],
        "result": null,
    }))
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {API_TOKEN}"))
        .unwrap_or(false)
}

async fn list_records(
    State(zone): State<MockZone>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    if !authorized(&headers) {
        return auth_error();
    }
    let records = zone.records.lock().await;
    let matches: Vec<Value> = records
        .iter()
        .filter(|r| params.get("type").map(|t| &r.rtype == t).unwrap_or(true))
        .filter(|r| params.get("name").map(|n| &r.name == n).unwrap_or(true))
        .map(StoredRecord::to_json)
        .collect();
    ok(Value::Array(matches))
}

async fn create_record(
    State(zone): State<MockZone>,
    headers: HeaderMap,
    Json(body): Json<WriteBody>,
) -> Json<Value> {
    if !authorized(&headers) {
        return auth_error();
    }
    let record = StoredRecord {
        id: uuid::Uuid::new_v4().simple().to_string(),
        rtype: body.rtype,
        name: body.name,
        content: body.content,
        ttl: body.ttl,
    };
    let response = ok(record.to_json());
    zone.records.lock().await.push(record);
    response
}

async fn update_record(
    State(zone): State<MockZone>,
    Path((_zone_id, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<WriteBody>,
) -> Json<Value> {
    if !authorized(&headers) {
        return auth_error();
    }
    let mut records = zone.records.lock().await;
    match records.iter_mut().find(|r| r.id == id) {
        Some(record) => {
            record.content = body.content;
            record.ttl = body.ttl;
            ok(record.to_json())
        }
        None => Json(json!({
            "success": false,
            "errors": [{ "code": 81044, "message": "Record does not exist" }],
            "result": null,
        })),
    }
}

async fn delete_record(
    State(zone): State<MockZone>,
    Path((_zone_id, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Json<Value> {
    if !authorized(&headers) {
        return auth_error();
    }
    zone.records.lock().await.retain(|r| r.id != id);
    ok(json!({ "id": id }))
}

/// Bind the mock API on an ephemeral port and return its base URL.
async fn start_mock(zone: MockZone) -> String {
    let app = Router::new()
        .route(
            "/zones/{zone_id}/dns_records",
            get(list_records).post(create_record),
        )
        .route(
            "/zones/{zone_id}/dns_records/{id}",
            put(update_record).delete(delete_record),
        )
        .with_state(zone);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn backend(api_base: &str, token: &str, scheme: NamingScheme) -> CloudflareBackend {
    CloudflareBackend::new(CloudflareConfig {
        api_token: token.to_string(),
        zone_id: "zone123".to_string(),
        domain: "example.com".to_string(),
        scheme,
        timeout: Duration::from_secs(5),
    })
    .unwrap()
    .with_api_base(api_base)
}

#[tokio::test]
async fn publish_creates_a_single_record() {
    let zone = MockZone::default();
    let api_base = start_mock(zone.clone()).await;
    let dns = backend(&api_base, API_TOKEN, NamingScheme::BitcoinPayment);

    let ttl = dns.publish("alice", "lno1abc").await.unwrap();
    assert_eq!(ttl, RECORD_TTL);

    let records = zone.records.lock().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].rtype, "TXT");
    assert_eq!(records[0].name, "alice.user._bitcoin-payment.example.com");
    assert_eq!(records[0].content, "bitcoin:?lno=lno1abc");
    assert_eq!(records[0].ttl, RECORD_TTL);
}

#[tokio::test]
async fn publish_uses_the_configured_scheme() {
    let zone = MockZone::default();
    let api_base = start_mock(zone.clone()).await;
    let dns = backend(&api_base, API_TOKEN, NamingScheme::Bip353);

    dns.publish("alice", "lno1abc").await.unwrap();

    let records = zone.records.lock().await;
    assert_eq!(records[0].name, "_bip353.alice.example.com");
    assert_eq!(records[0].content, "lno1abc");
}

#[tokio::test]
async fn second_publish_updates_in_place() {
    let zone = MockZone::default();
    let api_base = start_mock(zone.clone()).await;
    let dns = backend(&api_base, API_TOKEN, NamingScheme::BitcoinPayment);

    dns.publish("alice", "lno1abc").await.unwrap();
    dns.publish("alice", "lno1xyz").await.unwrap();

    let records = zone.records.lock().await;
    assert_eq!(records.len(), 1, "upsert must not duplicate the record");
    assert_eq!(records[0].content, "bitcoin:?lno=lno1xyz");
}

#[tokio::test]
async fn retract_removes_and_is_idempotent() {
    let zone = MockZone::default();
    let api_base = start_mock(zone.clone()).await;
    let dns = backend(&api_base, API_TOKEN, NamingScheme::BitcoinPayment);

    dns.publish("alice", "lno1abc").await.unwrap();
    dns.retract("alice").await.unwrap();
    assert!(zone.records.lock().await.is_empty());

    // A second retract still succeeds — the record's absence is not an
    // error.
    dns.retract("alice").await.unwrap();
}

#[tokio::test]
async fn retract_ignores_other_usernames() {
    let zone = MockZone::default();
    let api_base = start_mock(zone.clone()).await;
    let dns = backend(&api_base, API_TOKEN, NamingScheme::BitcoinPayment);

    dns.publish("alice", "lno1abc").await.unwrap();
    dns.publish("bob", "lno1bob").await.unwrap();
    dns.retract("alice").await.unwrap();

    let records = zone.records.lock().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "bob.user._bitcoin-payment.example.com");
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_publishes_converge_to_one_record() {
    let zone = MockZone::default();
    let api_base = start_mock(zone.clone()).await;
    let dns = Arc::new(backend(&api_base, API_TOKEN, NamingScheme::BitcoinPayment));

    let mut handles = Vec::new();
    for i in 0..8 {
        let dns = dns.clone();
        handles.push(tokio::spawn(async move {
            dns.publish("alice", &format!("lno1payload{i}")).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let records = zone.records.lock().await;
    assert_eq!(
        records.len(),
        1,
        "concurrent publishes for one username must not duplicate records"
    );
    assert!(records[0].content.starts_with("bitcoin:?lno=lno1payload"));
}

#[tokio::test]
async fn provider_error_names_operation_and_record() {
    let zone = MockZone::default();
    let api_base = start_mock(zone.clone()).await;
    let dns = backend(&api_base, "wrong-token", NamingScheme::BitcoinPayment);

    let err = dns.publish("alice", "lno1abc").await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("publish"), "got: {message}");
    assert!(
        message.contains("alice.user._bitcoin-payment.example.com"),
        "got: {message}"
    );
    assert!(zone.records.lock().await.is_empty());
}
