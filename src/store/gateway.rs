//! etcd v3 client over the JSON gateway (`/v3/...` HTTP endpoints).
//!
//! # Responsibilities
//! - Authenticate and attach the session token to every call
//! - Batched reads as a single `txn` of range requests
//! - Prefix watches decoded from the gateway's newline-delimited stream
//! - Map gateway errors onto `StoreError`

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use futures_util::stream::{self, Stream, StreamExt};
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::store::credentials::load_ca_bundle;
use crate::store::{
    ChangeEvent, ClientCredentials, EventKind, KeyValue, KvClient, KvSession, RangeResponse,
    StoreError, WatchEvent, WatchStream,
};

const GRPC_UNAUTHENTICATED: i64 = 16;
const GRPC_UNAVAILABLE: i64 = 14;

/// `KvClient` for a real etcd cluster.
#[derive(Debug, Clone)]
pub struct EtcdGatewayClient {
    request_timeout: Duration,
}

impl EtcdGatewayClient {
    /// `request_timeout` bounds every unary call; watches are unbounded.
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

#[async_trait]
impl KvClient for EtcdGatewayClient {
    async fn connect(
        &self,
        credentials: &ClientCredentials,
    ) -> Result<Box<dyn KvSession>, StoreError> {
        let base = credentials.endpoint_url()?;

        let mut builder = reqwest::Client::builder().connect_timeout(self.request_timeout);
        if let Some(path) = &credentials.ca_cert_path {
            for der in load_ca_bundle(path)? {
                let cert = reqwest::Certificate::from_der(&der)
                    .map_err(|e| StoreError::Connection(format!("invalid CA certificate: {}", e)))?;
                builder = builder.add_root_certificate(cert);
            }
        }
        let http = builder
            .build()
            .map_err(|e| StoreError::Connection(format!("cannot build HTTP client: {}", e)))?;

        let mut session = GatewaySession {
            http,
            base,
            token: None,
            request_timeout: self.request_timeout,
            closed: AtomicBool::new(false),
        };

        if let (Some(name), Some(password)) = (&credentials.username, &credentials.password) {
            let auth: AuthResponse = session
                .post("/v3/auth/authenticate", &json!({ "name": name, "password": password }))
                .await?;
            if auth.token.is_empty() {
                return Err(StoreError::Auth("gateway returned an empty token".into()));
            }
            session.token = Some(auth.token);
        }

        let status: StatusResponse = session.post("/v3/maintenance/status", &json!({})).await?;
        debug!(
            endpoint = %session.base,
            revision = status.header.revision,
            "Connected to etcd gateway"
        );
        Ok(Box::new(session))
    }
}

struct GatewaySession {
    http: reqwest::Client,
    base: Url,
    token: Option<String>,
    request_timeout: Duration,
    closed: AtomicBool,
}

impl GatewaySession {
    fn request(&self, path: &str) -> Result<reqwest::RequestBuilder, StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("session closed".into()));
        }
        let url = self
            .base
            .join(path)
            .map_err(|e| StoreError::Protocol(format!("bad gateway path {}: {}", path, e)))?;
        let mut request = self.http.post(url);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, token.as_str());
        }
        Ok(request)
    }

    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, StoreError> {
        let response = self
            .request(path)?
            .timeout(self.request_timeout)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(error_from_body(status, &body));
        }
        serde_json::from_slice(&body)
            .map_err(|e| StoreError::Protocol(format!("unexpected {} response: {}", path, e)))
    }
}

#[async_trait]
impl KvSession for GatewaySession {
    async fn get(&self, keys: &BTreeSet<String>) -> Result<RangeResponse, StoreError> {
        let ops: Vec<_> = keys
            .iter()
            .map(|key| json!({ "request_range": { "key": B64.encode(key) } }))
            .collect();
        let txn: TxnResponse = self.post("/v3/kv/txn", &json!({ "success": ops })).await?;
        txn_to_range(keys, txn)
    }

    async fn watch(&self, prefix: &str, start_revision: u64) -> Result<WatchStream, StoreError> {
        let body = json!({
            "create_request": {
                "key": B64.encode(prefix),
                "range_end": B64.encode(prefix_range_end(prefix.as_bytes())),
                "start_revision": start_revision.to_string(),
                "progress_notify": true,
            }
        });
        let response = self
            .request("/v3/watch")?
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.map_err(transport_error)?;
            return Err(error_from_body(status, &body));
        }

        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()));
        Ok(WatchDecoder::new(Box::pin(chunks)).into_stream())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

type ChunkStream = Pin<Box<dyn Stream<Item = reqwest::Result<Vec<u8>>> + Send>>;

/// Splits the gateway's watch body into messages and messages into events.
struct WatchDecoder {
    chunks: ChunkStream,
    buffer: Vec<u8>,
    pending: VecDeque<Result<WatchEvent, StoreError>>,
    done: bool,
}

impl WatchDecoder {
    fn new(chunks: ChunkStream) -> Self {
        Self {
            chunks,
            buffer: Vec::new(),
            pending: VecDeque::new(),
            done: false,
        }
    }

    fn into_stream(self) -> WatchStream {
        stream::unfold(self, |mut decoder| async move {
            loop {
                if let Some(item) = decoder.pending.pop_front() {
                    return Some((item, decoder));
                }
                if decoder.done {
                    return None;
                }
                match decoder.chunks.next().await {
                    Some(Ok(chunk)) => decoder.feed(&chunk),
                    Some(Err(e)) => {
                        decoder.done = true;
                        decoder.pending.push_back(Err(transport_error(e)));
                    }
                    None => {
                        decoder.done = true;
                        let rest = std::mem::take(&mut decoder.buffer);
                        decoder.decode_message(&rest);
                    }
                }
            }
        })
        .boxed()
    }

    fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.decode_message(&line);
            if self.done {
                return;
            }
        }
    }

    fn decode_message(&mut self, raw: &[u8]) {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return;
        }
        let message: WatchMessage = match serde_json::from_slice(raw) {
            Ok(message) => message,
            Err(e) => {
                self.fail(StoreError::Protocol(format!("undecodable watch message: {}", e)));
                return;
            }
        };

        if let Some(error) = message.error {
            self.fail(GatewayError::from_value(&error).into_store_error(None));
            return;
        }
        let Some(result) = message.result else {
            return;
        };
        if result.canceled {
            let reason = if result.compact_revision > 0 {
                format!("compacted at revision {}", result.compact_revision)
            } else {
                result.cancel_reason
            };
            self.fail(StoreError::Protocol(format!("watch canceled: {}", reason)));
            return;
        }
        if result.events.is_empty() {
            if !result.created {
                self.pending.push_back(Ok(WatchEvent::Progress {
                    revision: result.header.revision,
                }));
            }
            return;
        }
        for event in result.events {
            match event.into_change() {
                Ok(change) => self.pending.push_back(Ok(WatchEvent::Change(change))),
                Err(e) => {
                    self.fail(e);
                    return;
                }
            }
        }
    }

    fn fail(&mut self, error: StoreError) {
        warn!(error = %error, "Watch stream failed");
        self.pending.push_back(Err(error));
        self.done = true;
    }
}

/// Smallest key greater than every key starting with `prefix`.
fn prefix_range_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return end;
        }
    }
    vec![0]
}

fn txn_to_range(keys: &BTreeSet<String>, txn: TxnResponse) -> Result<RangeResponse, StoreError> {
    let mut entries: HashMap<String, Option<KeyValue>> =
        keys.iter().map(|k| (k.clone(), None)).collect();
    for op in txn.responses {
        let Some(range) = op.response_range else {
            continue;
        };
        for kv in range.kvs {
            let key = decode_text(&kv.key)?;
            let value = decode_text(&kv.value)?;
            if entries.contains_key(&key) {
                entries.insert(
                    key,
                    Some(KeyValue {
                        value,
                        mod_revision: kv.mod_revision,
                    }),
                );
            }
        }
    }
    Ok(RangeResponse {
        revision: txn.header.revision,
        entries,
    })
}

fn decode_text(encoded: &str) -> Result<String, StoreError> {
    let bytes = B64
        .decode(encoded)
        .map_err(|e| StoreError::Protocol(format!("invalid base64: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| StoreError::Protocol(format!("non-UTF-8 data: {}", e)))
}

fn transport_error(e: reqwest::Error) -> StoreError {
    StoreError::Connection(e.to_string())
}

fn error_from_body(status: StatusCode, body: &[u8]) -> StoreError {
    match serde_json::from_slice::<Value>(body) {
        Ok(value) => GatewayError::from_value(&value).into_store_error(Some(status)),
        Err(_) => classify(Some(status), None, &String::from_utf8_lossy(body)),
    }
}

fn classify(status: Option<StatusCode>, code: Option<i64>, message: &str) -> StoreError {
    let lowered = message.to_ascii_lowercase();
    let auth = status == Some(StatusCode::UNAUTHORIZED)
        || code == Some(GRPC_UNAUTHENTICATED)
        || lowered.contains("invalid auth token")
        || lowered.contains("authentication failed");
    if auth {
        return StoreError::Auth(message.to_string());
    }
    let unavailable = code == Some(GRPC_UNAVAILABLE)
        || status.is_some_and(|s| {
            [
                StatusCode::SERVICE_UNAVAILABLE,
                StatusCode::BAD_GATEWAY,
                StatusCode::GATEWAY_TIMEOUT,
            ]
            .contains(&s)
        });
    if unavailable {
        return StoreError::Connection(message.to_string());
    }
    StoreError::Protocol(match status {
        Some(status) => format!("{}: {}", status, message),
        None => message.to_string(),
    })
}

fn de_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Int64 {
        Text(String),
        Number(u64),
    }

    match Int64::deserialize(deserializer)? {
        Int64::Number(n) => Ok(n),
        Int64::Text(s) => s.parse().map_err(de::Error::custom),
    }
}

#[derive(Debug, Default, Deserialize)]
struct Header {
    #[serde(default, deserialize_with = "de_u64")]
    revision: u64,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    #[serde(default)]
    token: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    header: Header,
}

#[derive(Debug, Deserialize)]
struct TxnResponse {
    #[serde(default)]
    header: Header,
    #[serde(default)]
    responses: Vec<TxnOp>,
}

#[derive(Debug, Deserialize)]
struct TxnOp {
    response_range: Option<RangeOp>,
}

#[derive(Debug, Deserialize)]
struct RangeOp {
    #[serde(default)]
    kvs: Vec<RawKv>,
}

#[derive(Debug, Deserialize)]
struct RawKv {
    key: String,
    #[serde(default)]
    value: String,
    #[serde(default, deserialize_with = "de_u64")]
    mod_revision: u64,
}

#[derive(Debug, Deserialize)]
struct WatchMessage {
    result: Option<WatchResult>,
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WatchResult {
    #[serde(default)]
    header: Header,
    #[serde(default)]
    created: bool,
    #[serde(default)]
    canceled: bool,
    #[serde(default)]
    cancel_reason: String,
    #[serde(default, deserialize_with = "de_u64")]
    compact_revision: u64,
    #[serde(default)]
    events: Vec<RawEvent>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    /// Absent for PUT; the gateway omits zero-valued enums.
    #[serde(default, rename = "type")]
    kind: Option<String>,
    kv: RawKv,
}

impl RawEvent {
    fn into_change(self) -> Result<ChangeEvent, StoreError> {
        let key = decode_text(&self.kv.key)?;
        let kind = match self.kind.as_deref() {
            Some("DELETE") => EventKind::Delete,
            _ => EventKind::Put,
        };
        let value = match kind {
            EventKind::Put => Some(decode_text(&self.kv.value)?),
            EventKind::Delete => None,
        };
        Ok(ChangeEvent {
            key,
            value,
            kind,
            revision: self.kv.mod_revision,
        })
    }
}

/// Error body in either gateway shape: `{"error": {...}}` from streams or
/// `{"error": "...", "code": n, "message": "..."}` from unary calls.
#[derive(Debug, Default)]
struct GatewayError {
    code: Option<i64>,
    message: String,
}

impl GatewayError {
    fn from_value(value: &Value) -> Self {
        let body = match value.get("error") {
            Some(inner) if inner.is_object() => inner,
            _ => value,
        };
        let code = body
            .get("grpc_code")
            .or_else(|| body.get("code"))
            .and_then(Value::as_i64);
        let message = body
            .get("message")
            .or_else(|| body.get("error"))
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| value.to_string());
        Self { code, message }
    }

    fn into_store_error(self, status: Option<StatusCode>) -> StoreError {
        classify(status, self.code, &self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};

    fn b64(s: &str) -> String {
        B64.encode(s)
    }

    fn decoder_for(lines: &[&str]) -> WatchStream {
        let chunks: Vec<reqwest::Result<Vec<u8>>> = lines
            .iter()
            .map(|l| Ok(format!("{}\n", l).into_bytes()))
            .collect();
        WatchDecoder::new(Box::pin(stream::iter(chunks))).into_stream()
    }

    #[test]
    fn test_prefix_range_end() {
        assert_eq!(prefix_range_end(b"/a/"), b"/a0".to_vec());
        assert_eq!(prefix_range_end(&[b'a', 0xff]), b"b".to_vec());
        assert_eq!(prefix_range_end(&[0xff]), vec![0]);
    }

    #[test]
    fn test_classify() {
        assert!(classify(Some(StatusCode::UNAUTHORIZED), None, "nope").is_auth());
        assert!(classify(None, Some(16), "x").is_auth());
        assert!(classify(None, None, "etcdserver: invalid auth token").is_auth());
        assert!(matches!(
            classify(Some(StatusCode::SERVICE_UNAVAILABLE), None, "down"),
            StoreError::Connection(_)
        ));
        assert!(matches!(
            classify(Some(StatusCode::BAD_REQUEST), Some(3), "bad"),
            StoreError::Protocol(_)
        ));
    }

    #[test]
    fn test_txn_to_range_marks_missing_keys() {
        let keys: BTreeSet<String> = ["/app/a", "/app/b"].iter().map(|s| s.to_string()).collect();
        let txn: TxnResponse = serde_json::from_value(json!({
            "header": { "revision": "42" },
            "succeeded": true,
            "responses": [
                { "response_range": { "kvs": [
                    { "key": b64("/app/a"), "value": b64("on"), "mod_revision": "40" }
                ], "count": "1" } },
                { "response_range": { "header": { "revision": "42" } } }
            ]
        }))
        .unwrap();

        let range = txn_to_range(&keys, txn).unwrap();
        assert_eq!(range.revision, 42);
        assert_eq!(
            range.entries["/app/a"],
            Some(KeyValue {
                value: "on".into(),
                mod_revision: 40
            })
        );
        assert_eq!(range.entries["/app/b"], None);
    }

    #[tokio::test]
    async fn test_decoder_emits_changes_and_progress() {
        let put = json!({ "result": { "header": { "revision": "5" }, "events": [
            { "kv": { "key": b64("/app/a"), "value": b64("1"), "mod_revision": "5" } }
        ] } });
        let delete = json!({ "result": { "header": { "revision": "6" }, "events": [
            { "type": "DELETE", "kv": { "key": b64("/app/a"), "mod_revision": "6" } }
        ] } });
        let lines = [
            json!({ "result": { "header": { "revision": "4" }, "created": true } }).to_string(),
            put.to_string(),
            delete.to_string(),
            json!({ "result": { "header": { "revision": "9" } } }).to_string(),
        ];
        let lines: Vec<&str> = lines.iter().map(String::as_str).collect();
        let events: Vec<_> = decoder_for(&lines).collect().await;

        assert_eq!(
            events,
            vec![
                Ok(WatchEvent::Change(ChangeEvent::put("/app/a", "1", 5))),
                Ok(WatchEvent::Change(ChangeEvent::delete("/app/a", 6))),
                Ok(WatchEvent::Progress { revision: 9 }),
            ]
        );
    }

    #[tokio::test]
    async fn test_decoder_stops_on_error() {
        let lines = [
            json!({ "error": { "grpc_code": 16, "message": "invalid auth token" } }).to_string(),
            json!({ "result": { "header": { "revision": "9" } } }).to_string(),
        ];
        let lines: Vec<&str> = lines.iter().map(String::as_str).collect();
        let events: Vec<_> = decoder_for(&lines).collect().await;
        assert_eq!(events.len(), 1);
        assert!(events[0].as_ref().unwrap_err().is_auth());
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_connect_and_get_against_gateway() {
        let router = Router::new()
            .route(
                "/v3/maintenance/status",
                post(|| async { Json(json!({ "header": { "revision": "7" } })) }),
            )
            .route(
                "/v3/kv/txn",
                post(|Json(body): Json<Value>| async move {
                    let ops = body["success"].as_array().map(Vec::len).unwrap_or(0);
                    assert_eq!(ops, 2);
                    Json(json!({
                        "header": { "revision": "7" },
                        "responses": [
                            { "response_range": { "kvs": [
                                { "key": b64("/app/a"), "value": b64("3"), "mod_revision": "6" }
                            ] } },
                            { "response_range": {} }
                        ]
                    }))
                }),
            );
        let endpoint = serve(router).await;

        let client = EtcdGatewayClient::new(Duration::from_secs(2));
        let session = client
            .connect(&ClientCredentials::new(endpoint))
            .await
            .ok()
            .unwrap();
        let keys: BTreeSet<String> = ["/app/a", "/app/b"].iter().map(|s| s.to_string()).collect();
        let range = session.get(&keys).await.unwrap();
        assert_eq!(range.revision, 7);
        assert_eq!(range.entries["/app/a"].as_ref().unwrap().value, "3");
        assert!(range.entries["/app/b"].is_none());

        session.close().await;
        assert!(session.get(&keys).await.is_err());
    }

    #[tokio::test]
    async fn test_rejected_login_is_auth_error() {
        let router = Router::new().route(
            "/v3/auth/authenticate",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": "etcdserver: authentication failed, invalid user ID or password",
                        "code": 3,
                        "message": "etcdserver: authentication failed, invalid user ID or password"
                    })),
                )
            }),
        );
        let endpoint = serve(router).await;

        let client = EtcdGatewayClient::new(Duration::from_secs(2));
        let creds = ClientCredentials::new(endpoint).with_user("root", "wrong");
        let err = client.connect(&creds).await.err().unwrap();
        assert!(err.is_auth());
    }
}
