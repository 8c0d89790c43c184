// Copyright 2025
// Licensed under the Elastic License v2.0

//! VoltDB JSON HTTP interface
//!
//! Every call is a form POST to `http://<node>:<port>/api/1.0/` carrying the
//! procedure name and its positional parameters as a JSON array:
//!
//! ```text
//! Procedure=AddRow&Parameters=[1,"a",1]&User=..&Password=..
//! ```
//!
//! The node answers with a JSON document whose `status` field uses the same
//! codes as [`ResponseStatus`]. Table inserts go through the table's default
//! `<TABLE>.insert` procedure, one call per row, with at most
//! `max_concurrent_inserts` calls of a batch in flight at a time.
//!
//! Calls are spread round-robin over the nodes that connected successfully.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Notify;
use tracing::{debug, info};
use url::Url;

use crate::cluster::Endpoint;
use crate::core::{ClientResponse, CoreError, CoreResult, Destination, ResponseStatus, Value};

/// Default port of the HTTP interface
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default number of per-row insert calls a batch runs at once
pub const DEFAULT_MAX_CONCURRENT_INSERTS: usize = 16;

const PING_PROCEDURE: &str = "@Ping";

#[derive(Clone)]
pub struct HttpDestinationConfig {
    pub default_port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub request_timeout: Duration,
    pub max_concurrent_inserts: usize,
}

impl Default for HttpDestinationConfig {
    fn default() -> Self {
        Self {
            default_port: DEFAULT_HTTP_PORT,
            user: None,
            password: None,
            request_timeout: Duration::from_secs(30),
            max_concurrent_inserts: DEFAULT_MAX_CONCURRENT_INSERTS,
        }
    }
}

impl std::fmt::Debug for HttpDestinationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDestinationConfig")
            .field("default_port", &self.default_port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("request_timeout", &self.request_timeout)
            .field("max_concurrent_inserts", &self.max_concurrent_inserts)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: i64,
    #[serde(default)]
    statusstring: Option<String>,
}

impl ApiResponse {
    fn into_client_response(self) -> ClientResponse {
        ClientResponse {
            status: ResponseStatus::from_code(self.status),
            status_string: self.statusstring,
        }
    }
}

/// Build the API URL for one node
pub fn api_url(endpoint: &Endpoint, default_port: u16) -> CoreResult<Url> {
    Url::parse(&format!(
        "http://{}:{}/api/1.0/",
        endpoint.host,
        endpoint.port_or(default_port)
    ))
    .map_err(|e| CoreError::config_error(format!("Invalid server address '{}': {}", endpoint, e)))
}

/// Encode positional parameters as the JSON array the API expects
pub fn encode_parameters(params: &[Value]) -> String {
    serde_json::Value::Array(params.iter().map(Value::to_json).collect()).to_string()
}

/// Decrements the in-flight count when a call finishes, however it finishes.
struct InFlightGuard<'a> {
    count: &'a AtomicUsize,
    idle: &'a Notify,
}

impl<'a> InFlightGuard<'a> {
    fn enter(count: &'a AtomicUsize, idle: &'a Notify) -> Self {
        count.fetch_add(1, Ordering::AcqRel);
        Self { count, idle }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

pub struct HttpDestination {
    http: Client,
    config: HttpDestinationConfig,
    nodes: RwLock<Vec<Url>>,
    next_node: AtomicUsize,
    in_flight: AtomicUsize,
    idle: Notify,
}

impl HttpDestination {
    pub fn new(config: HttpDestinationConfig) -> CoreResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| CoreError::connection_error_with_cause("Failed to create HTTP client", e))?;

        Ok(Self {
            http,
            config,
            nodes: RwLock::new(Vec::new()),
            next_node: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            idle: Notify::new(),
        })
    }

    pub fn connected_nodes(&self) -> usize {
        self.nodes.read().len()
    }

    fn pick_node(&self) -> CoreResult<Url> {
        let nodes = self.nodes.read();
        if nodes.is_empty() {
            return Err(CoreError::connection_error("No connected VoltDB nodes"));
        }
        let i = self.next_node.fetch_add(1, Ordering::Relaxed) % nodes.len();
        Ok(nodes[i].clone())
    }

    async fn invoke(&self, url: Url, procedure: &str, params: &[Value]) -> CoreResult<ClientResponse> {
        let _guard = InFlightGuard::enter(&self.in_flight, &self.idle);

        let parameters = encode_parameters(params);
        let mut form: Vec<(&str, &str)> = vec![("Procedure", procedure), ("Parameters", &parameters)];
        if let Some(user) = &self.config.user {
            form.push(("User", user));
        }
        if let Some(password) = &self.config.password {
            form.push(("Password", password));
        }

        let response = self
            .http
            .post(url)
            .form(&form)
            .send()
            .await
            .map_err(|e| CoreError::delivery_error_with_cause(format!("Call to {} failed", procedure), e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CoreError::delivery_error_with_cause("Failed to read response body", e))?;

        if !status.is_success() {
            return Err(CoreError::delivery_error(format!(
                "Call to {} failed ({}): {}",
                procedure, status, body
            )));
        }

        let parsed: ApiResponse = serde_json::from_str(&body).map_err(|e| {
            CoreError::delivery_error_with_cause(format!("Malformed response to {}", procedure), e)
        })?;
        Ok(parsed.into_client_response())
    }
}

#[async_trait]
impl Destination for HttpDestination {
    fn name(&self) -> &'static str {
        "voltdb-http"
    }

    async fn connect(&self, endpoint: &Endpoint) -> CoreResult<()> {
        let url = api_url(endpoint, self.config.default_port)?;

        let response = self
            .invoke(url.clone(), PING_PROCEDURE, &[])
            .await
            .map_err(|e| CoreError::connection_error_with_cause(format!("{} unreachable", endpoint), e))?;

        if !response.is_success() {
            return Err(CoreError::connection_error(format!(
                "{} rejected connection: {}",
                endpoint,
                response.status_string.as_deref().unwrap_or("no detail")
            )));
        }

        let mut nodes = self.nodes.write();
        if !nodes.contains(&url) {
            nodes.push(url);
        }
        Ok(())
    }

    async fn call_procedure(&self, procedure: &str, params: &[Value]) -> CoreResult<ClientResponse> {
        let url = self.pick_node()?;
        self.invoke(url, procedure, params).await
    }

    async fn insert_rows(&self, table: &str, rows: &[Vec<Value>]) -> CoreResult<Vec<ClientResponse>> {
        let procedure = format!("{}.insert", table.to_uppercase());
        debug!("Inserting {} row(s) via {}", rows.len(), procedure);

        let calls = rows.iter().map(|row| {
            let procedure = procedure.as_str();
            async move {
                let url = self.pick_node()?;
                self.invoke(url, procedure, row).await
            }
        }).collect::<Vec<_>>();

        // `buffered` keeps responses in row order
        Ok(stream::iter(calls)
            .buffered(self.config.max_concurrent_inserts.max(1))
            .map(|result| {
                result.unwrap_or_else(|e| {
                    ClientResponse::failure(ResponseStatus::ConnectionLost, e.to_string())
                })
            })
            .collect::<Vec<_>>()
            .await)
    }

    async fn drain(&self) -> CoreResult<()> {
        loop {
            let idle = self.idle.notified();
            if self.in_flight.load(Ordering::Acquire) == 0 {
                break;
            }
            idle.await;
        }
        info!("Drained {} connection(s)", self.connected_nodes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering::SeqCst;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::Instant;

    #[derive(Default)]
    struct ServerStats {
        active: AtomicUsize,
        peak: AtomicUsize,
        completed: AtomicUsize,
    }

    /// Minimal VoltDB HTTP node: answers every call with success after
    /// `delay`. Pings are answered at once and not counted.
    async fn start_node(delay: Duration) -> (Endpoint, Arc<ServerStats>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let stats = Arc::new(ServerStats::default());
        let shared = Arc::clone(&stats);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let stats = Arc::clone(&shared);
                tokio::spawn(async move { serve_call(socket, delay, &stats).await });
            }
        });
        let endpoint = Endpoint {
            host: "127.0.0.1".into(),
            port: Some(port),
        };
        (endpoint, stats)
    }

    async fn serve_call(mut socket: TcpStream, delay: Duration, stats: &ServerStats) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let body_start = loop {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let headers = String::from_utf8_lossy(&buf[..body_start]).to_lowercase();
        let content_length = headers
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while buf.len() < body_start + content_length {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        let body = String::from_utf8_lossy(&buf[body_start..]).to_string();
        if !body.contains("%40Ping") {
            let now = stats.active.fetch_add(1, SeqCst) + 1;
            stats.peak.fetch_max(now, SeqCst);
            tokio::time::sleep(delay).await;
            stats.active.fetch_sub(1, SeqCst);
            stats.completed.fetch_add(1, SeqCst);
        }

        let payload = r#"{"status":1,"results":[]}"#;
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            payload.len(),
            payload
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
    }

    #[test]
    fn test_api_url() {
        let with_port = Endpoint::parse("volt1:9090").unwrap();
        assert_eq!(
            api_url(&with_port, DEFAULT_HTTP_PORT).unwrap().as_str(),
            "http://volt1:9090/api/1.0/"
        );

        let bare = Endpoint::parse("volt2").unwrap();
        assert_eq!(
            api_url(&bare, DEFAULT_HTTP_PORT).unwrap().as_str(),
            "http://volt2:8080/api/1.0/"
        );
    }

    #[test]
    fn test_encode_parameters() {
        let params = vec![
            Value::Int64(1),
            Value::String("a\"b".into()),
            Value::Null,
            Value::Float64(2.5),
            Value::Timestamp(1_700_000_000_000_000),
            Value::Unsupported,
        ];
        assert_eq!(
            encode_parameters(&params),
            r#"[1,"a\"b",null,2.5,1700000000000000,null]"#
        );
        assert_eq!(encode_parameters(&[]), "[]");
    }

    #[test]
    fn test_response_status_mapping() {
        let ok: ApiResponse = serde_json::from_str(r#"{"status":1,"results":[]}"#).unwrap();
        assert!(ok.into_client_response().is_success());

        let aborted: ApiResponse =
            serde_json::from_str(r#"{"status":-2,"statusstring":"constraint violation"}"#).unwrap();
        let response = aborted.into_client_response();
        assert_eq!(response.status, ResponseStatus::GracefulFailure);
        assert_eq!(response.status_string.as_deref(), Some("constraint violation"));

        let odd: ApiResponse = serde_json::from_str(r#"{"status":-42}"#).unwrap();
        assert_eq!(odd.into_client_response().status, ResponseStatus::ResponseUnknown);
    }

    #[test]
    fn test_config_debug_redacts_password() {
        let config = HttpDestinationConfig {
            password: Some("secret".into()),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn test_calls_fail_before_connect() {
        let destination = HttpDestination::new(HttpDestinationConfig::default()).unwrap();
        assert_eq!(destination.connected_nodes(), 0);
        assert!(destination.call_procedure("AddRow", &[Value::Int64(1)]).await.is_err());

        let responses = destination
            .insert_rows("events", &[vec![Value::Int64(1)], vec![Value::Int64(2)]])
            .await
            .unwrap();
        assert_eq!(responses.len(), 2);
        assert!(responses.iter().all(|r| r.status == ResponseStatus::ConnectionLost));

        destination.drain().await.unwrap();
    }

    #[test]
    fn test_api_url_ipv6() {
        let endpoint = Endpoint::parse("[::1]:21212").unwrap();
        assert_eq!(
            api_url(&endpoint, DEFAULT_HTTP_PORT).unwrap().as_str(),
            "http://[::1]:21212/api/1.0/"
        );
    }

    #[tokio::test]
    async fn test_insert_fan_out_is_bounded() {
        let (endpoint, stats) = start_node(Duration::from_millis(50)).await;
        let destination = HttpDestination::new(HttpDestinationConfig {
            max_concurrent_inserts: 2,
            ..Default::default()
        })
        .unwrap();
        destination.connect(&endpoint).await.unwrap();

        let rows: Vec<Vec<Value>> = (0..8).map(|i| vec![Value::Int64(i)]).collect();
        let responses = destination.insert_rows("events", &rows).await.unwrap();

        assert_eq!(responses.len(), 8);
        assert!(responses.iter().all(ClientResponse::is_success));
        assert_eq!(stats.completed.load(SeqCst), 8);
        let peak = stats.peak.load(SeqCst);
        assert!((1..=2).contains(&peak), "peak concurrency {}", peak);
    }

    #[tokio::test]
    async fn test_drain_waits_for_in_flight_call() {
        let (endpoint, stats) = start_node(Duration::from_millis(300)).await;
        let destination = Arc::new(HttpDestination::new(HttpDestinationConfig::default()).unwrap());
        destination.connect(&endpoint).await.unwrap();

        let caller = Arc::clone(&destination);
        let call = tokio::spawn(async move { caller.call_procedure("SlowInsert", &[Value::Int64(1)]).await });

        tokio::time::timeout(Duration::from_secs(5), async {
            while stats.active.load(SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let started = Instant::now();
        destination.drain().await.unwrap();

        assert_eq!(stats.completed.load(SeqCst), 1);
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(call.await.unwrap().unwrap().is_success());
    }
}
