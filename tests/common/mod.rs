//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use stream_relay::audit::{AuditError, AuditPipeline, AuditRecord, AuditSink, AuditStore};
use stream_relay::config::{RelayConfig, RouteConfig, StreamKind};
use stream_relay::{GatewayServer, RelayEngine, Shutdown};

pub const API_KEY: &str = "test-key";

/// A raw TCP upstream that records every request it receives.
pub struct MockUpstream {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockUpstream {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Requests received so far, head and body as text.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

async fn read_request(socket: &mut TcpStream) -> io::Result<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(end) = find(&buf, b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).into_owned();
            let total = end + 4 + content_length(&head);
            while buf.len() < total {
                let n = socket.read(&mut chunk).await?;
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            return Ok(String::from_utf8_lossy(&buf).into_owned());
        }
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(String::from_utf8_lossy(&buf).into_owned());
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Start a mock upstream; `reply` writes the response on each accepted socket.
pub async fn spawn_upstream<F, Fut>(reply: F) -> MockUpstream
where
    F: Fn(TcpStream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let reply = Arc::new(reply);

    let seen = Arc::clone(&requests);
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let reply = Arc::clone(&reply);
            let seen = Arc::clone(&seen);
            tokio::spawn(async move {
                if let Ok(request) = read_request(&mut socket).await {
                    seen.lock().unwrap().push(request);
                    reply(socket).await;
                }
            });
        }
    });

    MockUpstream { addr, requests }
}

/// Upstream answering every request with the same bytes, then closing.
pub async fn fixed_upstream(response: Vec<u8>) -> MockUpstream {
    let response = Arc::new(response);
    spawn_upstream(move |mut socket| {
        let response = Arc::clone(&response);
        async move {
            let _ = socket.write_all(&response).await;
            let _ = socket.shutdown().await;
        }
    })
    .await
}

/// Upstream that waits `delay` after reading the request, then answers with `response`.
pub async fn delayed_upstream(delay: Duration, response: Vec<u8>) -> MockUpstream {
    let response = Arc::new(response);
    spawn_upstream(move |mut socket| {
        let response = Arc::clone(&response);
        async move {
            tokio::time::sleep(delay).await;
            let _ = socket.write_all(&response).await;
            let _ = socket.shutdown().await;
        }
    })
    .await
}

/// Upstream streaming `data: tick` every `interval`, up to `count` lines.
pub async fn ticking_upstream(interval: Duration, count: usize) -> MockUpstream {
    spawn_upstream(move |mut socket| async move {
        let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n";
        if socket.write_all(head.as_bytes()).await.is_err() {
            return;
        }
        for _ in 0..count {
            if socket.write_all(b"data: tick\n").await.is_err() {
                return;
            }
            tokio::time::sleep(interval).await;
        }
        let _ = socket.shutdown().await;
    })
    .await
}

/// Close-delimited event-stream response.
pub fn sse_response(body: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n{body}"
    )
    .into_bytes()
}

/// Length-delimited response.
pub fn response(status_line: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "HTTP/1.1 {status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    out.extend_from_slice(body);
    out
}

/// An address nothing listens on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Audit sink keeping every record in memory.
#[derive(Default)]
pub struct RecordingAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl RecordingAuditSink {
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Wait until at least `count` records arrived.
    pub async fn wait_for(&self, count: usize) -> Vec<AuditRecord> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let records = self.records();
            if records.len() >= count {
                return records;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "expected {count} audit records, got {}",
                records.len()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn persist(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Audit sink that always fails.
pub struct FailingAuditSink;

#[async_trait]
impl AuditSink for FailingAuditSink {
    async fn persist(&self, _record: &AuditRecord) -> Result<(), AuditError> {
        Err(AuditError::Sink("storage offline".into()))
    }
}

pub fn route(name: &str, path: &str, upstream: &str, kind: StreamKind) -> RouteConfig {
    RouteConfig {
        name: name.into(),
        path: path.into(),
        upstream: upstream.into(),
        auth_header: None,
        auth_env: None,
        kind,
    }
}

pub fn relay_config(routes: Vec<RouteConfig>) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.routes = routes;
    config.auth.api_keys = vec![API_KEY.to_string()];
    config.storage.log_summary = false;
    config.observability.metrics_enabled = false;
    config
}

/// A gateway serving on an ephemeral port.
pub struct Gateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<io::Result<()>>,
}

impl Gateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn start_gateway(config: RelayConfig, sink: Arc<dyn AuditSink>) -> Gateway {
    let audit = AuditPipeline::new(AuditStore::new(sink));
    let engine = RelayEngine::new(&config, audit).unwrap();
    let shutdown = Shutdown::new();
    let server = GatewayServer::new(&config, Arc::new(engine), shutdown.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(server.run(listener));

    Gateway {
        addr,
        shutdown,
        handle,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .unwrap()
}
