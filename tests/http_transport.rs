// HTTP delivery against an in-process stub server
//
// The stub speaks just enough HTTP/1.1 to accept a POST, capture its
// headers and body, and answer with a canned status. Connections are
// closed after one request so every request is observable.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use auditcore::{fields, Level, LogRecord, Pipeline, RuntimeConfig, TraceContext, TransportConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
struct CapturedRequest {
    headers: String,
    body: serde_json::Value,
}

struct StubServer {
    endpoint: String,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    /// Status to answer with; swap to simulate failures.
    status: Arc<AtomicU16>,
}

impl StubServer {
    async fn start() -> StubServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests: Arc<Mutex<Vec<CapturedRequest>>> = Arc::new(Mutex::new(Vec::new()));
        let status = Arc::new(AtomicU16::new(200));

        let captured = requests.clone();
        let answer = status.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let captured = captured.clone();
                let answer = answer.clone();
                tokio::spawn(async move {
                    let Some(request) = read_request(&mut socket).await else {
                        return;
                    };
                    captured.lock().unwrap().push(request);
                    let status = answer.load(Ordering::SeqCst);
                    let reason = if status < 400 { "OK" } else { "Error" };
                    let response = format!(
                        "HTTP/1.1 {} {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                        status, reason
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        StubServer {
            endpoint: format!("http://{}/ingest", addr),
            requests,
            status,
        }
    }

    fn config(&self) -> RuntimeConfig {
        let mut config = RuntimeConfig::default();
        config.flush.min_interval_ms = 10;
        config.flush.max_interval_ms = 40;
        config.transports = vec![TransportConfig::Http {
            endpoint: self.endpoint.clone(),
            timeout_ms: 2000,
            retries: 3,
            headers: [("X-Api-Key".to_string(), "k123".to_string())].into(),
        }];
        config
    }

    fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<CapturedRequest> {
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut buf).await.ok()?;
        if n == 0 {
            return None;
        }
        raw.extend_from_slice(&buf[..n]);
        if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let headers = String::from_utf8_lossy(&raw[..header_end]).to_string();
    let content_length: usize = headers
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse().ok())?
        })
        .unwrap_or(0);

    let mut body = raw[header_end..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut buf).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buf[..n]);
    }

    Some(CapturedRequest {
        headers,
        body: serde_json::from_slice(&body).ok()?,
    })
}

#[tokio::test]
async fn test_wire_format_and_headers() {
    let server = StubServer::start().await;
    let pipeline = Pipeline::init(server.config()).unwrap();

    for i in 0..5 {
        pipeline
            .log(Level::Info, format!("m{}", i), fields! { "seq" => i as i64 })
            .await;
    }
    assert!(pipeline.flush(Duration::from_secs(5)).await);
    pipeline.shutdown(Duration::from_secs(1)).await;

    let requests = server.requests();
    assert!(!requests.is_empty());

    let total: usize = requests
        .iter()
        .map(|r| r.body["logs"].as_array().unwrap().len())
        .sum();
    assert_eq!(total, 5);

    let first = &requests[0];
    assert!(first.headers.starts_with("POST /ingest HTTP/1.1"));
    let lowered = first.headers.to_lowercase();
    assert!(lowered.contains("content-type: application/json"));
    assert!(lowered.contains("x-api-key: k123"));

    // Body shape: {"logs": [...], "timestamp": "<RFC3339>"}
    assert!(first.body["timestamp"].as_str().unwrap().contains('T'));
    let event = &first.body["logs"][0];
    assert_eq!(event["message"], "m0");
    assert_eq!(event["level"], "info");
    assert_eq!(event["fields"]["seq"], 0.0);
}

#[tokio::test]
async fn test_trace_headers_propagated() {
    let server = StubServer::start().await;
    let pipeline = Pipeline::init(server.config()).unwrap();

    pipeline
        .log_with(
            LogRecord::new(Level::Info, "traced")
                .with_trace(TraceContext::new("abc123", "def456").with_parent("000111")),
        )
        .await;
    assert!(pipeline.flush(Duration::from_secs(5)).await);
    pipeline.shutdown(Duration::from_secs(1)).await;

    let requests = server.requests();
    let lowered = requests[0].headers.to_lowercase();
    assert!(lowered.contains("x-trace-id: abc123"));
    assert!(lowered.contains("x-span-id: def456"));
    assert!(lowered.contains("x-parent-span-id: 000111"));
    assert!(lowered.contains("traceparent: 00-abc123-def456-01"));
}

#[tokio::test]
async fn test_server_errors_are_retried_internally() {
    let server = StubServer::start().await;
    let pipeline = Pipeline::init(server.config()).unwrap();

    // Fail the first attempt; the transport's internal retry should
    // succeed without the event ever reaching the fallback queue.
    server.status.store(500, Ordering::SeqCst);
    let flipper = server.status.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        flipper.store(200, Ordering::SeqCst);
    });

    pipeline.log(Level::Warn, "retry me", fields! {}).await;
    assert!(pipeline.flush(Duration::from_secs(5)).await);

    let stats = pipeline.stats();
    assert_eq!(stats.sent, 1);
    assert_eq!(stats.fallback_queued, 0);
    // More than one request reached the server.
    assert!(server.requests().len() >= 2);

    pipeline.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_client_errors_fail_fast_to_fallback() {
    let server = StubServer::start().await;
    server.status.store(400, Ordering::SeqCst);
    let pipeline = Pipeline::init(server.config()).unwrap();

    pipeline.log(Level::Info, "rejected", fields! {}).await;
    assert!(pipeline.flush(Duration::from_secs(5)).await);

    let stats = pipeline.stats();
    assert_eq!(stats.sent, 0);
    assert_eq!(stats.fallback_queued, 1);
    // A 400 is not retried: exactly one request per dispatch attempt.
    let per_dispatch = server.requests().len();
    assert!(per_dispatch >= 1);

    pipeline.shutdown(Duration::from_secs(1)).await;
}
