// HTTP POST transport
//
// Ships a batch as one JSON document and retries transient failures
// internally with exponential backoff. This is the only transport with
// internal retry; the chain treats an exhausted retry budget as a single
// failure against this transport's breaker.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use auditcore_core::{Batch, Event, TransportError};
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use tracing::debug;

use crate::Transport;

#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub endpoint: String,
    pub timeout: Duration,
    /// Total attempts per `send`, including the first.
    pub retries: u32,
    pub headers: HashMap<String, String>,
    pub backoff_base: Duration,
}

impl HttpTransportConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: Duration::from_millis(5000),
            retries: 3,
            headers: HashMap::new(),
            backoff_base: Duration::from_millis(100),
        }
    }
}

/// Request body: `{"logs": [...], "timestamp": "<RFC3339>"}`.
#[derive(Serialize)]
struct WireBody<'a> {
    logs: &'a [Event],
    timestamp: String,
}

pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    headers: HeaderMap,
    retries: u32,
    timeout: Duration,
    backoff_base: Duration,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        let headers = parse_headers(&config.headers)?;
        Ok(Self {
            client,
            endpoint: config.endpoint,
            headers,
            retries: config.retries.max(1),
            timeout: config.timeout,
            backoff_base: config.backoff_base,
        })
    }

    fn body_bytes(batch: &Batch) -> Result<Vec<u8>, TransportError> {
        let body = WireBody {
            logs: batch.events(),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        };
        Ok(serde_json::to_vec(&body)?)
    }

    /// Tracing headers from the batch's first traced event, including the
    /// W3C `traceparent` form.
    fn trace_headers(batch: &Batch) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let Some(event) = batch.events().iter().find(|e| e.has_trace_context()) else {
            return headers;
        };
        let trace_id = event.trace_id.as_deref().unwrap_or_default();
        let span_id = event.span_id.as_deref().unwrap_or_default();

        insert_if_valid(&mut headers, "x-trace-id", trace_id);
        insert_if_valid(&mut headers, "x-span-id", span_id);
        if let Some(parent) = event.parent_span_id.as_deref() {
            insert_if_valid(&mut headers, "x-parent-span-id", parent);
        }
        if !trace_id.is_empty() && !span_id.is_empty() {
            let traceparent = format!("00-{}-{}-01", trace_id, span_id);
            insert_if_valid(&mut headers, "traceparent", &traceparent);
        }
        headers
    }

    async fn attempt(&self, body: Bytes, extra: &HeaderMap) -> Result<(), TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .headers(extra.clone())
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|err| classify(err, self.timeout))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::Http {
                status: status.as_u16(),
            })
        }
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout {
            elapsed_ms: timeout.as_millis() as u64,
        }
    } else {
        TransportError::Connect(err.to_string())
    }
}

fn insert_if_valid(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if value.is_empty() {
        return;
    }
    if let Ok(parsed) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(name), parsed);
    }
}

fn parse_headers(headers: &HashMap<String, String>) -> Result<HeaderMap, anyhow::Error> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::try_from(key.as_str())
            .map_err(|e| anyhow::anyhow!("invalid header name '{}': {}", key, e))?;
        let val = HeaderValue::from_str(value)
            .map_err(|e| anyhow::anyhow!("invalid header value for '{}': {}", key, e))?;
        map.insert(name, val);
    }
    Ok(map)
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, batch: &Batch) -> Result<(), TransportError> {
        let body = Bytes::from(Self::body_bytes(batch)?);
        let extra = Self::trace_headers(batch);

        let mut last_err = None;
        for attempt in 0..self.retries {
            match self.attempt(body.clone(), &extra).await {
                Ok(()) => {
                    debug!(
                        batch = %batch.id(),
                        events = batch.len(),
                        attempt,
                        "batch posted"
                    );
                    return Ok(());
                }
                Err(err) => {
                    let give_up = !err.retryable() || attempt + 1 == self.retries;
                    last_err = Some(err);
                    if give_up {
                        break;
                    }
                    tokio::time::sleep(self.backoff_base * 2u32.pow(attempt)).await;
                }
            }
        }
        Err(last_err.expect("at least one attempt was made"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auditcore_core::{FieldMap, Level};

    fn traced_batch() -> Batch {
        let mut event = Event::new(Level::Info, "m", FieldMap::new());
        event.trace_id = Some("4bf92f3577b34da6a3ce929d0e0e4736".to_string());
        event.span_id = Some("00f067aa0ba902b7".to_string());
        event.parent_span_id = Some("53ce929d0e0e4736".to_string());
        Batch::new(vec![event])
    }

    #[test]
    fn test_body_shape() {
        let batch = Batch::new(vec![
            Event::new(Level::Info, "a", FieldMap::new()),
            Event::new(Level::Warn, "b", FieldMap::new()),
        ]);
        let body = HttpTransport::body_bytes(&batch).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(parsed["logs"].as_array().unwrap().len(), 2);
        assert_eq!(parsed["logs"][0]["message"], "a");
        assert_eq!(parsed["logs"][1]["level"], "warn");
        assert!(parsed["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_trace_headers() {
        let headers = HttpTransport::trace_headers(&traced_batch());
        assert_eq!(
            headers.get("x-trace-id").unwrap(),
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );
        assert_eq!(headers.get("x-span-id").unwrap(), "00f067aa0ba902b7");
        assert_eq!(headers.get("x-parent-span-id").unwrap(), "53ce929d0e0e4736");
        assert_eq!(
            headers.get("traceparent").unwrap(),
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"
        );
    }

    #[test]
    fn test_no_trace_headers_without_context() {
        let batch = Batch::new(vec![Event::new(Level::Info, "m", FieldMap::new())]);
        assert!(HttpTransport::trace_headers(&batch).is_empty());
    }

    #[test]
    fn test_parse_headers_rejects_garbage() {
        let mut headers = HashMap::new();
        headers.insert("X-Ok".to_string(), "fine".to_string());
        assert_eq!(parse_headers(&headers).unwrap().len(), 1);

        headers.insert("bad header".to_string(), "x".to_string());
        assert!(parse_headers(&headers).is_err());
    }

    #[test]
    fn test_construction() {
        let transport = HttpTransport::new(HttpTransportConfig::new("http://localhost:9"));
        assert!(transport.is_ok());
        assert_eq!(transport.unwrap().name(), "http");
    }
}
