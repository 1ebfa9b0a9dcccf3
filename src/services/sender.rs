use crate::error::{ApiResult, DeliveryErrorKind, WebhookError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::BTreeMap;
use std::time::Duration;

/// A fully prepared POST for one delivery attempt.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendResponse {
    pub status: u16,
    pub body: String,
}

impl SendResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport for delivery attempts.
#[async_trait]
pub trait DeliverySender: Send + Sync {
    /// Returns any response that arrived, success or not. Errors are reserved
    /// for attempts that produced no response at all.
    async fn send(&self, request: OutboundRequest) -> Result<SendResponse, DeliveryErrorKind>;
}

pub struct ReqwestSender {
    client: reqwest::Client,
    max_body: usize,
}

impl ReqwestSender {
    /// `max_body` bounds how much of each response body is read.
    pub fn new(user_agent: &str, max_body: usize) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| WebhookError::Http(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, max_body })
    }
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, DeliveryErrorKind> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
            DeliveryErrorKind::Network {
                message: format!("invalid header name '{}'", name),
            }
        })?;
        let value = HeaderValue::from_str(value).map_err(|_| DeliveryErrorKind::Network {
            message: format!("invalid value for header '{}'", name),
        })?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Read at most `limit` bytes of the body, then drop the rest of the stream.
async fn read_capped(mut resp: reqwest::Response, limit: usize) -> String {
    let mut buf = Vec::new();
    while buf.len() < limit {
        match resp.chunk().await {
            Ok(Some(chunk)) => {
                let take = chunk.len().min(limit - buf.len());
                buf.extend_from_slice(&chunk[..take]);
            }
            Ok(None) | Err(_) => break,
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[async_trait]
impl DeliverySender for ReqwestSender {
    async fn send(&self, request: OutboundRequest) -> Result<SendResponse, DeliveryErrorKind> {
        let headers = header_map(&request.headers)?;
        let builder = self
            .client
            .post(&request.url)
            .timeout(request.timeout)
            .headers(headers)
            .body(request.body);

        match builder.send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body = read_capped(resp, self.max_body).await;
                Ok(SendResponse { status, body })
            }
            Err(e) if e.is_timeout() => Err(DeliveryErrorKind::Timeout {
                after_ms: request.timeout.as_millis() as u64,
            }),
            Err(e) => Err(DeliveryErrorKind::Network {
                message: e.to_string(),
            }),
        }
    }
}
