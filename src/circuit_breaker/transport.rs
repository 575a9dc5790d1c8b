//! Outbound HTTP transport.

use async_trait::async_trait;

use crate::error_handling::TransportError;

/// Header name/value pairs, in order.
pub type Headers = Vec<(String, String)>;

/// What came back from an outbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: Vec<u8>,
    /// Response headers.
    pub headers: Headers,
}

impl TransportResponse {
    /// Creates a response with no headers.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        TransportResponse {
            status,
            body: body.into(),
            headers: Vec::new(),
        }
    }

    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as JSON, if it is JSON.
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }

    /// First header with this name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A pluggable GET/POST client.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Performs a GET.
    async fn get(&self, url: &str, headers: &Headers) -> Result<TransportResponse, TransportError>;

    /// Performs a POST with `body`.
    async fn post(
        &self,
        url: &str,
        body: &[u8],
        headers: &Headers,
    ) -> Result<TransportResponse, TransportError>;
}

/// Production transport on a `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Wraps an existing client (see `initialization::init_client`).
    pub fn from_client(client: reqwest::Client) -> Self {
        ReqwestTransport { client }
    }

    async fn send(
        &self,
        mut request: reqwest::RequestBuilder,
        headers: &Headers,
    ) -> Result<TransportResponse, TransportError> {
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();
        Ok(TransportResponse {
            status,
            body,
            headers,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, headers: &Headers) -> Result<TransportResponse, TransportError> {
        self.send(self.client.get(url), headers).await
    }

    async fn post(
        &self,
        url: &str,
        body: &[u8],
        headers: &Headers,
    ) -> Result<TransportResponse, TransportError> {
        self.send(self.client.post(url).body(body.to_vec()), headers)
            .await
    }
}
