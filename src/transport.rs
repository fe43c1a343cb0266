use crate::{HarvestError, Result};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Performs a single GET request. Implementations never retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str, headers: &HeaderMap) -> Result<HttpResponse>;
}

/// The `ReqwestTransport` struct sends requests through a shared `reqwest` client.
pub struct ReqwestTransport {
    /// The HTTP client used for making requests.
    client: Client,
}

impl ReqwestTransport {
    /// Creates a new `ReqwestTransport` whose requests time out after `timeout`.
    ///
    /// # Returns
    ///
    /// A `Result` containing the transport, or an error if the client could not be created.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(HarvestError::Http)?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str, headers: &HeaderMap) -> Result<HttpResponse> {
        let response = self
            .client
            .get(url)
            .headers(headers.clone())
            .send()
            .await
            .map_err(describe)?;

        let status = response.status().as_u16();
        debug!(url, status, "Response received");

        let body = response.text().await.map_err(describe)?;
        Ok(HttpResponse { status, body })
    }
}

fn describe(err: reqwest::Error) -> HarvestError {
    if err.is_timeout() {
        HarvestError::Transport(format!("timed out: {}", err))
    } else if err.is_connect() {
        HarvestError::Transport(format!("connection failed: {}", err))
    } else {
        HarvestError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, USER_AGENT};

    #[tokio::test]
    async fn test_get_forwards_headers_and_returns_status() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/profile")
            .match_header("user-agent", "test-agent/1.0")
            .with_status(200)
            .with_body("<p>jane.doe@university.edu</p>")
            .create_async()
            .await;

        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("test-agent/1.0"));

        let response = transport
            .get(&format!("{}/profile", server.url()), &headers)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, 200);
        assert!(response.body.contains("jane.doe@university.edu"));
    }

    #[tokio::test]
    async fn test_non_success_status_is_not_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/busy")
            .with_status(429)
            .create_async()
            .await;

        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
        let response = transport
            .get(&format!("{}/busy", server.url()), &HeaderMap::new())
            .await
            .unwrap();

        assert_eq!(response.status, 429);
    }

    #[tokio::test]
    async fn test_connection_failure_maps_to_transport_error() {
        let transport = ReqwestTransport::new(Duration::from_secs(2)).unwrap();
        let result = transport.get("http://127.0.0.1:1/", &HeaderMap::new()).await;

        assert!(matches!(result, Err(HarvestError::Transport(_))));
    }
}
