use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{ExtractionError, ExtractionRequest};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Extraction endpoint abstraction (allows mocking).
pub trait ExtractionTransport: Send + Sync {
    /// Post the image; returns the raw response body on success.
    fn extract(
        &self,
        request: &ExtractionRequest,
    ) -> impl Future<Output = Result<String, ExtractionError>> + Send;
}

/// HTTP client for the extraction endpoint.
///
/// Only the connect timeout is set; model inference on a large label can
/// take minutes and is bounded by user cancellation instead.
pub struct HttpExtractionClient {
    endpoint: String,
    bearer_token: Option<String>,
    client: reqwest::Client,
}

impl HttpExtractionClient {
    pub fn new(endpoint: &str) -> Result<Self, ExtractionError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ExtractionError::Network(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bearer_token: None,
            client,
        })
    }

    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ExtractionTransport for HttpExtractionClient {
    async fn extract(&self, request: &ExtractionRequest) -> Result<String, ExtractionError> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(token) = &self.bearer_token {
            builder = builder.bearer_auth(token);
        }

        tracing::debug!(endpoint = %self.endpoint, bytes = request.base64.len(), "Posting label image");
        let response = builder.send().await.map_err(|e| {
            if e.is_connect() {
                ExtractionError::Connection(self.endpoint.clone())
            } else {
                ExtractionError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ExtractionError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Server {
                status: status.as_u16(),
                body,
            });
        }

        response
            .text()
            .await
            .map_err(|e| ExtractionError::Network(e.to_string()))
    }
}

enum MockReply {
    Body(String),
    Status(u16),
}

/// Mock transport for testing; returns a configured body or status.
pub struct MockExtractionTransport {
    reply: MockReply,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockExtractionTransport {
    pub fn new(body: &str) -> Self {
        Self {
            reply: MockReply::Body(body.to_string()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Reply with a non-success HTTP status.
    pub fn failing(status: u16) -> Self {
        Self {
            reply: MockReply::Status(status),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ExtractionTransport for MockExtractionTransport {
    async fn extract(&self, _request: &ExtractionRequest) -> Result<String, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.reply {
            MockReply::Body(body) => Ok(body.clone()),
            MockReply::Status(401) => Err(ExtractionError::Unauthorized),
            MockReply::Status(status) => Err(ExtractionError::Server {
                status: *status,
                body: String::new(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ExtractionRequest {
        ExtractionRequest::from_base64("YWJj").unwrap()
    }

    #[tokio::test]
    async fn mock_returns_configured_body() {
        let mock = MockExtractionTransport::new("{\"choices\": []}");
        assert_eq!(mock.extract(&request()).await.unwrap(), "{\"choices\": []}");
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn mock_maps_statuses() {
        let unauthorized = MockExtractionTransport::failing(401);
        assert!(matches!(
            unauthorized.extract(&request()).await,
            Err(ExtractionError::Unauthorized)
        ));
        let server = MockExtractionTransport::failing(503);
        assert!(matches!(
            server.extract(&request()).await,
            Err(ExtractionError::Server { status: 503, .. })
        ));
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = HttpExtractionClient::new("http://localhost:5065/api/ollama/extract/").unwrap();
        assert_eq!(client.endpoint(), "http://localhost:5065/api/ollama/extract");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        // Port 9 (discard) on localhost is closed in test environments.
        let client = HttpExtractionClient::new("http://127.0.0.1:9/extract").unwrap();
        let err = client.extract(&request()).await.unwrap_err();
        assert!(matches!(
            err,
            ExtractionError::Connection(_) | ExtractionError::Network(_)
        ));
    }
}
