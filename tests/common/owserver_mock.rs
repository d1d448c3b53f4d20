//! WireMock-based OWServer mocking infrastructure
//!
//! Serves `details.xml` documents the way OWServer hardware does, so the
//! HTTP client and the whole poll cycle can be exercised without hardware.

use std::time::Duration;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

/// Mock OWServer for testing
pub struct MockOwServer {
    pub server: MockServer,
    pub base_url: String,
}

impl MockOwServer {
    /// Start a server with no endpoints mounted
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let base_url = server.uri();
        Self { server, base_url }
    }

    /// Start a server answering `details.xml` with `body`
    pub async fn with_details(body: String) -> Self {
        let mock = Self::start().await;
        mock.serve_details(body).await;
        mock
    }

    /// `ip:port` as it would appear in the server list
    pub fn address(&self) -> String {
        self.server.address().to_string()
    }

    pub fn url(&self) -> &str {
        &self.base_url
    }

    pub async fn serve_details(&self, body: String) {
        Mock::given(method("GET"))
            .and(path("/details.xml"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/xml")
                    .set_body_string(body),
            )
            .mount(&self.server)
            .await;
    }

    pub async fn serve_status(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path("/details.xml"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    pub async fn serve_slowly(&self, body: String, delay: Duration) {
        Mock::given(method("GET"))
            .and(path("/details.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body).set_delay(delay))
            .mount(&self.server)
            .await;
    }

    /// Number of details.xml requests received so far
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }
}
