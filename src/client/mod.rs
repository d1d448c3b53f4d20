//! OWServer client: retrieval and parsing of `details.xml`

pub mod details_parser;
pub mod http_client;

pub use details_parser::{parse_details, SensorElement, XmlSnapshot};
pub use http_client::OwServerHttpClient;

use crate::error::{ErrorCode, OwServerError, Result};
use async_trait::async_trait;
use std::fmt;
use tracing::{debug, warn};

/// Trait for details.xml retrieval implementations
#[async_trait]
pub trait DetailsFetcher: Send + Sync {
    /// Fetch the raw details.xml body from one server
    async fn fetch_raw(&self, server: &str) -> Result<String>;
}

/// Why a server could not be polled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollFailure {
    pub reason: String,
    pub code: ErrorCode,
    /// A later cycle may succeed without operator action
    pub retryable: bool,
}

impl From<&OwServerError> for PollFailure {
    fn from(err: &OwServerError) -> Self {
        Self {
            reason: err.to_string(),
            code: err.to_error_code(),
            retryable: err.is_retryable(),
        }
    }
}

impl fmt::Display for PollFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_number(), self.reason)
    }
}

/// Result of polling one server for one cycle
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Success(XmlSnapshot),
    Failure(PollFailure),
}

impl PollOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PollOutcome::Success(_))
    }
}

/// Fetch and parse one server's details.xml.
///
/// Connection errors, timeouts, HTTP errors and malformed XML all collapse
/// into [`PollOutcome::Failure`]; nothing is retried within a cycle.
pub async fn poll_server(fetcher: &dyn DetailsFetcher, server: &str) -> PollOutcome {
    debug!(server = %server, "Getting details.xml");
    let body = match fetcher.fetch_raw(server).await {
        Ok(body) => body,
        Err(e) => {
            let failure = PollFailure::from(&e);
            warn!(
                server = %server,
                retryable = failure.retryable,
                "Unable to make a successful connection to OWServer: {}", e
            );
            return PollOutcome::Failure(failure);
        }
    };

    match parse_details(&body) {
        Ok(snapshot) => {
            debug!(
                server = %server,
                sensors = snapshot.sensors.len(),
                "details.xml parsed"
            );
            PollOutcome::Success(snapshot)
        }
        Err(e) => {
            let e = match e {
                OwServerError::Xml(inner) => OwServerError::parsing(inner.to_string()),
                other => other,
            };
            let failure = PollFailure::from(&e);
            warn!(
                server = %server,
                retryable = failure.retryable,
                "Malformed details.xml: {}", e
            );
            PollOutcome::Failure(failure)
        }
    }
}
