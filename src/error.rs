//! Error types for the OWServer poller
//!
//! Every failure in the polling pipeline is non-fatal: discovery, fetch and
//! decode errors degrade to an empty server set, a skipped server, an
//! `Unsupported` field or an offline device. The types here carry enough
//! context for logging and let each layer decide how to recover.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for poller operations
pub type Result<T> = std::result::Result<T, OwServerError>;

/// Error types for OWServer polling operations
#[derive(Error, Debug)]
pub enum OwServerError {
    /// UDP discovery errors
    #[error("Discovery failed: {0}")]
    Discovery(String),

    /// Fetching details.xml from a server failed
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Document level parsing errors
    #[error("Parsing error: {0}")]
    Parsing(String),

    /// XML reader errors
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// A single sensor field was missing or malformed
    #[error("Field decode error: {0}")]
    FieldDecode(String),

    /// A device could not be decoded at all
    #[error("Device decode error: {0}")]
    DeviceDecode(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Not found errors (devices, servers)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing errors
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Structured error code for machine-readable error handling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Connection errors (1000-1099)
    ConnectionTimeout,
    ConnectionRefused,
    NetworkUnreachable,

    // Configuration errors (1200-1299)
    ConfigurationMissing,
    ConfigurationInvalid,

    // Device errors (1300-1399)
    DeviceNotFound,
    DeviceOffline,
    DeviceTypeUnsupported,

    // Data errors (1400-1499)
    ParsingFailed,
    InvalidInput,
    FieldUnsupported,

    // Internal errors (1900-1999)
    InternalError,
}

impl ErrorCode {
    /// Get numeric error code
    pub fn as_number(&self) -> u32 {
        match self {
            ErrorCode::ConnectionTimeout => 1001,
            ErrorCode::ConnectionRefused => 1002,
            ErrorCode::NetworkUnreachable => 1004,

            ErrorCode::ConfigurationMissing => 1201,
            ErrorCode::ConfigurationInvalid => 1202,

            ErrorCode::DeviceNotFound => 1301,
            ErrorCode::DeviceOffline => 1302,
            ErrorCode::DeviceTypeUnsupported => 1304,

            ErrorCode::ParsingFailed => 1401,
            ErrorCode::InvalidInput => 1402,
            ErrorCode::FieldUnsupported => 1405,

            ErrorCode::InternalError => 1901,
        }
    }

    /// Get error category
    pub fn category(&self) -> &'static str {
        match self.as_number() {
            1000..=1099 => "connection",
            1200..=1299 => "configuration",
            1300..=1399 => "device",
            1400..=1499 => "data",
            1900..=1999 => "internal",
            _ => "unknown",
        }
    }
}

impl OwServerError {
    /// Create a discovery error
    pub fn discovery<S: Into<String>>(msg: S) -> Self {
        OwServerError::Discovery(msg.into())
    }

    /// Create a fetch error
    pub fn fetch<S: Into<String>>(msg: S) -> Self {
        OwServerError::Fetch(msg.into())
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        OwServerError::Timeout(msg.into())
    }

    /// Create a parsing error
    pub fn parsing<S: Into<String>>(msg: S) -> Self {
        OwServerError::Parsing(msg.into())
    }

    /// Create a field decode error
    pub fn field_decode<S: Into<String>>(msg: S) -> Self {
        OwServerError::FieldDecode(msg.into())
    }

    /// Create a device decode error
    pub fn device_decode<S: Into<String>>(msg: S) -> Self {
        OwServerError::DeviceDecode(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        OwServerError::Config(msg.into())
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        OwServerError::NotFound(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        OwServerError::InvalidInput(msg.into())
    }

    /// Map error to a structured code
    pub fn to_error_code(&self) -> ErrorCode {
        match self {
            OwServerError::Discovery(_) => ErrorCode::NetworkUnreachable,
            OwServerError::Fetch(_) => ErrorCode::ConnectionRefused,
            OwServerError::Http(e) if e.is_timeout() => ErrorCode::ConnectionTimeout,
            OwServerError::Http(_) => ErrorCode::ConnectionRefused,
            OwServerError::Timeout(_) => ErrorCode::ConnectionTimeout,
            OwServerError::Parsing(_) | OwServerError::Xml(_) => ErrorCode::ParsingFailed,
            OwServerError::Json(_) | OwServerError::Toml(_) => ErrorCode::ParsingFailed,
            OwServerError::FieldDecode(_) => ErrorCode::FieldUnsupported,
            OwServerError::DeviceDecode(_) => ErrorCode::DeviceOffline,
            OwServerError::Config(_) => ErrorCode::ConfigurationInvalid,
            OwServerError::NotFound(_) => ErrorCode::DeviceNotFound,
            OwServerError::InvalidInput(_) => ErrorCode::InvalidInput,
            OwServerError::Io(e) if e.kind() == std::io::ErrorKind::NetworkUnreachable => {
                ErrorCode::NetworkUnreachable
            }
            OwServerError::Io(_) => ErrorCode::InternalError,
        }
    }

    /// Check if the next poll cycle may succeed where this one failed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OwServerError::Discovery(_)
                | OwServerError::Fetch(_)
                | OwServerError::Http(_)
                | OwServerError::Timeout(_)
                | OwServerError::Io(_)
        )
    }

    /// Whether this error belongs to the fetch failure class
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            OwServerError::Fetch(_)
                | OwServerError::Http(_)
                | OwServerError::Timeout(_)
                | OwServerError::Parsing(_)
                | OwServerError::Xml(_)
        )
    }
}
