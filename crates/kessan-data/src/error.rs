//! Error types for data operations.

use thiserror::Error;

/// Result type for data operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors that can occur during data operations.
#[derive(Debug, Error)]
pub enum DataError {
    /// Network error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-success HTTP status from the EDINET API
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// Status code returned by the server
        status: u16,
        /// Request URL with the subscription key removed
        url: String,
    },

    /// The API rejected the subscription key
    #[error("EDINET API rejected the subscription key (HTTP {0})")]
    Authentication(u16),

    /// EDINET returned an error payload inside a successful response
    #[error("EDINET API error {status}: {message}")]
    EdinetApi {
        /// Status reported in the payload metadata
        status: u16,
        /// Message reported in the payload metadata
        message: String,
    },

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Data parsing error
    #[error("Data parsing error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// XML parsing error
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    /// XBRL archive could not be read
    #[error("XBRL archive error: {0}")]
    Archive(String),

    /// No usable instance document inside the archive
    #[error("No XBRL instance document found in archive for {0}")]
    InstanceNotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DataError {
    /// Whether retrying the same request may succeed.
    ///
    /// Timeouts, connection failures, 429 and 5xx responses are transient.
    /// Authentication failures, other 4xx responses and parse errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Self::HttpStatus { status, .. } | Self::EdinetApi { status, .. } => {
                *status == 429 || *status >= 500
            }
            _ => false,
        }
    }
}

impl From<zip::result::ZipError> for DataError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Archive(err.to_string())
    }
}

impl From<quick_xml::Error> for DataError {
    fn from(err: quick_xml::Error) -> Self {
        Self::XmlParse(err.to_string())
    }
}
