//! Error types for configuration and pipeline runs.

use chrono::NaiveDate;
use kessan_data::DataError;
use std::path::PathBuf;
use thiserror::Error;

/// Invalid run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A date could not be parsed
    #[error("Invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    /// Start date after end date
    #[error("Start date {start} is after end date {end}")]
    InvertedRange {
        /// Start of the range
        start: NaiveDate,
        /// End of the range
        end: NaiveDate,
    },

    /// No EDINET subscription key
    #[error("EDINET API key is not set (use --api-key or EDINET_API_KEY)")]
    MissingApiKey,

    /// Worker pool width of zero
    #[error("Worker count must be at least 1")]
    ZeroWorkers,

    /// Retry policy without any attempt
    #[error("Retry attempts must be at least 1")]
    ZeroAttempts,

    /// Unknown market or index selector
    #[error("Unknown market '{0}' (expected prime, standard, growth or nikkei225)")]
    UnknownMarket(String),

    /// Index table name that is not a plain identifier
    #[error("Invalid index table name '{0}'")]
    InvalidTableName(String),

    /// Tag table could not be read
    #[error("Failed to load tag table {path}: {source}")]
    TagTable {
        /// Table path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: DataError,
    },

    /// Built-in tag table could not be parsed
    #[error("Built-in tag table is invalid: {0}")]
    BuiltinTagTable(#[source] DataError),
}

/// Fatal pipeline errors. Per-document and per-day failures are not fatal
/// and end up in the run summary instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration rejected before the run started
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The API rejected the subscription key
    #[error("EDINET API rejected the subscription key (HTTP {0})")]
    Authentication(u16),

    /// Every day in the range failed to list
    #[error("EDINET API unreachable: all {days} day(s) failed to list (last error: {last_error})")]
    ApiUnreachable {
        /// Days in the range
        days: usize,
        /// Last listing error
        last_error: String,
    },

    /// Store could not be opened or initialised
    #[error(transparent)]
    Data(#[from] DataError),
}
