//! Run configuration.

use crate::error::ConfigError;
use crate::reference::MarketGroup;
use chrono::{FixedOffset, NaiveDate, Utc};
use kessan_data::edinet::{ClientConfig, RetryPolicy, TagTable};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default worker pool width.
pub const DEFAULT_WORKERS: usize = 6;

/// Default description keyword: annual securities report.
pub const DEFAULT_KEYWORD: &str = "有価証券報告書";

/// Default name of the index membership table.
pub const DEFAULT_INDEX_TABLE: &str = "nikkei225";

/// Default age after which a reference table is considered stale.
pub const DEFAULT_MAX_TABLE_AGE_DAYS: i64 = 30;

const JST_OFFSET_SECS: i32 = 9 * 3600;

/// Category stage of the document filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryFilter {
    /// Accept every document type
    IncludeAll,
    /// Accept documents whose description contains any keyword
    Keywords(Vec<String>),
}

impl Default for CategoryFilter {
    fn default() -> Self {
        Self::Keywords(vec![DEFAULT_KEYWORD.to_string()])
    }
}

/// Where reference data comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceConfig {
    /// EDINET code list CSV
    pub edinet_code_csv: Option<PathBuf>,
    /// JPX market listing CSV
    pub market_listing_csv: Option<PathBuf>,
    /// Index membership CSV
    pub index_csv: Option<PathBuf>,
    /// Index membership table in the store
    pub index_table: String,
    /// Tables older than this are ignored
    pub max_table_age_days: i64,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            edinet_code_csv: None,
            market_listing_csv: None,
            index_csv: None,
            index_table: DEFAULT_INDEX_TABLE.to_string(),
            max_table_age_days: DEFAULT_MAX_TABLE_AGE_DAYS,
        }
    }
}

/// Everything one pipeline run needs.
#[derive(Clone)]
pub struct RunConfig {
    /// First listing day (inclusive, JST)
    pub start_date: NaiveDate,
    /// Last listing day (inclusive, JST)
    pub end_date: NaiveDate,
    /// Description keyword filter
    pub category: CategoryFilter,
    /// Restrict to one market tier or index
    pub market: Option<MarketGroup>,
    /// Serialise every numeric fact to `all_numeric_facts_json`
    pub full_capture: bool,
    /// Concurrent documents in flight
    pub workers: usize,
    /// SQLite database path
    pub db_path: PathBuf,
    /// EDINET subscription key
    pub api_key: Option<String>,
    /// API base URL
    pub base_url: String,
    /// Minimum interval between API requests
    pub min_interval: Duration,
    /// Per-request timeout
    pub timeout: Duration,
    /// Retry policy for listings and archive downloads
    pub retry: RetryPolicy,
    /// Replacement tag-candidate table
    pub tag_table: Option<PathBuf>,
    /// Reference data sources
    pub reference: ReferenceConfig,
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("start_date", &self.start_date)
            .field("end_date", &self.end_date)
            .field("category", &self.category)
            .field("market", &self.market)
            .field("full_capture", &self.full_capture)
            .field("workers", &self.workers)
            .field("db_path", &self.db_path)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("min_interval", &self.min_interval)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("tag_table", &self.tag_table)
            .field("reference", &self.reference)
            .finish()
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        let today = jst_today();
        let client = ClientConfig::default();
        Self {
            start_date: today,
            end_date: today,
            category: CategoryFilter::default(),
            market: None,
            full_capture: false,
            workers: DEFAULT_WORKERS,
            db_path: PathBuf::from("edinet.db"),
            api_key: None,
            base_url: client.base_url,
            min_interval: client.min_interval,
            timeout: client.timeout,
            retry: RetryPolicy::default(),
            tag_table: None,
            reference: ReferenceConfig::default(),
        }
    }
}

impl RunConfig {
    /// Check the settings that make a run impossible.
    ///
    /// The API key is checked by [`RunConfig::require_api_key`] instead, so
    /// runs against an injected source do not need one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start_date > self.end_date {
            return Err(ConfigError::InvertedRange {
                start: self.start_date,
                end: self.end_date,
            });
        }
        if self.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if self.reference.index_table.is_empty()
            || !self
                .reference
                .index_table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ConfigError::InvalidTableName(self.reference.index_table.clone()));
        }
        Ok(())
    }

    /// The API key, or an error when it is missing or blank.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    /// Every listing day in the range, oldest first.
    pub fn days(&self) -> Vec<NaiveDate> {
        self.start_date
            .iter_days()
            .take_while(|d| *d <= self.end_date)
            .collect()
    }

    /// The tag-candidate table: the override file if set, else the built-in one.
    pub fn load_tag_table(&self) -> Result<TagTable, ConfigError> {
        match &self.tag_table {
            Some(path) => TagTable::from_path(path).map_err(|source| ConfigError::TagTable {
                path: path.clone(),
                source,
            }),
            None => TagTable::builtin().map_err(ConfigError::BuiltinTagTable),
        }
    }

    /// HTTP client settings.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            min_interval: self.min_interval,
            timeout: self.timeout,
        }
    }
}

/// Today's date in Japan Standard Time.
pub fn jst_today() -> NaiveDate {
    let now = Utc::now();
    match FixedOffset::east_opt(JST_OFFSET_SECS) {
        Some(jst) => now.with_timezone(&jst).date_naive(),
        None => now.date_naive(),
    }
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(raw: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ConfigError::InvalidDate(raw.to_string()))
}
