//! kessan: EDINET disclosure ingest.
//!
//! Lists filings day by day from the EDINET API v2, filters them by
//! description keywords and market or index membership, extracts sixteen
//! financial facts from each filing's XBRL, derives four ratios, and upserts
//! everything into SQLite.
//!
//! # Example
//!
//! ```no_run
//! use kessan::{NoProgress, RunConfig, run_pipeline};
//! use kessan::data::edinet::EdinetClient;
//! use kessan::data::store::FilingStore;
//! use std::sync::Arc;
//! use tokio::sync::Mutex;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RunConfig {
//!         api_key: std::env::var("EDINET_API_KEY").ok(),
//!         ..RunConfig::default()
//!     };
//!     let client = EdinetClient::with_config(config.require_api_key()?, config.client_config())?;
//!     let store = Arc::new(Mutex::new(FilingStore::open(&config.db_path)?));
//!
//!     let summary = run_pipeline(&client, store, &config, &NoProgress).await?;
//!     println!("{} documents persisted", summary.persisted);
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod filter;
pub mod lister;
pub mod metrics;
pub mod pipeline;
pub mod reference;

pub use kessan_data as data;

pub use config::{CategoryFilter, ReferenceConfig, RunConfig, jst_today, parse_date};
pub use error::{ConfigError, PipelineError};
pub use filter::{Accepted, DocumentFilter, FilterOutcome};
pub use lister::{DayOutcome, DocumentLister};
pub use metrics::{DerivedMetrics, safe_div};
pub use pipeline::{
    DayGap, EXTRACTION_ERROR_KEY, NoProgress, Progress, RunSummary, run_pipeline, run_pipeline_with,
};
pub use reference::{MarketGroup, ReferenceResolver, Resolution};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
