//! EDINET data fetching and parsing.
//!
//! This module provides access to the FSA EDINET API v2:
//! - Daily disclosure listings (`documents.json`)
//! - XBRL archive downloads with bounded retry
//! - Instance and inline XBRL parsing
//! - Fact extraction through an ordered tag-candidate table
//!
//! # Example
//!
//! ```no_run
//! use chrono::NaiveDate;
//! use kessan_data::edinet::{DisclosureSource, EdinetClient, Filing, TagTable, extract_from_archive};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = EdinetClient::new(std::env::var("EDINET_API_KEY")?)?;
//!     let day = NaiveDate::from_ymd_opt(2024, 6, 20).unwrap();
//!     let table = TagTable::builtin()?;
//!
//!     for raw in client.list_documents(day).await? {
//!         let Some(filing) = Filing::from_raw(raw, day) else { continue };
//!         if filing.xbrl_available {
//!             let archive = client.download_archive(&filing.doc_id).await?;
//!             let outcome = extract_from_archive(&archive, &filing.doc_id, &table, false);
//!             println!("{}: {}", filing.doc_id, outcome.status());
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod documents;
pub mod fundamentals;
pub mod retry;
pub mod xbrl;

pub use client::{ClientConfig, DisclosureSource, EDINET_BASE_URL, EdinetClient};
pub use documents::{Filing, extract_document_array, normalize_sec_code};
pub use fundamentals::{
    Extraction, ExtractionStatus, FactField, FailureStage, FinancialFacts, TagTable,
    extract_facts, extract_from_archive, select_fact,
};
pub use retry::{Attempted, RetryPolicy};
pub use xbrl::{XbrlContext, XbrlFact, XbrlInstance, extract_instance, parse_number};
