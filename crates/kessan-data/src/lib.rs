//! EDINET client, XBRL fact extraction and SQLite storage.
//!
//! - [`edinet`]: listing and archive requests, retry policy, XBRL parsing and
//!   the tag-candidate table
//! - [`store`]: the `edinet_documents`, `master_company` and `listing_gaps`
//!   tables
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/kessan/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod edinet;
pub mod error;
pub mod store;

pub use error::{DataError, Result};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
