//! Persistence layer for filings and reference data.

pub mod sqlite;

pub use sqlite::{
    CompanyRecord, DocumentRow, DocumentSummary, FilingStore, IndexMembers, ListingGap,
    StoreStats, StoredCompany,
};
