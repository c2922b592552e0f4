//! Glue between the CLI and the kessan crates.
//!
//! Store location, logging setup, progress reporting and summary output.

pub(crate) mod logging;
pub(crate) mod progress;
pub(crate) mod report;
pub(crate) mod store_manager;
