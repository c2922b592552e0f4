//! Database location and opening.

use kessan_data::error::DataError;
use kessan_data::store::FilingStore;
use std::path::{Path, PathBuf};

/// Get the default data directory path.
///
/// Uses platform-specific data directories:
/// - Linux: `~/.local/share/kessan/`
/// - macOS: `~/Library/Application Support/kessan/`
/// - Windows: `%APPDATA%\kessan\`
pub(crate) fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kessan")
}

/// Get the default database path.
pub(crate) fn default_db_path() -> PathBuf {
    default_data_dir().join("edinet.db")
}

/// The configured path, or the default one.
pub(crate) fn resolve_db_path(configured: Option<PathBuf>) -> PathBuf {
    configured.unwrap_or_else(default_db_path)
}

/// Open the store, creating the directory if needed.
pub(crate) fn open_store(path: &Path) -> Result<FilingStore, DataError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    FilingStore::open(path)
}
