//! CSV reference snapshots.
//!
//! Three files are understood:
//! - the EDINET code list (keyed by EDINET code)
//! - a JPX-style market listing (keyed by securities code)
//! - an index membership list (securities code in the first column)
//!
//! Headers are matched by name, so column order and extra columns do not
//! matter. Files must be UTF-8; a leading BOM is ignored.

use kessan_data::edinet::normalize_sec_code;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Rows searched for the header line. The EDINET code list starts with a
/// download-date line before the header.
const HEADER_SEARCH_ROWS: usize = 5;

const EDINET_CODE_COLUMNS: &[&str] = &[
    "ＥＤＩＮＥＴコード",
    "EDINETコード",
    "edinet_code",
    "EdinetCode",
    "edinetCode",
];
const SECURITIES_CODE_COLUMNS: &[&str] = &[
    "証券コード",
    "securities_code",
    "SecuritiesCode",
    "securitiesCode",
    "sec_code",
];
const NAME_COLUMNS: &[&str] = &["提出者名", "会社名", "会社名称", "FilerName", "filer_name", "name"];
const MARKET_COLUMNS: &[&str] = &["上場市場", "市場区分", "市場", "Market", "market"];
const SECTOR_COLUMNS: &[&str] = &["業種", "提出者業種", "33業種区分", "Industry", "sector", "セクター"];

const LISTING_CODE_COLUMNS: &[&str] = &["コード", "銘柄コード", "証券コード", "Code"];
const LISTING_MARKET_COLUMNS: &[&str] = &["市場・商品区分", "市場区分", "市場", "Market"];
const LISTING_SECTOR_COLUMNS: &[&str] = &["33業種区分", "業種", "セクター"];

/// One company from the EDINET code list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeListEntry {
    /// Normalised securities code
    pub securities_code: Option<String>,
    /// Filer name
    pub company_name: Option<String>,
    /// Market label
    pub market: Option<String>,
    /// Sector label
    pub sector: Option<String>,
}

/// One issue from the market listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingEntry {
    /// Market label (e.g. `プライム（内国株式）`)
    pub market: Option<String>,
    /// Sector label
    pub sector: Option<String>,
}

/// How a header is matched against candidate names.
#[derive(Debug, Clone, Copy)]
struct ColumnSpec {
    exact: &'static [&'static str],
    contains: &'static [&'static str],
}

impl ColumnSpec {
    const fn exact(exact: &'static [&'static str]) -> Self {
        Self { exact, contains: &[] }
    }

    const fn with_contains(exact: &'static [&'static str], contains: &'static [&'static str]) -> Self {
        Self { exact, contains }
    }

    fn matches(&self, header: &str) -> bool {
        self.exact.contains(&header) || self.contains.iter().any(|c| header.contains(c))
    }

    /// Index of the first header (left to right) that matches.
    fn find(&self, headers: &[String]) -> Option<usize> {
        headers.iter().position(|h| self.matches(h))
    }
}

/// Read every record of a CSV file as cleaned strings.
fn read_rows(path: &Path) -> Result<Vec<Vec<String>>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(clean_cell).collect());
    }
    Ok(rows)
}

fn clean_cell(cell: &str) -> String {
    cell.trim().trim_start_matches('\u{feff}').trim().to_string()
}

/// Split rows into (headers, data rows), locating the header by its key column.
fn split_header(rows: Vec<Vec<String>>, key: &ColumnSpec) -> Option<(Vec<String>, Vec<Vec<String>>)> {
    let header_index = rows
        .iter()
        .take(HEADER_SEARCH_ROWS)
        .position(|row| key.find(row).is_some())?;

    let mut rows = rows.into_iter().skip(header_index);
    let headers = rows.next()?;
    Some((headers, rows.collect()))
}

fn cell(row: &[String], index: Option<usize>) -> Option<String> {
    index
        .and_then(|i| row.get(i))
        .filter(|v| !v.is_empty())
        .cloned()
}

/// Load the EDINET code list, keyed by EDINET code.
///
/// A file without a recognisable EDINET code column yields an empty map.
pub fn load_edinet_code_list(path: &Path) -> Result<HashMap<String, CodeListEntry>, csv::Error> {
    let key = ColumnSpec::exact(EDINET_CODE_COLUMNS);
    let Some((headers, rows)) = split_header(read_rows(path)?, &key) else {
        tracing::warn!(path = %path.display(), "EDINET code column not found in CSV headers");
        return Ok(HashMap::new());
    };

    let edinet_idx = key.find(&headers);
    let sec_idx = ColumnSpec::exact(SECURITIES_CODE_COLUMNS).find(&headers);
    let name_idx = ColumnSpec::with_contains(NAME_COLUMNS, &["提出者名"]).find(&headers);
    let market_idx = ColumnSpec::with_contains(MARKET_COLUMNS, &["市場"]).find(&headers);
    let sector_idx = ColumnSpec::with_contains(SECTOR_COLUMNS, &["業種", "セクター"]).find(&headers);

    let mut entries = HashMap::new();
    for row in rows {
        let Some(edinet_code) = cell(&row, edinet_idx) else {
            continue;
        };
        entries.insert(
            edinet_code,
            CodeListEntry {
                securities_code: cell(&row, sec_idx).and_then(|c| normalize_sec_code(&c)),
                company_name: cell(&row, name_idx),
                market: cell(&row, market_idx),
                sector: cell(&row, sector_idx),
            },
        );
    }

    tracing::debug!(path = %path.display(), companies = entries.len(), "loaded EDINET code list");
    Ok(entries)
}

/// Load a market listing, keyed by normalised securities code.
pub fn load_market_listing(path: &Path) -> Result<HashMap<String, ListingEntry>, csv::Error> {
    let key = ColumnSpec::exact(LISTING_CODE_COLUMNS);
    let Some((headers, rows)) = split_header(read_rows(path)?, &key) else {
        tracing::warn!(path = %path.display(), "code column not found in market listing headers");
        return Ok(HashMap::new());
    };

    let code_idx = key.find(&headers);
    let market_idx = ColumnSpec::exact(LISTING_MARKET_COLUMNS).find(&headers);
    let sector_idx = ColumnSpec::exact(LISTING_SECTOR_COLUMNS).find(&headers);

    let mut entries = HashMap::new();
    for row in rows {
        let Some(code) = cell(&row, code_idx).and_then(|c| normalize_sec_code(&c)) else {
            continue;
        };
        entries.insert(
            code,
            ListingEntry {
                market: cell(&row, market_idx),
                sector: cell(&row, sector_idx),
            },
        );
    }
    Ok(entries)
}

/// Load index members: the first column of every row whose first column is
/// all digits, zero-padded to 4 digits. Header rows are skipped.
pub fn load_index_members(path: &Path) -> Result<HashSet<String>, csv::Error> {
    let members = read_rows(path)?
        .into_iter()
        .filter_map(|row| row.into_iter().next())
        .filter(|code| !code.is_empty() && code.chars().all(|c| c.is_ascii_digit()))
        .filter_map(|code| normalize_sec_code(&code))
        .collect();
    Ok(members)
}
