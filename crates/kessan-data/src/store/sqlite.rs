//! SQLite store for filings, the company master and listing gaps.

use crate::edinet::fundamentals::{ExtractionStatus, FactField, FinancialFacts};
use crate::error::{DataError, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::time::Duration;

/// How long a writer waits for a lock held by another connection.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Columns of `edinet_documents` other than `doc_id`, with their types.
///
/// Used both for writes and for migrating tables created by older versions.
const DOCUMENT_COLUMNS: [(&str, &str); 31] = [
    ("fetched_date", "TEXT"),
    ("edinet_code", "TEXT"),
    ("sec_code", "TEXT"),
    ("filer_name", "TEXT"),
    ("doc_description", "TEXT"),
    ("submit_datetime", "TEXT"),
    ("period_end", "TEXT"),
    ("sales_amount", "REAL"),
    ("operating_income", "REAL"),
    ("ordinary_income", "REAL"),
    ("net_income", "REAL"),
    ("total_assets", "REAL"),
    ("total_liabilities", "REAL"),
    ("total_equity", "REAL"),
    ("cash_and_equivalents", "REAL"),
    ("operating_cf", "REAL"),
    ("investing_cf", "REAL"),
    ("financing_cf", "REAL"),
    ("eps", "REAL"),
    ("bps", "REAL"),
    ("roe", "REAL"),
    ("roa", "REAL"),
    ("employee_count", "INTEGER"),
    ("operating_margin", "REAL"),
    ("net_margin", "REAL"),
    ("equity_ratio", "REAL"),
    ("cash_ratio", "REAL"),
    ("extraction_status", "TEXT"),
    ("extraction_error", "TEXT"),
    ("all_numeric_facts_json", "TEXT"),
    ("raw_json", "TEXT"),
];

/// One `edinet_documents` row.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRow {
    /// Document id (primary key)
    pub doc_id: String,
    /// Listing day the document was found on
    pub fetched_date: NaiveDate,
    /// Filer code
    pub edinet_code: String,
    /// Normalised securities code
    pub sec_code: Option<String>,
    /// Filer name
    pub filer_name: Option<String>,
    /// Document description
    pub doc_description: Option<String>,
    /// Submission timestamp as listed
    pub submit_datetime: Option<String>,
    /// Reporting period end
    pub period_end: Option<String>,
    /// Extracted facts
    pub facts: FinancialFacts,
    /// Operating income / revenue
    pub operating_margin: Option<f64>,
    /// Net income / revenue
    pub net_margin: Option<f64>,
    /// Total equity / total assets
    pub equity_ratio: Option<f64>,
    /// Cash and equivalents / total assets
    pub cash_ratio: Option<f64>,
    /// Extraction outcome
    pub status: ExtractionStatus,
    /// Error message for failed extractions
    pub error: Option<String>,
    /// Every numeric fact, in full-capture mode
    pub all_numeric_facts_json: Option<String>,
    /// Listing payload
    pub raw_json: String,
}

/// Values offered to `master_company` for one company.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompanyRecord {
    /// EDINET code (primary key)
    pub edinet_code: String,
    /// Securities code
    pub securities_code: Option<String>,
    /// Company name
    pub company_name: Option<String>,
    /// Market label (e.g. `プライム（内国株式）`)
    pub market: Option<String>,
    /// Sector label
    pub sector: Option<String>,
    /// Index group label (e.g. `Nikkei225`)
    pub group_name: Option<String>,
}

/// A `master_company` row as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCompany {
    /// Stored values
    pub record: CompanyRecord,
    /// Last time the row was upserted (RFC 3339)
    pub updated_at: Option<String>,
}

/// A day whose listing could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingGap {
    /// Listing day
    pub date: NaiveDate,
    /// Attempts made in the failing run
    pub attempts: u32,
    /// Last error
    pub error: String,
    /// When the gap was recorded (RFC 3339)
    pub recorded_at: String,
}

/// Short view of a document for audit output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSummary {
    /// Document id
    pub doc_id: String,
    /// Listing day
    pub fetched_date: String,
    /// Filer code
    pub edinet_code: Option<String>,
    /// Extraction status
    pub status: Option<String>,
    /// Error message
    pub error: Option<String>,
}

/// Membership rows of an index table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexMembers {
    /// Normalised securities codes
    pub sec_codes: Vec<String>,
    /// Newest `fetched_at` value, if any
    pub newest: Option<String>,
}

/// Row counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Rows in `edinet_documents`
    pub documents: i64,
    /// Rows in `master_company`
    pub companies: i64,
    /// Rows in `listing_gaps`
    pub gaps: i64,
}

/// SQLite store.
#[derive(Debug)]
pub struct FilingStore {
    conn: Connection,
    /// Older tables carry a NOT NULL `fetched_at` column that must be filled
    legacy_fetched_at: bool,
}

impl FilingStore {
    /// Open (or create) a store.
    ///
    /// # Arguments
    /// * `path` - Path to the SQLite database file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mut store = Self {
            conn,
            legacy_fetched_at: false,
        };
        store.initialize_schema()?;
        store.migrate()?;
        Ok(store)
    }

    /// Initialize the database schema.
    fn initialize_schema(&self) -> Result<()> {
        let columns: Vec<String> = DOCUMENT_COLUMNS
            .iter()
            .map(|(name, ty)| match *name {
                "fetched_date" | "edinet_code" | "raw_json" => format!("{} {} NOT NULL", name, ty),
                _ => format!("{} {}", name, ty),
            })
            .collect();

        self.conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS edinet_documents (
                    doc_id TEXT PRIMARY KEY,
                    {}
                )",
                columns.join(",\n                    ")
            ),
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS master_company (
                edinet_code TEXT PRIMARY KEY,
                securities_code TEXT,
                company_name TEXT,
                market TEXT,
                sector TEXT,
                group_name TEXT,
                updated_at TEXT
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_master_company_securities
             ON master_company (securities_code)",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS listing_gaps (
                date TEXT PRIMARY KEY,
                attempts INTEGER NOT NULL,
                error TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    /// Add columns missing from an `edinet_documents` table written by an
    /// older version.
    fn migrate(&mut self) -> Result<()> {
        let existing = self.table_columns("edinet_documents")?;

        if !existing.iter().any(|c| c == "doc_id") {
            return Err(DataError::Parse(
                "edinet_documents has no doc_id column".to_string(),
            ));
        }

        for (name, ty) in DOCUMENT_COLUMNS {
            if !existing.iter().any(|c| c == name) {
                tracing::info!(column = name, "adding missing column to edinet_documents");
                self.conn.execute(
                    &format!("ALTER TABLE edinet_documents ADD COLUMN {} {}", name, ty),
                    [],
                )?;
            }
        }

        self.legacy_fetched_at = existing.iter().any(|c| c == "fetched_at");
        Ok(())
    }

    fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", table))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(columns)
    }

    /// Write one document and its company master entry in one transaction.
    pub fn upsert_document(&self, row: &DocumentRow, company: &CompanyRecord) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        self.write_document(row)?;
        upsert_company(&self.conn, company)?;
        tx.commit()?;
        Ok(())
    }

    fn write_document(&self, row: &DocumentRow) -> Result<()> {
        let facts = &row.facts;
        let mut columns: Vec<&str> = std::iter::once("doc_id")
            .chain(DOCUMENT_COLUMNS.iter().map(|(name, _)| *name))
            .collect();
        let fetched_at = Utc::now().to_rfc3339();
        if self.legacy_fetched_at {
            columns.push("fetched_at");
        }
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT OR REPLACE INTO edinet_documents ({}) VALUES ({})",
            columns.join(", "),
            placeholders
        );

        let fetched_date = row.fetched_date.format("%Y-%m-%d").to_string();
        let mut values: Vec<&dyn rusqlite::ToSql> = vec![
            &row.doc_id,
            &fetched_date,
            &row.edinet_code,
            &row.sec_code,
            &row.filer_name,
            &row.doc_description,
            &row.submit_datetime,
            &row.period_end,
            &facts.sales_amount,
            &facts.operating_income,
            &facts.ordinary_income,
            &facts.net_income,
            &facts.total_assets,
            &facts.total_liabilities,
            &facts.total_equity,
            &facts.cash_and_equivalents,
            &facts.operating_cf,
            &facts.investing_cf,
            &facts.financing_cf,
            &facts.eps,
            &facts.bps,
            &facts.roe,
            &facts.roa,
            &facts.employee_count,
            &row.operating_margin,
            &row.net_margin,
            &row.equity_ratio,
            &row.cash_ratio,
        ];
        let status = row.status.as_str();
        values.push(&status);
        values.push(&row.error);
        values.push(&row.all_numeric_facts_json);
        values.push(&row.raw_json);
        if self.legacy_fetched_at {
            values.push(&fetched_at);
        }

        self.conn.execute(&sql, values.as_slice())?;
        Ok(())
    }

    /// Offer company values to `master_company` outside a document write.
    pub fn upsert_company(&self, company: &CompanyRecord) -> Result<()> {
        upsert_company(&self.conn, company)
    }

    /// Read a document back.
    pub fn document(&self, doc_id: &str) -> Result<Option<DocumentRow>> {
        let columns: Vec<&str> = std::iter::once("doc_id")
            .chain(DOCUMENT_COLUMNS.iter().map(|(name, _)| *name))
            .collect();
        let sql = format!(
            "SELECT {} FROM edinet_documents WHERE doc_id = ?1",
            columns.join(", ")
        );

        let row = self
            .conn
            .query_row(&sql, params![doc_id], read_document)
            .optional()?;

        row.map(|(mut row, fetched_date, status)| -> Result<DocumentRow> {
            row.fetched_date = NaiveDate::parse_from_str(&fetched_date, "%Y-%m-%d")
                .map_err(|e| DataError::Parse(format!("Invalid fetched_date {}: {}", fetched_date, e)))?;
            row.status = ExtractionStatus::from_db_str(status.as_deref().unwrap_or("partial"))?;
            Ok(row)
        })
        .transpose()
    }

    /// Read a company master row.
    pub fn company(&self, edinet_code: &str) -> Result<Option<StoredCompany>> {
        let company = self
            .conn
            .query_row(
                "SELECT edinet_code, securities_code, company_name, market, sector, group_name, updated_at
                 FROM master_company WHERE edinet_code = ?1",
                params![edinet_code],
                read_company,
            )
            .optional()?;
        Ok(company)
    }

    /// Every company master row.
    pub fn companies(&self) -> Result<Vec<StoredCompany>> {
        let mut stmt = self.conn.prepare(
            "SELECT edinet_code, securities_code, company_name, market, sector, group_name, updated_at
             FROM master_company ORDER BY edinet_code",
        )?;
        let rows = stmt
            .query_map([], read_company)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Whether a table exists.
    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Members of an index table (`sec_code`, `fetched_at` columns).
    ///
    /// Returns `None` when the table does not exist.
    pub fn index_members(&self, table: &str) -> Result<Option<IndexMembers>> {
        if !is_identifier(table) {
            return Err(DataError::Parse(format!("Invalid table name: {}", table)));
        }
        if !self.table_exists(table)? {
            return Ok(None);
        }

        let mut stmt = self
            .conn
            .prepare(&format!("SELECT sec_code, fetched_at FROM {}", table))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, Option<String>>(0)?, row.get::<_, Option<String>>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut members = IndexMembers::default();
        for (code, fetched_at) in rows {
            if let Some(code) = code.as_deref().and_then(crate::edinet::normalize_sec_code) {
                members.sec_codes.push(code);
            }
            if fetched_at > members.newest {
                members.newest = fetched_at;
            }
        }
        Ok(Some(members))
    }

    /// Record a day whose listing failed.
    pub fn record_gap(&self, date: NaiveDate, attempts: u32, error: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO listing_gaps (date, attempts, error, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                date.format("%Y-%m-%d").to_string(),
                attempts,
                error,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Remove the gap for a day that has now been listed.
    pub fn clear_gap(&self, date: NaiveDate) -> Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM listing_gaps WHERE date = ?1",
            params![date.format("%Y-%m-%d").to_string()],
        )?;
        Ok(removed > 0)
    }

    /// Recorded listing gaps, oldest day first.
    pub fn gaps(&self) -> Result<Vec<ListingGap>> {
        let mut stmt = self
            .conn
            .prepare("SELECT date, attempts, error, recorded_at FROM listing_gaps ORDER BY date")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(date, attempts, error, recorded_at)| {
                let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                    .map_err(|e| DataError::Parse(format!("Invalid gap date {}: {}", date, e)))?;
                Ok(ListingGap {
                    date,
                    attempts,
                    error,
                    recorded_at,
                })
            })
            .collect()
    }

    /// Documents whose status is one of `statuses`, ordered by day and id.
    pub fn documents_with_status(&self, statuses: &[ExtractionStatus]) -> Result<Vec<DocumentSummary>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (1..=statuses.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT doc_id, fetched_date, edinet_code, extraction_status, extraction_error
             FROM edinet_documents
             WHERE extraction_status IN ({})
             ORDER BY fetched_date, doc_id",
            placeholders
        );
        let values: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(values), |row| {
                Ok(DocumentSummary {
                    doc_id: row.get(0)?,
                    fetched_date: row.get(1)?,
                    edinet_code: row.get(2)?,
                    status: row.get(3)?,
                    error: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Number of documents per extraction status.
    pub fn status_counts(&self) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT COALESCE(extraction_status, 'unknown'), COUNT(*)
             FROM edinet_documents
             GROUP BY 1
             ORDER BY 1",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Row counts of the three tables.
    pub fn stats(&self) -> Result<StoreStats> {
        let count = |table: &str| -> Result<i64> {
            Ok(self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?)
        };
        Ok(StoreStats {
            documents: count("edinet_documents")?,
            companies: count("master_company")?,
            gaps: count("listing_gaps")?,
        })
    }
}

/// Fill-only upsert of a company master row.
///
/// Securities code, market, sector and group are only written where the
/// stored value is null; the company name takes the newest non-null value.
/// Every upsert refreshes `updated_at`, so a row seen on a run counts as fresh.
fn upsert_company(conn: &Connection, company: &CompanyRecord) -> Result<()> {
    let clean = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    conn.execute(
        "INSERT INTO master_company
            (edinet_code, securities_code, company_name, market, sector, group_name, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(edinet_code) DO UPDATE SET
            securities_code = COALESCE(master_company.securities_code, excluded.securities_code),
            company_name = COALESCE(excluded.company_name, master_company.company_name),
            market = COALESCE(master_company.market, excluded.market),
            sector = COALESCE(master_company.sector, excluded.sector),
            group_name = COALESCE(master_company.group_name, excluded.group_name),
            updated_at = excluded.updated_at",
        params![
            company.edinet_code,
            clean(&company.securities_code),
            clean(&company.company_name),
            clean(&company.market),
            clean(&company.sector),
            clean(&company.group_name),
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

type DocumentRead = (DocumentRow, String, Option<String>);

fn read_document(row: &Row<'_>) -> rusqlite::Result<DocumentRead> {
    let mut facts = FinancialFacts::default();
    for (offset, field) in FactField::ALL.iter().enumerate() {
        let index = 8 + offset;
        if *field == FactField::EmployeeCount {
            facts.employee_count = row.get(index)?;
        } else if let Some(value) = row.get::<_, Option<f64>>(index)? {
            facts.set(*field, value);
        }
    }
    facts.period_end = row.get(7)?;

    let document = DocumentRow {
        doc_id: row.get(0)?,
        fetched_date: NaiveDate::default(),
        edinet_code: row.get(2)?,
        sec_code: row.get(3)?,
        filer_name: row.get(4)?,
        doc_description: row.get(5)?,
        submit_datetime: row.get(6)?,
        period_end: row.get(7)?,
        facts,
        operating_margin: row.get(24)?,
        net_margin: row.get(25)?,
        equity_ratio: row.get(26)?,
        cash_ratio: row.get(27)?,
        status: ExtractionStatus::Partial,
        error: row.get(29)?,
        all_numeric_facts_json: row.get(30)?,
        raw_json: row.get(31)?,
    };
    Ok((document, row.get(1)?, row.get(28)?))
}

fn read_company(row: &Row<'_>) -> rusqlite::Result<StoredCompany> {
    Ok(StoredCompany {
        record: CompanyRecord {
            edinet_code: row.get(0)?,
            securities_code: row.get(1)?,
            company_name: row.get(2)?,
            market: row.get(3)?,
            sector: row.get(4)?,
            group_name: row.get(5)?,
        },
        updated_at: row.get(6)?,
    })
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 20).unwrap()
    }

    fn sample_row(doc_id: &str) -> DocumentRow {
        let mut facts = FinancialFacts::default();
        facts.set(FactField::SalesAmount, 1000.0);
        facts.set(FactField::OperatingIncome, 100.0);
        facts.set(FactField::EmployeeCount, 250.0);
        facts.period_end = Some("2024-03-31".to_string());

        DocumentRow {
            doc_id: doc_id.to_string(),
            fetched_date: day(),
            edinet_code: "E00001".to_string(),
            sec_code: Some("1301".to_string()),
            filer_name: Some("Sample Co.".to_string()),
            doc_description: Some("有価証券報告書".to_string()),
            submit_datetime: Some("2024-06-20 09:00".to_string()),
            period_end: Some("2024-03-31".to_string()),
            facts,
            operating_margin: Some(0.1),
            net_margin: None,
            equity_ratio: None,
            cash_ratio: None,
            status: ExtractionStatus::Partial,
            error: None,
            all_numeric_facts_json: None,
            raw_json: r#"{"docID":"S1"}"#.to_string(),
        }
    }

    fn company(code: &str) -> CompanyRecord {
        CompanyRecord {
            edinet_code: code.to_string(),
            ..CompanyRecord::default()
        }
    }

    #[test]
    fn test_document_roundtrip() {
        let store = FilingStore::in_memory().unwrap();
        let row = sample_row("S100AAAA");
        store.upsert_document(&row, &company("E00001")).unwrap();

        let stored = store.document("S100AAAA").unwrap().unwrap();
        assert_eq!(stored, row);
        assert!(store.document("missing").unwrap().is_none());
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edinet.db");
        let row = sample_row("S100FILE");
        {
            let store = FilingStore::open(&path).unwrap();
            store.upsert_document(&row, &company("E00001")).unwrap();
            store.record_gap(day(), 3, "HTTP 503").unwrap();
        }

        let reopened = FilingStore::open(&path).unwrap();
        assert_eq!(reopened.document("S100FILE").unwrap(), Some(row));
        assert_eq!(reopened.gaps().unwrap().len(), 1);
    }

    #[test]
    fn test_upsert_replaces_by_doc_id() {
        let store = FilingStore::in_memory().unwrap();
        let mut row = sample_row("S100AAAA");
        store.upsert_document(&row, &company("E00001")).unwrap();

        row.status = ExtractionStatus::FetchFailed;
        row.error = Some("HTTP 503".to_string());
        store.upsert_document(&row, &company("E00001")).unwrap();

        assert_eq!(store.stats().unwrap().documents, 1);
        let stored = store.document("S100AAAA").unwrap().unwrap();
        assert_eq!(stored.status, ExtractionStatus::FetchFailed);

        let failed = store
            .documents_with_status(&[ExtractionStatus::FetchFailed, ExtractionStatus::ParseFailed])
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].error.as_deref(), Some("HTTP 503"));
    }

    #[test]
    fn test_company_never_downgraded() {
        let store = FilingStore::in_memory().unwrap();
        store
            .upsert_company(&CompanyRecord {
                edinet_code: "E00001".to_string(),
                securities_code: Some("1301".to_string()),
                company_name: Some("Old Name".to_string()),
                market: Some("プライム（内国株式）".to_string()),
                sector: None,
                group_name: Some("Nikkei225".to_string()),
            })
            .unwrap();

        store
            .upsert_company(&CompanyRecord {
                edinet_code: "E00001".to_string(),
                securities_code: None,
                company_name: Some("New Name".to_string()),
                market: Some("スタンダード（内国株式）".to_string()),
                sector: Some("水産・農林業".to_string()),
                group_name: Some("".to_string()),
            })
            .unwrap();

        let stored = store.company("E00001").unwrap().unwrap().record;
        assert_eq!(stored.securities_code.as_deref(), Some("1301"));
        assert_eq!(stored.company_name.as_deref(), Some("New Name"));
        assert_eq!(stored.market.as_deref(), Some("プライム（内国株式）"));
        assert_eq!(stored.sector.as_deref(), Some("水産・農林業"));
        assert_eq!(stored.group_name.as_deref(), Some("Nikkei225"));
    }

    #[test]
    fn test_company_reupsert_refreshes_timestamp() {
        let store = FilingStore::in_memory().unwrap();
        let record = CompanyRecord {
            edinet_code: "E00002".to_string(),
            securities_code: Some("7203".to_string()),
            company_name: Some("Sample".to_string()),
            ..CompanyRecord::default()
        };
        store.upsert_company(&record).unwrap();
        store
            .conn
            .execute(
                "UPDATE master_company SET updated_at = '2000-01-01T00:00:00+00:00' WHERE edinet_code = 'E00002'",
                [],
            )
            .unwrap();

        store.upsert_company(&record).unwrap();
        let company = store.company("E00002").unwrap().unwrap();

        assert_ne!(company.updated_at.as_deref(), Some("2000-01-01T00:00:00+00:00"));
        assert_eq!(company.record.securities_code.as_deref(), Some("7203"));
    }

    #[test]
    fn test_gaps_recorded_and_cleared() {
        let store = FilingStore::in_memory().unwrap();
        store.record_gap(day(), 3, "HTTP 503").unwrap();
        store.record_gap(day(), 3, "timeout").unwrap();

        let gaps = store.gaps().unwrap();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].error, "timeout");
        assert_eq!(gaps[0].attempts, 3);

        assert!(store.clear_gap(day()).unwrap());
        assert!(!store.clear_gap(day()).unwrap());
        assert!(store.gaps().unwrap().is_empty());
    }

    #[test]
    fn test_index_members() {
        let store = FilingStore::in_memory().unwrap();
        assert!(store.index_members("nikkei225").unwrap().is_none());
        assert!(store.index_members("bad name;").is_err());

        store
            .conn
            .execute_batch(
                "CREATE TABLE nikkei225 (sec_code TEXT PRIMARY KEY, company_name TEXT,
                     as_of TEXT, source_url TEXT, fetched_at TEXT);
                 INSERT INTO nikkei225 VALUES ('7203', 'Toyota', NULL, NULL, '2024-06-01T00:00:00+00:00');
                 INSERT INTO nikkei225 VALUES ('99840', 'SoftBank', NULL, NULL, '2024-06-02T00:00:00+00:00');",
            )
            .unwrap();

        let members = store.index_members("nikkei225").unwrap().unwrap();
        assert_eq!(members.sec_codes, vec!["7203".to_string(), "9984".to_string()]);
        assert_eq!(members.newest.as_deref(), Some("2024-06-02T00:00:00+00:00"));
    }

    #[test]
    fn test_migrates_legacy_table() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE edinet_documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                fetched_date TEXT NOT NULL,
                doc_id TEXT,
                edinet_code TEXT,
                filer_name TEXT,
                doc_description TEXT,
                submit_datetime TEXT,
                sales_amount REAL,
                gross_margin REAL,
                raw_json TEXT NOT NULL,
                fetched_at TEXT NOT NULL
            );
            CREATE UNIQUE INDEX idx_edinet_documents_doc_id ON edinet_documents (doc_id);",
        )
        .unwrap();

        let store = FilingStore::from_connection(conn).unwrap();
        let columns = store.table_columns("edinet_documents").unwrap();
        assert!(columns.iter().any(|c| c == "extraction_status"));
        assert!(columns.iter().any(|c| c == "sec_code"));

        let row = sample_row("S100LEGACY");
        store.upsert_document(&row, &company("E00001")).unwrap();
        store.upsert_document(&row, &company("E00001")).unwrap();
        assert_eq!(store.stats().unwrap().documents, 1);
    }

    #[test]
    fn test_status_counts() {
        let store = FilingStore::in_memory().unwrap();
        let mut a = sample_row("S1");
        a.status = ExtractionStatus::Ok;
        let mut b = sample_row("S2");
        b.status = ExtractionStatus::NoXbrl;
        let mut c = sample_row("S3");
        c.status = ExtractionStatus::NoXbrl;
        for row in [&a, &b, &c] {
            store.upsert_document(row, &company("E00001")).unwrap();
        }

        let counts = store.status_counts().unwrap();
        assert_eq!(
            counts,
            vec![("no_xbrl".to_string(), 2), ("ok".to_string(), 1)]
        );
    }
}
