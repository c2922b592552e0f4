//! Financial fact extraction from EDINET XBRL instances.
//!
//! Filers report the same figure under different element names depending on
//! the accounting standard (Japanese GAAP `jppfs_cor`, IFRS `jpigp_cor`) and
//! on where in the report it appears (summary of business results,
//! `jpcrp_cor`). A [`TagTable`] lists, for every target field, the element
//! names to try in order.

use crate::edinet::xbrl::{XbrlFact, XbrlInstance, extract_instance};
use crate::error::{DataError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Built-in tag candidate table.
const BUILTIN_TAG_TABLE: &str = include_str!("../../data/tag_candidates.json");

/// The sixteen extracted financial fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FactField {
    /// Revenue / net sales
    SalesAmount,
    /// Operating income
    OperatingIncome,
    /// Ordinary income (Japanese GAAP only)
    OrdinaryIncome,
    /// Net income attributable to owners
    NetIncome,
    /// Total assets
    TotalAssets,
    /// Total liabilities
    TotalLiabilities,
    /// Total equity / net assets
    TotalEquity,
    /// Cash and cash equivalents
    CashAndEquivalents,
    /// Operating cash flow
    OperatingCf,
    /// Investing cash flow
    InvestingCf,
    /// Financing cash flow
    FinancingCf,
    /// Earnings per share
    Eps,
    /// Book value per share
    Bps,
    /// Return on equity
    Roe,
    /// Return on assets
    Roa,
    /// Number of employees
    EmployeeCount,
}

impl FactField {
    /// All fields, in storage column order.
    pub const ALL: [Self; 16] = [
        Self::SalesAmount,
        Self::OperatingIncome,
        Self::OrdinaryIncome,
        Self::NetIncome,
        Self::TotalAssets,
        Self::TotalLiabilities,
        Self::TotalEquity,
        Self::CashAndEquivalents,
        Self::OperatingCf,
        Self::InvestingCf,
        Self::FinancingCf,
        Self::Eps,
        Self::Bps,
        Self::Roe,
        Self::Roa,
        Self::EmployeeCount,
    ];

    /// Column name in `edinet_documents` and key in the tag table.
    pub const fn column(&self) -> &'static str {
        match self {
            Self::SalesAmount => "sales_amount",
            Self::OperatingIncome => "operating_income",
            Self::OrdinaryIncome => "ordinary_income",
            Self::NetIncome => "net_income",
            Self::TotalAssets => "total_assets",
            Self::TotalLiabilities => "total_liabilities",
            Self::TotalEquity => "total_equity",
            Self::CashAndEquivalents => "cash_and_equivalents",
            Self::OperatingCf => "operating_cf",
            Self::InvestingCf => "investing_cf",
            Self::FinancingCf => "financing_cf",
            Self::Eps => "eps",
            Self::Bps => "bps",
            Self::Roe => "roe",
            Self::Roa => "roa",
            Self::EmployeeCount => "employee_count",
        }
    }

    /// Look a field up by column name.
    pub fn from_column(column: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.column() == column)
    }
}

impl fmt::Display for FactField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.column())
    }
}

/// Ordered element-name candidates per field.
///
/// Loaded from a JSON object mapping column names to arrays of element
/// local names. Names are matched case-insensitively; the first candidate
/// with any fact in the instance wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagTable {
    candidates: HashMap<FactField, Vec<String>>,
}

impl TagTable {
    /// The table embedded at build time.
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_TAG_TABLE)
    }

    /// Parse a table from JSON.
    ///
    /// # Errors
    /// Unknown field names and invalid JSON are rejected.
    pub fn from_json(json: &str) -> Result<Self> {
        let parsed: HashMap<String, Vec<String>> = serde_json::from_str(json)?;

        let mut candidates = HashMap::new();
        for (column, names) in parsed {
            let field = FactField::from_column(&column)
                .ok_or_else(|| DataError::Parse(format!("Unknown field in tag table: {}", column)))?;
            let names = names
                .into_iter()
                .map(|n| n.trim().to_ascii_lowercase())
                .filter(|n| !n.is_empty())
                .collect();
            candidates.insert(field, names);
        }

        Ok(Self { candidates })
    }

    /// Read a table from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Candidates for `field`, lowercased, in priority order.
    pub fn candidates(&self, field: FactField) -> &[String] {
        self.candidates.get(&field).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Extracted values of the sixteen target fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FinancialFacts {
    /// Revenue / net sales
    pub sales_amount: Option<f64>,
    /// Operating income
    pub operating_income: Option<f64>,
    /// Ordinary income
    pub ordinary_income: Option<f64>,
    /// Net income
    pub net_income: Option<f64>,
    /// Total assets
    pub total_assets: Option<f64>,
    /// Total liabilities
    pub total_liabilities: Option<f64>,
    /// Total equity
    pub total_equity: Option<f64>,
    /// Cash and cash equivalents
    pub cash_and_equivalents: Option<f64>,
    /// Operating cash flow
    pub operating_cf: Option<f64>,
    /// Investing cash flow
    pub investing_cf: Option<f64>,
    /// Financing cash flow
    pub financing_cf: Option<f64>,
    /// Earnings per share
    pub eps: Option<f64>,
    /// Book value per share
    pub bps: Option<f64>,
    /// Return on equity
    pub roe: Option<f64>,
    /// Return on assets
    pub roa: Option<f64>,
    /// Number of employees
    pub employee_count: Option<i64>,
    /// Latest period end among the selected facts
    pub period_end: Option<String>,
}

impl FinancialFacts {
    /// Value of `field` as a float.
    pub fn get(&self, field: FactField) -> Option<f64> {
        match field {
            FactField::SalesAmount => self.sales_amount,
            FactField::OperatingIncome => self.operating_income,
            FactField::OrdinaryIncome => self.ordinary_income,
            FactField::NetIncome => self.net_income,
            FactField::TotalAssets => self.total_assets,
            FactField::TotalLiabilities => self.total_liabilities,
            FactField::TotalEquity => self.total_equity,
            FactField::CashAndEquivalents => self.cash_and_equivalents,
            FactField::OperatingCf => self.operating_cf,
            FactField::InvestingCf => self.investing_cf,
            FactField::FinancingCf => self.financing_cf,
            FactField::Eps => self.eps,
            FactField::Bps => self.bps,
            FactField::Roe => self.roe,
            FactField::Roa => self.roa,
            FactField::EmployeeCount => self.employee_count.map(|n| n as f64),
        }
    }

    /// Set `field`. Employee count is truncated to an integer.
    pub fn set(&mut self, field: FactField, value: f64) {
        let slot = match field {
            FactField::SalesAmount => &mut self.sales_amount,
            FactField::OperatingIncome => &mut self.operating_income,
            FactField::OrdinaryIncome => &mut self.ordinary_income,
            FactField::NetIncome => &mut self.net_income,
            FactField::TotalAssets => &mut self.total_assets,
            FactField::TotalLiabilities => &mut self.total_liabilities,
            FactField::TotalEquity => &mut self.total_equity,
            FactField::CashAndEquivalents => &mut self.cash_and_equivalents,
            FactField::OperatingCf => &mut self.operating_cf,
            FactField::InvestingCf => &mut self.investing_cf,
            FactField::FinancingCf => &mut self.financing_cf,
            FactField::Eps => &mut self.eps,
            FactField::Bps => &mut self.bps,
            FactField::Roe => &mut self.roe,
            FactField::Roa => &mut self.roa,
            FactField::EmployeeCount => {
                self.employee_count = Some(value.trunc() as i64);
                return;
            }
        };
        *slot = Some(value);
    }

    /// Number of fields with a value.
    pub fn found_count(&self) -> usize {
        FactField::ALL
            .iter()
            .filter(|f| self.get(**f).is_some())
            .count()
    }

    /// Whether every field has a value.
    pub fn is_complete(&self) -> bool {
        self.found_count() == FactField::ALL.len()
    }
}

/// Pick the fact for one field.
///
/// The first candidate name with any fact wins. Among its facts the latest
/// period end wins; ties prefer dimensionless contexts, then consolidated
/// ones. Remaining ties keep document order.
pub fn select_fact<'a>(instance: &'a XbrlInstance, candidates: &[String]) -> Option<&'a XbrlFact> {
    candidates.iter().find_map(|name| {
        instance
            .facts_named(name)
            .fold(None, |best: Option<&'a XbrlFact>, fact| match best {
                Some(current) if preference(fact) <= preference(current) => Some(current),
                _ => Some(fact),
            })
    })
}

fn preference(fact: &XbrlFact) -> (Option<&str>, bool, bool) {
    (fact.period_end.as_deref(), !fact.dimensional, fact.consolidated)
}

/// Extract the sixteen fields from a parsed instance.
pub fn extract_facts(instance: &XbrlInstance, table: &TagTable) -> FinancialFacts {
    let mut facts = FinancialFacts::default();

    for field in FactField::ALL {
        if let Some(fact) = select_fact(instance, table.candidates(field)) {
            facts.set(field, fact.value);
            if fact.period_end > facts.period_end {
                facts.period_end.clone_from(&fact.period_end);
            }
        }
    }

    facts
}

/// Persisted outcome of processing one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExtractionStatus {
    /// Every field found
    Ok,
    /// XBRL parsed, some fields missing
    Partial,
    /// No XBRL attached; nothing fetched
    NoXbrl,
    /// Archive download failed
    FetchFailed,
    /// Archive unreadable or no instance document
    ParseFailed,
}

impl ExtractionStatus {
    /// Value stored in `extraction_status`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Partial => "partial",
            Self::NoXbrl => "no_xbrl",
            Self::FetchFailed => "fetch_failed",
            Self::ParseFailed => "parse_failed",
        }
    }

    /// Parse a stored `extraction_status` value.
    pub fn from_db_str(s: &str) -> Result<Self> {
        match s {
            "ok" => Ok(Self::Ok),
            "partial" => Ok(Self::Partial),
            "no_xbrl" => Ok(Self::NoXbrl),
            "fetch_failed" => Ok(Self::FetchFailed),
            "parse_failed" => Ok(Self::ParseFailed),
            _ => Err(DataError::Parse(format!("Invalid extraction status: {}", s))),
        }
    }

    /// Whether the document needs another attempt.
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::FetchFailed | Self::ParseFailed)
    }
}

impl fmt::Display for ExtractionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage at which a document failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    /// Downloading the archive
    Fetch,
    /// Reading the archive or instance
    Parse,
}

/// Result of fact extraction for one document.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// XBRL was read; fields may still be missing
    Extracted {
        /// Selected facts
        facts: FinancialFacts,
        /// Every numeric fact as JSON, in full-capture mode
        all_facts_json: Option<String>,
    },
    /// The document has no XBRL
    NoXbrl,
    /// Download or parsing failed
    Failed {
        /// Failing stage
        stage: FailureStage,
        /// Error message
        error: String,
    },
}

impl Extraction {
    /// Wrap an error raised while fetching.
    pub fn fetch_failed(error: &DataError) -> Self {
        Self::Failed {
            stage: FailureStage::Fetch,
            error: error.to_string(),
        }
    }

    /// Wrap an error raised while parsing.
    pub fn parse_failed(error: &DataError) -> Self {
        Self::Failed {
            stage: FailureStage::Parse,
            error: error.to_string(),
        }
    }

    /// Status recorded for this outcome.
    pub fn status(&self) -> ExtractionStatus {
        match self {
            Self::Extracted { facts, .. } if facts.is_complete() => ExtractionStatus::Ok,
            Self::Extracted { .. } => ExtractionStatus::Partial,
            Self::NoXbrl => ExtractionStatus::NoXbrl,
            Self::Failed {
                stage: FailureStage::Fetch,
                ..
            } => ExtractionStatus::FetchFailed,
            Self::Failed {
                stage: FailureStage::Parse,
                ..
            } => ExtractionStatus::ParseFailed,
        }
    }

    /// Extracted facts, or all-null facts for the other outcomes.
    pub fn facts(&self) -> FinancialFacts {
        match self {
            Self::Extracted { facts, .. } => facts.clone(),
            _ => FinancialFacts::default(),
        }
    }

    /// Error message for failed outcomes.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Parse an archive and extract facts; never fails, errors become
/// [`Extraction::Failed`].
pub fn extract_from_archive(
    archive: &[u8],
    doc_id: &str,
    table: &TagTable,
    full_capture: bool,
) -> Extraction {
    let instance = match extract_instance(archive, doc_id) {
        Ok(instance) => instance,
        Err(e) => return Extraction::parse_failed(&e),
    };

    let all_facts_json = if full_capture {
        match instance.facts_json() {
            Ok(json) => Some(json),
            Err(e) => return Extraction::parse_failed(&e),
        }
    } else {
        None
    };

    Extraction::Extracted {
        facts: extract_facts(&instance, table),
        all_facts_json,
    }
}
