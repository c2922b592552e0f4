//! One ingest run: list, filter, extract, derive, persist.
//!
//! Listing and filtering run first and materialise the work set. Each
//! accepted filing is then processed end to end by a bounded pool of
//! concurrent workers sharing one store connection.

use crate::config::RunConfig;
use crate::error::PipelineError;
use crate::filter::{Accepted, DocumentFilter};
use crate::lister::{DayOutcome, DocumentLister};
use crate::metrics::DerivedMetrics;
use crate::reference::ReferenceResolver;
use chrono::{NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use kessan_data::DataError;
use kessan_data::edinet::{DisclosureSource, Extraction, ExtractionStatus, Filing, TagTable, extract_from_archive};
use kessan_data::store::{CompanyRecord, DocumentRow, FilingStore};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Key added to `raw_json` when extraction failed.
pub const EXTRACTION_ERROR_KEY: &str = "_extraction_error";

/// Progress reporting hooks for the worker pool.
pub trait Progress: Send + Sync {
    /// The pool is about to process `total` documents.
    fn start(&self, total: u64);
    /// One document finished.
    fn advance(&self, doc_id: &str);
    /// The pool drained.
    fn finish(&self);
}

/// Progress sink that reports nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn start(&self, _total: u64) {}
    fn advance(&self, _doc_id: &str) {}
    fn finish(&self) {}
}

/// A listing day that could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayGap {
    /// Listing day
    pub date: NaiveDate,
    /// Attempts made
    pub attempts: u32,
    /// Last error
    pub error: String,
}

/// Counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Days in the range
    pub days: usize,
    /// Days that could not be listed
    pub gaps: Vec<DayGap>,
    /// Filings listed across all days
    pub listed: usize,
    /// Listing records without a document id or filer code
    pub skipped_records: usize,
    /// Rejected by the category filter
    pub rejected_category: usize,
    /// Rejected by the market filter
    pub rejected_market: usize,
    /// Repeated document ids
    pub duplicates: usize,
    /// Documents processed by the worker pool
    pub processed: usize,
    /// Rows written
    pub persisted: usize,
    /// Rows that failed to write
    pub persist_failures: usize,
    /// Processed documents per extraction status
    pub statuses: BTreeMap<ExtractionStatus, usize>,
}

impl RunSummary {
    /// Documents processed with `status`.
    pub fn count(&self, status: ExtractionStatus) -> usize {
        self.statuses.get(&status).copied().unwrap_or(0)
    }
}

/// Outcome of one worker.
struct Processed {
    status: ExtractionStatus,
    persisted: bool,
}

/// Run the pipeline, loading the tag table and reference data from `config`.
pub async fn run_pipeline<S>(
    source: &S,
    store: Arc<Mutex<FilingStore>>,
    config: &RunConfig,
    progress: &dyn Progress,
) -> Result<RunSummary, PipelineError>
where
    S: DisclosureSource + ?Sized,
{
    config.validate()?;
    let table = Arc::new(config.load_tag_table()?);
    let resolver = {
        let store = store.lock().await;
        ReferenceResolver::load(&store, &config.reference, Utc::now())
    };

    run_pipeline_with(source, store, &resolver, table, config, progress).await
}

/// Run the pipeline with an already loaded resolver and tag table.
pub async fn run_pipeline_with<S>(
    source: &S,
    store: Arc<Mutex<FilingStore>>,
    resolver: &ReferenceResolver,
    table: Arc<TagTable>,
    config: &RunConfig,
    progress: &dyn Progress,
) -> Result<RunSummary, PipelineError>
where
    S: DisclosureSource + ?Sized,
{
    config.validate()?;

    let days = config.days();
    let mut summary = RunSummary {
        days: days.len(),
        ..RunSummary::default()
    };

    tracing::info!(
        start = %config.start_date,
        end = %config.end_date,
        days = days.len(),
        workers = config.workers,
        "starting run"
    );

    let filings = list_days(source, &store, config, days, &mut summary).await?;

    let filter = DocumentFilter::new(&config.category, config.market, resolver);
    let filtered = filter.apply(filings);
    summary.rejected_category = filtered.rejected_category;
    summary.rejected_market = filtered.rejected_market;
    summary.duplicates = filtered.duplicates;

    progress.start(filtered.accepted.len() as u64);

    let results: Vec<Processed> = stream::iter(filtered.accepted)
        .map(|accepted| {
            let store = Arc::clone(&store);
            let table = Arc::clone(&table);
            async move {
                let doc_id = accepted.filing.doc_id.clone();
                let processed = process_document(source, &store, table, config, accepted).await;
                progress.advance(&doc_id);
                processed
            }
        })
        .buffer_unordered(config.workers)
        .collect()
        .await;

    progress.finish();

    for processed in results {
        summary.processed += 1;
        *summary.statuses.entry(processed.status).or_insert(0) += 1;
        if processed.persisted {
            summary.persisted += 1;
        } else {
            summary.persist_failures += 1;
        }
    }

    tracing::info!(
        processed = summary.processed,
        persisted = summary.persisted,
        persist_failures = summary.persist_failures,
        gaps = summary.gaps.len(),
        "run complete"
    );
    Ok(summary)
}

/// List every day, recording and clearing gaps. Fails only on a rejected
/// key or when no day could be listed at all.
async fn list_days<S>(
    source: &S,
    store: &Mutex<FilingStore>,
    config: &RunConfig,
    days: Vec<NaiveDate>,
    summary: &mut RunSummary,
) -> Result<Vec<Filing>, PipelineError>
where
    S: DisclosureSource + ?Sized,
{
    let lister = DocumentLister::new(source, config.retry);
    let mut outcomes = std::pin::pin!(lister.stream(days));
    let mut filings = Vec::new();

    while let Some(outcome) = outcomes.next().await {
        match outcome {
            DayOutcome::Listed {
                date,
                filings: day_filings,
                skipped,
            } => {
                summary.listed += day_filings.len();
                summary.skipped_records += skipped;
                filings.extend(day_filings);

                match store.lock().await.clear_gap(date) {
                    Ok(true) => tracing::info!(%date, "listing gap cleared"),
                    Ok(false) => {}
                    Err(e) => tracing::warn!(%date, error = %e, "failed to clear listing gap"),
                }
            }
            DayOutcome::Gap {
                date,
                attempts,
                error,
            } => {
                if let DataError::Authentication(status) = &error {
                    return Err(PipelineError::Authentication(*status));
                }

                let message = error.to_string();
                if let Err(e) = store.lock().await.record_gap(date, attempts, &message) {
                    tracing::warn!(%date, error = %e, "failed to record listing gap");
                }
                summary.gaps.push(DayGap {
                    date,
                    attempts,
                    error: message,
                });
            }
        }
    }

    if summary.days > 0 && summary.gaps.len() == summary.days {
        let last_error = summary
            .gaps
            .last()
            .map(|g| g.error.clone())
            .unwrap_or_default();
        return Err(PipelineError::ApiUnreachable {
            days: summary.days,
            last_error,
        });
    }

    Ok(filings)
}

/// Fetch, parse, derive and persist one filing.
async fn process_document<S>(
    source: &S,
    store: &Mutex<FilingStore>,
    table: Arc<TagTable>,
    config: &RunConfig,
    accepted: Accepted,
) -> Processed
where
    S: DisclosureSource + ?Sized,
{
    let Accepted { filing, resolution } = accepted;
    let extraction = extract(source, table, config, &filing).await;
    let status = extraction.status();

    if let Some(error) = extraction.error() {
        tracing::warn!(doc_id = %filing.doc_id, %status, error, "extraction failed");
    } else {
        tracing::debug!(doc_id = %filing.doc_id, %status, "extracted");
    }

    let company = CompanyRecord {
        edinet_code: filing.edinet_code.clone(),
        securities_code: resolution.securities_code.clone(),
        company_name: resolution.company_name.clone().or_else(|| filing.filer_name.clone()),
        market: resolution.market.clone(),
        sector: resolution.sector.clone(),
        group_name: resolution.group_name().map(str::to_string),
    };

    let row = match build_row(filing, extraction) {
        Ok(row) => row,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialise document row");
            return Processed {
                status,
                persisted: false,
            };
        }
    };

    let persisted = match store.lock().await.upsert_document(&row, &company) {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(doc_id = %row.doc_id, error = %e, "failed to persist document");
            false
        }
    };

    Processed { status, persisted }
}

/// Download and parse the archive, or skip when the filing has no XBRL.
async fn extract<S>(source: &S, table: Arc<TagTable>, config: &RunConfig, filing: &Filing) -> Extraction
where
    S: DisclosureSource + ?Sized,
{
    if !filing.xbrl_available {
        return Extraction::NoXbrl;
    }

    let archive = match config
        .retry
        .run("archive download", || source.download_archive(&filing.doc_id))
        .await
        .into_result()
    {
        Ok(archive) => archive,
        Err(e) => return Extraction::fetch_failed(&e),
    };

    let doc_id = filing.doc_id.clone();
    let full_capture = config.full_capture;
    let parsed = tokio::task::spawn_blocking(move || {
        extract_from_archive(&archive, &doc_id, &table, full_capture)
    })
    .await;

    match parsed {
        Ok(extraction) => extraction,
        Err(e) => Extraction::parse_failed(&DataError::XmlParse(format!("parser task failed: {}", e))),
    }
}

/// Assemble the stored row.
fn build_row(filing: Filing, extraction: Extraction) -> Result<DocumentRow, DataError> {
    let status = extraction.status();
    let error = extraction.error().map(str::to_string);
    let facts = extraction.facts();
    let metrics = DerivedMetrics::from_facts(&facts);
    let all_numeric_facts_json = match extraction {
        Extraction::Extracted { all_facts_json, .. } => all_facts_json,
        _ => None,
    };

    let mut raw = filing.raw;
    if let Some(error) = &error {
        raw.insert(EXTRACTION_ERROR_KEY.to_string(), Value::String(error.clone()));
    }
    let raw_json = serde_json::to_string(&raw)?;

    Ok(DocumentRow {
        period_end: facts.period_end.clone().or(filing.period_end),
        doc_id: filing.doc_id,
        fetched_date: filing.fetched_date,
        edinet_code: filing.edinet_code,
        sec_code: filing.sec_code,
        filer_name: filing.filer_name,
        doc_description: filing.doc_description,
        submit_datetime: filing.submitted_at,
        facts,
        operating_margin: metrics.operating_margin,
        net_margin: metrics.net_margin,
        equity_ratio: metrics.equity_ratio,
        cash_ratio: metrics.cash_ratio,
        status,
        error,
        all_numeric_facts_json,
        raw_json,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filing(xbrl: bool) -> Filing {
        let raw = json!({
            "docID": "S100TEST",
            "edinetCode": "E00001",
            "secCode": "13010",
            "periodEnd": "2024-03-31",
            "xbrlFlag": if xbrl { "1" } else { "0" },
        });
        Filing::from_raw(raw, NaiveDate::from_ymd_opt(2024, 6, 20).unwrap()).unwrap()
    }

    #[test]
    fn test_failed_row_carries_marker() {
        let error = DataError::Archive("truncated".to_string());
        let row = build_row(filing(true), Extraction::parse_failed(&error)).unwrap();

        assert_eq!(row.status, ExtractionStatus::ParseFailed);
        assert!(row.error.as_deref().unwrap().contains("truncated"));
        let raw: Value = serde_json::from_str(&row.raw_json).unwrap();
        assert!(raw[EXTRACTION_ERROR_KEY].as_str().unwrap().contains("truncated"));
        assert_eq!(row.facts.found_count(), 0);
        assert_eq!(row.operating_margin, None);
    }

    #[test]
    fn test_no_xbrl_row_keeps_listing_period() {
        let row = build_row(filing(false), Extraction::NoXbrl).unwrap();
        assert_eq!(row.status, ExtractionStatus::NoXbrl);
        assert_eq!(row.error, None);
        assert_eq!(row.period_end.as_deref(), Some("2024-03-31"));
        assert_eq!(row.sec_code.as_deref(), Some("1301"));

        let raw: Value = serde_json::from_str(&row.raw_json).unwrap();
        assert!(raw.get(EXTRACTION_ERROR_KEY).is_none());
    }

    #[test]
    fn test_summary_count() {
        let mut summary = RunSummary::default();
        summary.statuses.insert(ExtractionStatus::Ok, 2);
        assert_eq!(summary.count(ExtractionStatus::Ok), 2);
        assert_eq!(summary.count(ExtractionStatus::FetchFailed), 0);
    }
}
