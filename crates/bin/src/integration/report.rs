//! Plain-text run and audit reports.

use kessan::RunSummary;
use kessan_data::edinet::ExtractionStatus;
use kessan_data::error::DataError;
use kessan_data::store::FilingStore;
use std::path::Path;

const FAILED_STATUSES: [ExtractionStatus; 2] = [ExtractionStatus::FetchFailed, ExtractionStatus::ParseFailed];

fn print_header(title: &str) {
    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║{:^62}║", title);
    println!("╚══════════════════════════════════════════════════════════════╝\n");
}

/// Print the counts of one fetch run.
pub(crate) fn print_run_summary(summary: &RunSummary, db_path: &Path) {
    print_header("EDINET FETCH SUMMARY");

    println!("Database:            {}", db_path.display());
    println!("Days:                {} ({} gap(s))", summary.days, summary.gaps.len());
    println!("Listed documents:    {}", summary.listed);
    if summary.skipped_records > 0 {
        println!("Skipped records:     {}", summary.skipped_records);
    }
    println!("Rejected (category): {}", summary.rejected_category);
    println!("Rejected (market):   {}", summary.rejected_market);
    println!("Duplicates:          {}", summary.duplicates);
    println!("Processed:           {}", summary.processed);
    println!("Persisted:           {}", summary.persisted);
    if summary.persist_failures > 0 {
        println!("Persist failures:    {}", summary.persist_failures);
    }

    if !summary.statuses.is_empty() {
        println!("\nExtraction status:");
        for (status, count) in &summary.statuses {
            println!("  {:<14} {:>6}", status.as_str(), count);
        }
    }

    if !summary.gaps.is_empty() {
        println!("\nDays not listed (rerun these dates):");
        for gap in &summary.gaps {
            println!("  {}  attempts={}  {}", gap.date, gap.attempts, gap.error);
        }
    }
}

/// Print recorded gaps and failed documents.
pub(crate) fn print_audit(store: &FilingStore, db_path: &Path, limit: usize) -> Result<(), DataError> {
    print_header("EDINET STORE AUDIT");

    let stats = store.stats()?;
    println!("Database:   {}", db_path.display());
    println!("Documents:  {}", stats.documents);
    println!("Companies:  {}", stats.companies);
    println!("Gaps:       {}", stats.gaps);

    let counts = store.status_counts()?;
    if !counts.is_empty() {
        println!("\nExtraction status:");
        for (status, count) in counts {
            println!("  {:<14} {:>6}", status, count);
        }
    }

    let gaps = store.gaps()?;
    if !gaps.is_empty() {
        println!("\nListing gaps:");
        for gap in gaps {
            println!(
                "  {}  attempts={}  recorded={}  {}",
                gap.date, gap.attempts, gap.recorded_at, gap.error
            );
        }
    }

    let failed = store.documents_with_status(&FAILED_STATUSES)?;
    if !failed.is_empty() {
        println!("\nFailed documents ({}):", failed.len());
        for doc in failed.iter().take(limit) {
            println!(
                "  {}  {}  {:<10} {:<13} {}",
                doc.fetched_date,
                doc.doc_id,
                doc.edinet_code.as_deref().unwrap_or("-"),
                doc.status.as_deref().unwrap_or("-"),
                doc.error.as_deref().unwrap_or("")
            );
        }
        if failed.len() > limit {
            println!("  ... {} more", failed.len() - limit);
        }
    }

    Ok(())
}
