//! Day-by-day disclosure listing.

use chrono::NaiveDate;
use futures::stream::{self, Stream, StreamExt};
use kessan_data::DataError;
use kessan_data::edinet::{DisclosureSource, Filing, RetryPolicy};

/// Result of listing one day.
#[derive(Debug)]
pub enum DayOutcome {
    /// The day was listed
    Listed {
        /// Listing day
        date: NaiveDate,
        /// Filings in listing order
        filings: Vec<Filing>,
        /// Records without a document id or filer code
        skipped: usize,
    },
    /// Listing failed after every attempt
    Gap {
        /// Listing day
        date: NaiveDate,
        /// Attempts made
        attempts: u32,
        /// Last error
        error: DataError,
    },
}

impl DayOutcome {
    /// Listing day.
    pub const fn date(&self) -> NaiveDate {
        match self {
            Self::Listed { date, .. } | Self::Gap { date, .. } => *date,
        }
    }
}

/// Lists disclosures one day at a time through a [`DisclosureSource`].
pub struct DocumentLister<'a, S: ?Sized> {
    source: &'a S,
    retry: RetryPolicy,
}

impl<S: ?Sized> std::fmt::Debug for DocumentLister<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentLister")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl<'a, S> DocumentLister<'a, S>
where
    S: DisclosureSource + ?Sized,
{
    /// Create a lister.
    pub const fn new(source: &'a S, retry: RetryPolicy) -> Self {
        Self { source, retry }
    }

    /// List one day, retrying transient failures.
    pub async fn list_day(&self, date: NaiveDate) -> DayOutcome {
        let outcome = self
            .retry
            .run("listing", || self.source.list_documents(date))
            .await;

        let attempts = outcome.attempts;
        let rejected_key = outcome.is_authentication_failure();

        match outcome.into_result() {
            Ok(records) => {
                let total = records.len();
                let mut filings: Vec<Filing> = records
                    .into_iter()
                    .filter_map(|raw| Filing::from_raw(raw, date))
                    .collect();
                filings.sort_by(Filing::listing_order);

                let skipped = total - filings.len();
                if skipped > 0 {
                    tracing::debug!(%date, skipped, "listing records without docID or edinetCode");
                }
                tracing::info!(%date, documents = filings.len(), "listed day");

                DayOutcome::Listed {
                    date,
                    filings,
                    skipped,
                }
            }
            Err(error) => {
                if rejected_key {
                    tracing::error!(%date, error = %error, "subscription key rejected");
                } else {
                    tracing::warn!(%date, attempts, error = %error, "listing failed; skipping day");
                }
                DayOutcome::Gap { date, attempts, error }
            }
        }
    }

    /// Lazily list `days` in order, one request sequence at a time.
    pub fn stream(&self, days: Vec<NaiveDate>) -> impl Stream<Item = DayOutcome> + '_ {
        stream::iter(days).then(move |date| self.list_day(date))
    }
}
