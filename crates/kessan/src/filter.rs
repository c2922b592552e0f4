//! Category and market filtering of listed filings.

use crate::config::CategoryFilter;
use crate::reference::{MarketGroup, ReferenceResolver, Resolution};
use kessan_data::edinet::Filing;
use std::collections::HashSet;

/// A filing that passed every filter, with what the resolver knows about
/// its filer.
#[derive(Debug, Clone)]
pub struct Accepted {
    /// The filing
    pub filing: Filing,
    /// Reference data for the filer
    pub resolution: Resolution,
}

/// Filter result.
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    /// Accepted filings in input order
    pub accepted: Vec<Accepted>,
    /// Rejected by the description keywords
    pub rejected_category: usize,
    /// Rejected by the market or index restriction
    pub rejected_market: usize,
    /// Repeated document ids
    pub duplicates: usize,
}

/// Category keywords AND an optional market restriction.
#[derive(Debug, Clone, Copy)]
pub struct DocumentFilter<'a> {
    category: &'a CategoryFilter,
    market: Option<MarketGroup>,
    resolver: &'a ReferenceResolver,
}

impl<'a> DocumentFilter<'a> {
    /// Create a filter.
    pub const fn new(
        category: &'a CategoryFilter,
        market: Option<MarketGroup>,
        resolver: &'a ReferenceResolver,
    ) -> Self {
        Self {
            category,
            market,
            resolver,
        }
    }

    /// Whether the description passes the category stage.
    pub fn matches_category(&self, filing: &Filing) -> bool {
        match self.category {
            CategoryFilter::IncludeAll => true,
            CategoryFilter::Keywords(keywords) => filing.description_contains_any(keywords),
        }
    }

    /// Whether the resolved filer passes the market stage. A filer without
    /// a securities code never passes a market restriction.
    pub fn matches_market(&self, resolution: &Resolution) -> bool {
        match self.market {
            None => true,
            Some(group) => resolution.securities_code.is_some() && resolution.is_member(group),
        }
    }

    /// Deduplicate by document id (first occurrence wins), then filter.
    pub fn apply(&self, filings: impl IntoIterator<Item = Filing>) -> FilterOutcome {
        let mut outcome = FilterOutcome::default();
        let mut seen = HashSet::new();

        for filing in filings {
            if !seen.insert(filing.doc_id.clone()) {
                outcome.duplicates += 1;
                continue;
            }
            if !self.matches_category(&filing) {
                outcome.rejected_category += 1;
                continue;
            }

            let resolution = self
                .resolver
                .resolve(&filing.edinet_code, filing.sec_code.as_deref());
            if !self.matches_market(&resolution) {
                outcome.rejected_market += 1;
                continue;
            }

            outcome.accepted.push(Accepted { filing, resolution });
        }

        tracing::info!(
            accepted = outcome.accepted.len(),
            rejected_category = outcome.rejected_category,
            rejected_market = outcome.rejected_market,
            duplicates = outcome.duplicates,
            "filtered filings"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::CodeListEntry;
    use chrono::NaiveDate;
    use serde_json::json;

    fn filing(doc_id: &str, edinet_code: &str, description: &str, sec_code: Option<&str>) -> Filing {
        let raw = json!({
            "docID": doc_id,
            "edinetCode": edinet_code,
            "docDescription": description,
            "secCode": sec_code,
        });
        Filing::from_raw(raw, NaiveDate::from_ymd_opt(2024, 6, 20).unwrap()).unwrap()
    }

    fn resolver() -> ReferenceResolver {
        let mut resolver = ReferenceResolver::empty();
        resolver.add_company(
            "E00001",
            CodeListEntry {
                securities_code: Some("1301".to_string()),
                market: Some("プライム（内国株式）".to_string()),
                ..CodeListEntry::default()
            },
            None,
        );
        resolver.add_company(
            "E00002",
            CodeListEntry {
                market: Some("プライム（内国株式）".to_string()),
                ..CodeListEntry::default()
            },
            None,
        );
        resolver
    }

    #[test]
    fn test_category_keywords_are_case_sensitive_substrings() {
        let category = CategoryFilter::Keywords(vec!["有価証券報告書".to_string(), "Annual".to_string()]);
        let resolver = ReferenceResolver::empty();
        let filter = DocumentFilter::new(&category, None, &resolver);

        let outcome = filter.apply([
            filing("S1", "E00001", "有価証券報告書－第80期(2023/04/01－2024/03/31)", None),
            filing("S2", "E00001", "訂正有価証券報告書", None),
            filing("S3", "E00001", "臨時報告書", None),
            filing("S4", "E00001", "annual report", None),
        ]);

        let ids: Vec<&str> = outcome.accepted.iter().map(|a| a.filing.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["S1", "S2"]);
        assert_eq!(outcome.rejected_category, 2);
    }

    #[test]
    fn test_include_all() {
        let resolver = ReferenceResolver::empty();
        let filter = DocumentFilter::new(&CategoryFilter::IncludeAll, None, &resolver);
        let outcome = filter.apply([filing("S1", "E00001", "臨時報告書", None)]);
        assert_eq!(outcome.accepted.len(), 1);
    }

    #[test]
    fn test_market_filter_requires_securities_code() {
        let resolver = resolver();
        let filter = DocumentFilter::new(&CategoryFilter::IncludeAll, Some(MarketGroup::Prime), &resolver);

        let outcome = filter.apply([
            filing("S1", "E00001", "有価証券報告書", None),
            filing("S2", "E00002", "有価証券報告書", None),
            filing("S3", "E00003", "有価証券報告書", Some("99990")),
        ]);

        let ids: Vec<&str> = outcome.accepted.iter().map(|a| a.filing.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["S1"]);
        assert_eq!(outcome.rejected_market, 2);
    }

    #[test]
    fn test_null_code_kept_without_market_filter() {
        let resolver = resolver();
        let filter = DocumentFilter::new(&CategoryFilter::IncludeAll, None, &resolver);
        let outcome = filter.apply([filing("S2", "E00002", "有価証券報告書", None)]);
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.accepted[0].resolution.securities_code, None);
    }

    #[test]
    fn test_duplicates_first_wins() {
        let resolver = ReferenceResolver::empty();
        let filter = DocumentFilter::new(&CategoryFilter::IncludeAll, None, &resolver);

        let outcome = filter.apply([
            filing("S1", "E00001", "first", None),
            filing("S1", "E00001", "second", None),
        ]);
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.accepted[0].filing.doc_description.as_deref(), Some("first"));
        assert_eq!(outcome.duplicates, 1);
    }
}
