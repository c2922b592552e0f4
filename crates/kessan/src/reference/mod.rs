//! Market and index membership resolution.
//!
//! A [`ReferenceResolver`] maps an EDINET code to a securities code and the
//! set of [`MarketGroup`]s the company belongs to. Sources, in order of
//! preference:
//!
//! 1. the `master_company` table written by earlier runs, when fresh
//! 2. the EDINET code list and market listing CSV snapshots
//! 3. the securities code carried on the listing record itself
//!
//! Index membership comes from the index table when it is fresh and
//! populated, otherwise from the index CSV. Nothing here fails: unreadable
//! sources are logged and treated as empty.

pub mod market;
pub mod snapshot;

pub use market::MarketGroup;
pub use snapshot::{CodeListEntry, ListingEntry};

use crate::config::ReferenceConfig;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use kessan_data::edinet::normalize_sec_code;
use kessan_data::store::FilingStore;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

/// What is known about one company.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Normalised securities code, if any source knows it
    pub securities_code: Option<String>,
    /// Company name from reference data
    pub company_name: Option<String>,
    /// Market label
    pub market: Option<String>,
    /// Sector label
    pub sector: Option<String>,
    /// Market tiers and indices the company belongs to
    pub groups: BTreeSet<MarketGroup>,
}

impl Resolution {
    /// Whether the company belongs to `group`.
    pub fn is_member(&self, group: MarketGroup) -> bool {
        self.groups.contains(&group)
    }

    /// Label stored in `master_company.group_name`: the first index the
    /// company belongs to.
    pub fn group_name(&self) -> Option<&'static str> {
        self.groups.iter().find(|g| g.is_index()).map(|g| g.name())
    }
}

/// In-memory reference data for one run.
#[derive(Debug, Clone, Default)]
pub struct ReferenceResolver {
    /// Company rows keyed by EDINET code; table rows already merged over CSV
    companies: HashMap<String, KnownCompany>,
    /// Market listing keyed by securities code
    listings: HashMap<String, ListingEntry>,
    /// Index members keyed by securities code
    index_members: HashMap<MarketGroup, HashSet<String>>,
}

#[derive(Debug, Clone, Default)]
struct KnownCompany {
    entry: CodeListEntry,
    group: Option<MarketGroup>,
}

impl ReferenceResolver {
    /// Resolver with no reference data. Every lookup falls back to the
    /// listing's own securities code.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load every configured source.
    pub fn load(store: &FilingStore, config: &ReferenceConfig, now: DateTime<Utc>) -> Self {
        let max_age = Duration::days(config.max_table_age_days);
        let mut resolver = Self::empty();

        if let Some(path) = &config.edinet_code_csv {
            match snapshot::load_edinet_code_list(path) {
                Ok(entries) => {
                    for (code, entry) in entries {
                        resolver.add_company(code, entry, None);
                    }
                }
                Err(e) => warn_unreadable(path, &e),
            }
        }

        match store.companies() {
            Ok(rows) if !rows.is_empty() => {
                let newest = rows.iter().filter_map(|r| r.updated_at.as_deref()).max();
                if is_fresh(newest, now, max_age) {
                    for row in rows {
                        let record = row.record;
                        let entry = CodeListEntry {
                            securities_code: record.securities_code,
                            company_name: record.company_name,
                            market: record.market,
                            sector: record.sector,
                        };
                        let group = record.group_name.as_deref().and_then(MarketGroup::from_group_label);
                        resolver.merge_company(record.edinet_code, entry, group);
                    }
                } else {
                    tracing::info!("master_company is stale; using CSV snapshots only");
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "failed to read master_company"),
        }

        if let Some(path) = &config.market_listing_csv {
            match snapshot::load_market_listing(path) {
                Ok(entries) => resolver.listings = entries,
                Err(e) => warn_unreadable(path, &e),
            }
        }

        let from_table = match store.index_members(&config.index_table) {
            Ok(Some(members)) if !members.sec_codes.is_empty() => {
                if is_fresh(members.newest.as_deref(), now, max_age) {
                    Some(members.sec_codes.into_iter().collect::<HashSet<_>>())
                } else {
                    tracing::info!(table = %config.index_table, "index table is stale");
                    None
                }
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(table = %config.index_table, error = %e, "failed to read index table");
                None
            }
        };

        let members = from_table.or_else(|| {
            let path = config.index_csv.as_ref()?;
            snapshot::load_index_members(path)
                .map_err(|e| warn_unreadable(path, &e))
                .ok()
        });
        if let Some(members) = members {
            resolver.index_members.insert(MarketGroup::Nikkei225, members);
        }

        tracing::info!(
            companies = resolver.companies.len(),
            listings = resolver.listings.len(),
            index_members = resolver.index_member_count(MarketGroup::Nikkei225),
            "reference data loaded"
        );
        resolver
    }

    /// Add a company from a CSV-style entry, replacing any earlier entry.
    pub fn add_company(&mut self, edinet_code: impl Into<String>, entry: CodeListEntry, group: Option<MarketGroup>) {
        self.companies
            .insert(edinet_code.into(), KnownCompany { entry, group });
    }

    /// Merge a preferred entry over whatever is already known: its non-null
    /// fields win, null fields keep the existing value.
    fn merge_company(&mut self, edinet_code: String, entry: CodeListEntry, group: Option<MarketGroup>) {
        let known = self.companies.entry(edinet_code).or_default();
        let fallback = std::mem::take(&mut known.entry);
        known.entry = CodeListEntry {
            securities_code: entry.securities_code.or(fallback.securities_code),
            company_name: entry.company_name.or(fallback.company_name),
            market: entry.market.or(fallback.market),
            sector: entry.sector.or(fallback.sector),
        };
        known.group = group.or(known.group);
    }

    /// Add a market listing entry.
    pub fn add_listing(&mut self, sec_code: impl Into<String>, entry: ListingEntry) {
        self.listings.insert(sec_code.into(), entry);
    }

    /// Replace the members of an index.
    pub fn set_index_members<I, S>(&mut self, group: MarketGroup, codes: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let members = codes
            .into_iter()
            .filter_map(|c| normalize_sec_code(c.as_ref()))
            .collect();
        self.index_members.insert(group, members);
    }

    /// Number of known members of an index.
    pub fn index_member_count(&self, group: MarketGroup) -> usize {
        self.index_members.get(&group).map_or(0, HashSet::len)
    }

    /// Resolve a company. `listed_sec_code` is the securities code carried
    /// on the listing record, used only when reference data has none.
    pub fn resolve(&self, edinet_code: &str, listed_sec_code: Option<&str>) -> Resolution {
        let known = self.companies.get(edinet_code);

        let securities_code = known
            .and_then(|k| k.entry.securities_code.clone())
            .or_else(|| listed_sec_code.and_then(normalize_sec_code));

        let listing = securities_code.as_deref().and_then(|c| self.listings.get(c));

        let market = known
            .and_then(|k| k.entry.market.clone())
            .or_else(|| listing.and_then(|l| l.market.clone()));
        let sector = known
            .and_then(|k| k.entry.sector.clone())
            .or_else(|| listing.and_then(|l| l.sector.clone()));

        let mut groups = BTreeSet::new();
        if let Some(tier) = market.as_deref().and_then(MarketGroup::from_market_label) {
            groups.insert(tier);
        }
        if let Some(group) = known.and_then(|k| k.group) {
            groups.insert(group);
        }
        if let Some(code) = securities_code.as_deref() {
            for (group, members) in &self.index_members {
                if members.contains(code) {
                    groups.insert(*group);
                }
            }
        }

        Resolution {
            securities_code,
            company_name: known.and_then(|k| k.entry.company_name.clone()),
            market,
            sector,
            groups,
        }
    }
}

fn warn_unreadable(path: &Path, error: &csv::Error) {
    tracing::warn!(path = %path.display(), error = %error, "reference CSV unreadable");
}

/// Parse an RFC 3339 timestamp, or a plain `YYYY-MM-DD HH:MM:SS` taken as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|t| t.and_utc())
        })
}

fn is_fresh(newest: Option<&str>, now: DateTime<Utc>, max_age: Duration) -> bool {
    newest
        .and_then(parse_timestamp)
        .is_some_and(|t| now - t <= max_age)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use kessan_data::store::CompanyRecord;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 20, 0, 0, 0).unwrap()
    }

    fn entry(sec: Option<&str>, market: Option<&str>) -> CodeListEntry {
        CodeListEntry {
            securities_code: sec.map(str::to_string),
            company_name: Some("サンプル株式会社".to_string()),
            market: market.map(str::to_string),
            sector: None,
        }
    }

    #[test]
    fn test_unknown_company_uses_listing_code() {
        let resolver = ReferenceResolver::empty();

        let resolution = resolver.resolve("E00001", Some("72030"));
        assert_eq!(resolution.securities_code.as_deref(), Some("7203"));
        assert!(resolution.groups.is_empty());

        let unknown = resolver.resolve("E00001", None);
        assert_eq!(unknown, Resolution::default());
    }

    #[test]
    fn test_market_from_listing_and_index_membership() {
        let mut resolver = ReferenceResolver::empty();
        resolver.add_company("E02144", entry(Some("7203"), None), None);
        resolver.add_listing(
            "7203",
            ListingEntry {
                market: Some("プライム（内国株式）".to_string()),
                sector: Some("輸送用機器".to_string()),
            },
        );
        resolver.set_index_members(MarketGroup::Nikkei225, ["7203", "9984"]);

        let resolution = resolver.resolve("E02144", None);
        assert!(resolution.is_member(MarketGroup::Prime));
        assert!(resolution.is_member(MarketGroup::Nikkei225));
        assert!(!resolution.is_member(MarketGroup::Growth));
        assert_eq!(resolution.sector.as_deref(), Some("輸送用機器"));
        assert_eq!(resolution.group_name(), Some("Nikkei225"));
    }

    #[test]
    fn test_reference_code_beats_listing_code() {
        let mut resolver = ReferenceResolver::empty();
        resolver.add_company("E00001", entry(Some("1301"), Some("グロース")), None);

        let resolution = resolver.resolve("E00001", Some("9999"));
        assert_eq!(resolution.securities_code.as_deref(), Some("1301"));
        assert!(resolution.is_member(MarketGroup::Growth));
    }

    #[test]
    fn test_fresh_master_table_merges_over_csv() {
        let store = FilingStore::in_memory().unwrap();
        store
            .upsert_company(&CompanyRecord {
                edinet_code: "E00001".to_string(),
                securities_code: None,
                company_name: Some("Table Name".to_string()),
                market: Some("スタンダード".to_string()),
                sector: None,
                group_name: Some("Nikkei225".to_string()),
            })
            .unwrap();

        let mut resolver = ReferenceResolver::empty();
        resolver.add_company("E00001", entry(Some("1301"), Some("プライム")), None);
        let rows = store.companies().unwrap();
        for row in rows {
            let record = row.record;
            resolver.merge_company(
                record.edinet_code,
                CodeListEntry {
                    securities_code: record.securities_code,
                    company_name: record.company_name,
                    market: record.market,
                    sector: record.sector,
                },
                record.group_name.as_deref().and_then(MarketGroup::from_group_label),
            );
        }

        let resolution = resolver.resolve("E00001", None);
        assert_eq!(resolution.securities_code.as_deref(), Some("1301"));
        assert_eq!(resolution.company_name.as_deref(), Some("Table Name"));
        assert!(resolution.is_member(MarketGroup::Standard));
        assert!(resolution.is_member(MarketGroup::Nikkei225));
    }

    #[test]
    fn test_load_without_sources_is_empty() {
        let store = FilingStore::in_memory().unwrap();
        let resolver = ReferenceResolver::load(&store, &ReferenceConfig::default(), now());
        assert_eq!(resolver.index_member_count(MarketGroup::Nikkei225), 0);
        assert!(resolver.resolve("E00001", None).securities_code.is_none());
    }

    #[test]
    fn test_load_missing_csv_does_not_fail() {
        let store = FilingStore::in_memory().unwrap();
        let config = ReferenceConfig {
            edinet_code_csv: Some("/nonexistent/EdinetcodeDlInfo.csv".into()),
            index_csv: Some("/nonexistent/nikkei225.csv".into()),
            ..ReferenceConfig::default()
        };
        let resolver = ReferenceResolver::load(&store, &config, now());
        assert_eq!(resolver.resolve("E00001", Some("7203")).securities_code.as_deref(), Some("7203"));
    }

    #[test]
    fn test_freshness() {
        let max_age = Duration::days(30);
        assert!(is_fresh(Some("2024-06-01T00:00:00+00:00"), now(), max_age));
        assert!(is_fresh(Some("2024-06-01 09:00:00"), now(), max_age));
        assert!(!is_fresh(Some("2024-01-01T00:00:00Z"), now(), max_age));
        assert!(!is_fresh(Some("yesterday"), now(), max_age));
        assert!(!is_fresh(None, now(), max_age));
    }
}
