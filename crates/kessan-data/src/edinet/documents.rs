//! Disclosure listing records.
//!
//! EDINET returns one JSON object per filed document. Only a handful of
//! fields drive the pipeline; the full object is kept as the raw payload.

use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Keys that may hold the document array in a listing response, in order.
const DOCUMENT_ARRAY_KEYS: [&str; 4] = ["results", "documents", "result", "items"];

/// One disclosure document from a daily listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Filing {
    /// Document id (`docID`), unique across EDINET
    pub doc_id: String,
    /// Filer code (`edinetCode`), e.g. `E02144`
    pub edinet_code: String,
    /// Normalised securities code (`secCode`), when listed
    pub sec_code: Option<String>,
    /// Filer name (`filerName`)
    pub filer_name: Option<String>,
    /// Document description (`docDescription`)
    pub doc_description: Option<String>,
    /// Submission timestamp (`submitDateTime`, `YYYY-MM-DD HH:MM` JST)
    pub submitted_at: Option<String>,
    /// Reporting period end (`periodEnd`)
    pub period_end: Option<String>,
    /// Whether an XBRL archive is available (`xbrlFlag == "1"`)
    pub xbrl_available: bool,
    /// Listing day this record was fetched for
    pub fetched_date: NaiveDate,
    /// Complete listing record as returned by the API
    pub raw: Map<String, Value>,
}

impl Filing {
    /// Build a filing from a raw listing record.
    ///
    /// Returns `None` when the record is not an object or lacks a document
    /// id or filer code.
    pub fn from_raw(raw: Value, fetched_date: NaiveDate) -> Option<Self> {
        let Value::Object(map) = raw else {
            return None;
        };

        let doc_id = text_field(&map, &["docID", "docId"])?;
        let edinet_code = text_field(&map, &["edinetCode", "edinet_code"])?;

        Some(Self {
            sec_code: text_field(&map, &["secCode", "sec_code"])
                .and_then(|code| normalize_sec_code(&code)),
            filer_name: text_field(&map, &["filerName"]),
            doc_description: text_field(&map, &["docDescription"]),
            submitted_at: text_field(&map, &["submitDateTime"]),
            period_end: text_field(&map, &["periodEnd"]),
            xbrl_available: flag_set(&map, &["xbrlFlag", "XBRLFlag"]),
            fetched_date,
            doc_id,
            edinet_code,
            raw: map,
        })
    }

    /// Listing order: listing day, submission timestamp, then document id.
    pub fn listing_order(&self, other: &Self) -> Ordering {
        self.fetched_date
            .cmp(&other.fetched_date)
            .then_with(|| self.submitted_at.cmp(&other.submitted_at))
            .then_with(|| self.doc_id.cmp(&other.doc_id))
    }

    /// Whether the description contains any keyword (case-sensitive).
    pub fn description_contains_any(&self, keywords: &[String]) -> bool {
        self.doc_description
            .as_deref()
            .is_some_and(|desc| keywords.iter().any(|k| desc.contains(k.as_str())))
    }
}

/// Take the document array out of a listing response body.
///
/// The first of `results`, `documents`, `result` and `items` holding an
/// array wins; a body without any of them yields no documents.
pub fn extract_document_array(body: &Value) -> Vec<Value> {
    DOCUMENT_ARRAY_KEYS
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_array))
        .cloned()
        .unwrap_or_default()
}

/// Normalise a securities code.
///
/// EDINET lists 5-digit codes with a trailing check digit `0`
/// (`72030` for `7203`). Codes are trimmed, the trailing `0` of such codes
/// dropped and all-digit codes zero-padded to 4 digits. Anything else is
/// returned trimmed.
///
/// # Example
/// ```
/// use kessan_data::edinet::normalize_sec_code;
///
/// assert_eq!(normalize_sec_code("72030").as_deref(), Some("7203"));
/// assert_eq!(normalize_sec_code("45").as_deref(), Some("0045"));
/// assert_eq!(normalize_sec_code("  "), None);
/// ```
pub fn normalize_sec_code(raw: &str) -> Option<String> {
    let code = raw.trim();
    if code.is_empty() {
        return None;
    }

    let all_digits = code.chars().all(|c| c.is_ascii_digit());
    if !all_digits {
        return Some(code.to_string());
    }

    let code = if code.len() == 5 && code.ends_with('0') {
        &code[..4]
    } else {
        code
    };
    Some(format!("{:0>4}", code))
}

/// First non-empty string (or number) among `keys`.
fn text_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match map.get(*key)? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn flag_set(map: &Map<String, Value>, keys: &[&str]) -> bool {
    keys.iter().any(|key| match map.get(*key) {
        Some(Value::String(s)) => s.trim() == "1",
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        Some(Value::Bool(b)) => *b,
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 20).unwrap()
    }

    #[rstest]
    #[case("72030", Some("7203"))]
    #[case("7203", Some("7203"))]
    #[case(" 13010 ", Some("1301"))]
    #[case("12345", Some("12345"))]
    #[case("45", Some("0045"))]
    #[case("130A0", Some("130A0"))]
    #[case("", None)]
    fn test_normalize_sec_code(#[case] raw: &str, #[case] expected: Option<&str>) {
        assert_eq!(normalize_sec_code(raw).as_deref(), expected);
    }

    #[test]
    fn test_extract_document_array_key_order() {
        let body = json!({
            "metadata": {"status": "200"},
            "results": [{"docID": "S1"}],
            "items": [{"docID": "S2"}]
        });
        let docs = extract_document_array(&body);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["docID"], "S1");

        let body = json!({"result": "not an array", "items": [{"docID": "S3"}]});
        assert_eq!(extract_document_array(&body)[0]["docID"], "S3");

        assert!(extract_document_array(&json!({"metadata": {}})).is_empty());
    }

    #[test]
    fn test_filing_from_raw() {
        let raw = json!({
            "docID": "S100ABCD",
            "edinetCode": "E02144",
            "secCode": "72030",
            "filerName": "トヨタ自動車株式会社",
            "docDescription": "有価証券報告書－第120期(2023/04/01－2024/03/31)",
            "submitDateTime": "2024-06-20 15:00",
            "periodEnd": "2024-03-31",
            "xbrlFlag": "1"
        });

        let filing = Filing::from_raw(raw, day()).unwrap();
        assert_eq!(filing.doc_id, "S100ABCD");
        assert_eq!(filing.edinet_code, "E02144");
        assert_eq!(filing.sec_code.as_deref(), Some("7203"));
        assert!(filing.xbrl_available);
        assert_eq!(filing.period_end.as_deref(), Some("2024-03-31"));
        assert_eq!(filing.fetched_date, day());
        assert!(filing.raw.contains_key("filerName"));
    }

    #[test]
    fn test_filing_requires_ids() {
        assert!(Filing::from_raw(json!({"edinetCode": "E00001"}), day()).is_none());
        assert!(Filing::from_raw(json!({"docID": "S1", "edinetCode": ""}), day()).is_none());
        assert!(Filing::from_raw(json!("S1"), day()).is_none());
    }

    #[test]
    fn test_xbrl_flag_variants() {
        let off = Filing::from_raw(
            json!({"docID": "S1", "edinetCode": "E1", "xbrlFlag": "0"}),
            day(),
        )
        .unwrap();
        let numeric = Filing::from_raw(
            json!({"docID": "S2", "edinetCode": "E1", "xbrlFlag": 1}),
            day(),
        )
        .unwrap();
        assert!(!off.xbrl_available);
        assert!(numeric.xbrl_available);
        assert_eq!(off.sec_code, None);
    }

    #[test]
    fn test_keyword_match_is_case_sensitive() {
        let filing = Filing::from_raw(
            json!({"docID": "S1", "edinetCode": "E1", "docDescription": "Annual Report"}),
            day(),
        )
        .unwrap();
        assert!(filing.description_contains_any(&["Annual".to_string()]));
        assert!(!filing.description_contains_any(&["annual".to_string()]));
    }
}
