//! XBRL parsing for EDINET filings.
//!
//! An EDINET archive (download type 1) is a ZIP holding the XBRL instance
//! under `XBRL/PublicDoc/` together with schemas, linkbases, audit reports
//! and inline XBRL (`.htm`) renderings of each statement. This module picks
//! the instance document out of the archive and reads every numeric fact
//! together with the period and dimensions of its context.
//!
//! Both plain instance documents (facts are elements carrying `contextRef`)
//! and inline XBRL (`ix:nonFraction` elements) are supported.

use crate::error::{DataError, Result};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::Serialize;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use zip::ZipArchive;

/// Member name marking non-consolidated (parent-only) contexts.
const NON_CONSOLIDATED_MEMBER: &str = "NonConsolidatedMember";

/// A single numeric fact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct XbrlFact {
    /// Local element name, prefix stripped (e.g. `NetSales`)
    pub name: String,

    /// Parsed value with inline scale and sign applied
    pub value: f64,

    /// Context id
    #[serde(rename = "contextRef")]
    pub context_ref: Option<String>,

    /// Unit id (e.g. `JPY`, `shares`)
    #[serde(rename = "unitRef")]
    pub unit_ref: Option<String>,

    /// Declared precision
    pub decimals: Option<String>,

    /// Context period end (`instant` or `endDate`), `YYYY-MM-DD`
    pub period_end: Option<String>,

    /// False for contexts with a `NonConsolidatedMember`
    pub consolidated: bool,

    /// Whether the context carries any dimension member
    #[serde(skip)]
    pub dimensional: bool,
}

/// Period and dimension information of one context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XbrlContext {
    /// Period end (`instant` or `endDate`)
    pub period_end: Option<String>,
    /// Whether the context has explicit or typed dimension members
    pub dimensional: bool,
    /// Whether one of the members is `NonConsolidatedMember`
    pub non_consolidated: bool,
}

/// Parsed XBRL document: root element plus every numeric fact.
#[derive(Debug, Clone, Default)]
pub struct XbrlInstance {
    /// Local name of the root element (`xbrl` or `html` for usable documents)
    pub root: String,
    /// Contexts by id
    pub contexts: HashMap<String, XbrlContext>,
    /// Numeric facts in document order
    pub facts: Vec<XbrlFact>,
    /// Archive entry the instance was read from, when known
    pub source: Option<String>,
}

impl XbrlInstance {
    /// Parse an instance or inline XBRL document.
    ///
    /// # Errors
    /// Returns `DataError::XmlParse` for malformed XML.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let (root, contexts, raw_facts) = scan(bytes)?;

        let facts = raw_facts
            .into_iter()
            .filter_map(|raw| {
                let value = raw.value()?;
                let context = raw
                    .context_ref
                    .as_deref()
                    .and_then(|id| contexts.get(id));
                Some(XbrlFact {
                    name: raw.name,
                    value,
                    period_end: context.and_then(|c| c.period_end.clone()),
                    consolidated: !context.is_some_and(|c| c.non_consolidated),
                    dimensional: context.is_some_and(|c| c.dimensional),
                    context_ref: raw.context_ref,
                    unit_ref: raw.unit_ref,
                    decimals: raw.decimals,
                })
            })
            .collect();

        Ok(Self {
            root,
            contexts,
            facts,
            source: None,
        })
    }

    /// Whether the root element is an XBRL instance or an inline XBRL page.
    pub fn is_xbrl_document(&self) -> bool {
        matches!(self.root.as_str(), "xbrl" | "html")
    }

    /// Facts whose local name equals `name`, compared case-insensitively.
    pub fn facts_named<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a XbrlFact> + use<'a, 'n> {
        self.facts
            .iter()
            .filter(move |f| f.name.eq_ignore_ascii_case(name))
    }

    /// Serialise every fact to a JSON array.
    pub fn facts_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.facts)?)
    }
}

/// Locate and parse the instance document inside an EDINET archive.
///
/// Entries are tried in order: `.xbrl` files under `XBRL/PublicDoc/`, other
/// `.xbrl` files, then inline XBRL pages, largest first within each group.
/// Audit documents are never considered. The first entry that parses, has
/// an `xbrl` or `html` root and yields at least one fact is returned.
///
/// # Errors
/// `Archive` when the bytes are not a readable ZIP, `InstanceNotFound` when
/// no entry qualifies.
pub fn extract_instance(archive: &[u8], doc_id: &str) -> Result<XbrlInstance> {
    let mut zip = ZipArchive::new(Cursor::new(archive))?;

    let mut candidates = Vec::new();
    for index in 0..zip.len() {
        let entry = zip.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        if let Some(rank) = entry_rank(entry.name()) {
            candidates.push((rank, entry.size(), index, entry.name().to_string()));
        }
    }
    candidates.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)).then(a.3.cmp(&b.3)));

    for (_, _, index, name) in candidates {
        let mut content = Vec::new();
        zip.by_index(index)?.read_to_end(&mut content)?;

        match XbrlInstance::parse(&content) {
            Ok(instance) if instance.is_xbrl_document() && !instance.facts.is_empty() => {
                tracing::debug!(
                    doc_id,
                    entry = %name,
                    facts = instance.facts.len(),
                    "selected XBRL instance"
                );
                return Ok(XbrlInstance {
                    source: Some(name),
                    ..instance
                });
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(doc_id, entry = %name, error = %e, "skipping unparseable entry");
            }
        }
    }

    Err(DataError::InstanceNotFound(doc_id.to_string()))
}

/// Selection group of an archive entry, or `None` when it is never a candidate.
fn entry_rank(name: &str) -> Option<u8> {
    let lower = name.to_ascii_lowercase();
    if lower.contains("auditdoc") {
        return None;
    }
    if lower.ends_with(".xbrl") {
        return Some(if lower.contains("xbrl/publicdoc/") { 0 } else { 1 });
    }
    [".htm", ".html", ".xhtml", ".xml"]
        .iter()
        .any(|ext| lower.ends_with(ext))
        .then_some(2)
}

/// Parse a reported number.
///
/// Handles thousands separators, parenthesised negatives and the `△`/`▲`
/// negative markers used in Japanese statements. Returns `None` for
/// anything that is not a finite number.
///
/// # Example
/// ```
/// use kessan_data::edinet::parse_number;
///
/// assert_eq!(parse_number("1,234"), Some(1234.0));
/// assert_eq!(parse_number("(500)"), Some(-500.0));
/// assert_eq!(parse_number("△12"), Some(-12.0));
/// assert_eq!(parse_number("n/a"), None);
/// ```
pub fn parse_number(raw: &str) -> Option<f64> {
    let mut text: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if text.is_empty() {
        return None;
    }

    let mut negative = false;
    if text.starts_with('(') && text.ends_with(')') && text.len() >= 2 {
        negative = true;
        text = text[1..text.len() - 1].trim().to_string();
    }
    if let Some(rest) = text
        .strip_prefix('△')
        .or_else(|| text.strip_prefix('▲'))
        .or_else(|| text.strip_prefix('−'))
    {
        negative = !negative;
        text = rest.trim().to_string();
    }

    // Rust accepts "inf" and "NaN"; only plain decimal notation is valid here
    if !text
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '+' | '-' | 'e' | 'E'))
    {
        return None;
    }

    let value: f64 = text.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if negative { -value } else { value })
}

/// A fact element as read from the document, before number parsing.
#[derive(Debug, Default)]
struct RawFact {
    name: String,
    text: String,
    context_ref: Option<String>,
    unit_ref: Option<String>,
    decimals: Option<String>,
    scale: Option<String>,
    negated: bool,
    fixed_zero: bool,
}

impl RawFact {
    fn value(&self) -> Option<f64> {
        let mut value = if self.fixed_zero {
            0.0
        } else {
            parse_number(&self.text)?
        };
        if let Some(scale) = self.scale.as_deref().and_then(|s| s.trim().parse::<i32>().ok()) {
            value *= 10f64.powi(scale);
        }
        if self.negated {
            value = -value;
        }
        value.is_finite().then_some(value)
    }
}

/// Element kinds tracked while scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    Period,
    Member,
}

type Scan = (String, HashMap<String, XbrlContext>, Vec<RawFact>);

/// Single streaming pass over the document collecting contexts and facts.
fn scan(bytes: &[u8]) -> Result<Scan> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);
    reader.config_mut().check_end_names = false;

    let mut root: Option<String> = None;
    let mut contexts: HashMap<String, XbrlContext> = HashMap::new();
    let mut facts: Vec<RawFact> = Vec::new();

    let mut depth: usize = 0;
    let mut current_context: Option<(String, XbrlContext, usize)> = None;
    let mut capture: Option<(Capture, String)> = None;
    let mut fact: Option<(RawFact, usize)> = None;
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| DataError::XmlParse(format!("at byte {}: {}", reader.error_position(), e)))?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                let local = local_name(e);
                if root.is_none() {
                    root = Some(local.clone());
                }

                match local.as_str() {
                    "context" if current_context.is_none() => {
                        if let Some(id) = attribute(e, "id")? {
                            let ctx = (id, XbrlContext::default(), depth);
                            if is_empty {
                                contexts.insert(ctx.0, ctx.1);
                            } else {
                                current_context = Some(ctx);
                            }
                        }
                    }
                    "instant" | "endDate" if current_context.is_some() => {
                        if !is_empty {
                            capture = Some((Capture::Period, String::new()));
                        }
                    }
                    "explicitMember" | "typedMember" => {
                        if let Some((_, ctx, _)) = current_context.as_mut() {
                            ctx.dimensional = true;
                            if !is_empty {
                                capture = Some((Capture::Member, String::new()));
                            }
                        }
                    }
                    _ if fact.is_none() && current_context.is_none() => {
                        if let Some(raw) = fact_start(e, &local)? {
                            if !is_empty {
                                fact = Some((raw, depth));
                            } else if raw.fixed_zero {
                                facts.push(raw);
                            }
                        }
                    }
                    _ => {}
                }

                if !is_empty {
                    depth += 1;
                }
            }
            Event::Text(ref t) => {
                let text = t
                    .unescape()
                    .map(|cow| cow.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(t).into_owned());
                if let Some((_, captured)) = capture.as_mut() {
                    captured.push_str(&text);
                } else if let Some((raw, _)) = fact.as_mut() {
                    raw.text.push_str(&text);
                }
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);

                if let Some((kind, text)) = capture.take() {
                    if let Some((_, ctx, _)) = current_context.as_mut() {
                        let text = text.trim();
                        match kind {
                            Capture::Period if !text.is_empty() => {
                                ctx.period_end = Some(text.to_string());
                            }
                            Capture::Member if text.ends_with(NON_CONSOLIDATED_MEMBER) => {
                                ctx.non_consolidated = true;
                            }
                            _ => {}
                        }
                    }
                }

                if current_context
                    .as_ref()
                    .is_some_and(|(_, _, open_depth)| *open_depth == depth)
                    && let Some((id, ctx, _)) = current_context.take()
                {
                    contexts.insert(id, ctx);
                }

                if fact
                    .as_ref()
                    .is_some_and(|(_, open_depth)| *open_depth == depth)
                    && let Some((raw, _)) = fact.take()
                {
                    facts.push(raw);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok((root.unwrap_or_default(), contexts, facts))
}

/// Recognise a fact element and read its attributes.
fn fact_start(e: &BytesStart<'_>, local: &str) -> Result<Option<RawFact>> {
    if local == "nonFraction" {
        let Some(name) = attribute(e, "name")? else {
            return Ok(None);
        };
        if is_nil(e)? {
            return Ok(None);
        }
        let format = attribute(e, "format")?.unwrap_or_default();
        return Ok(Some(RawFact {
            name: strip_prefix(&name).to_string(),
            context_ref: attribute(e, "contextRef")?,
            unit_ref: attribute(e, "unitRef")?,
            decimals: attribute(e, "decimals")?,
            scale: attribute(e, "scale")?,
            negated: attribute(e, "sign")?.as_deref() == Some("-"),
            fixed_zero: format.contains("zero"),
            ..RawFact::default()
        }));
    }

    // Other inline elements (nonNumeric, footnote, ...) carry contextRef but no number
    if e.name().prefix().is_some_and(|p| p.as_ref() == b"ix") {
        return Ok(None);
    }

    let Some(context_ref) = attribute(e, "contextRef")? else {
        return Ok(None);
    };
    if is_nil(e)? {
        return Ok(None);
    }
    Ok(Some(RawFact {
        name: local.to_string(),
        context_ref: Some(context_ref),
        unit_ref: attribute(e, "unitRef")?,
        decimals: attribute(e, "decimals")?,
        ..RawFact::default()
    }))
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

/// Value of the attribute whose local name is `name`.
fn attribute(e: &BytesStart<'_>, name: &str) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| DataError::XmlParse(err.to_string()))?;
        if attr.key.local_name().as_ref() == name.as_bytes() {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn is_nil(e: &BytesStart<'_>) -> Result<bool> {
    Ok(attribute(e, "nil")?.is_some_and(|v| v.trim() == "true"))
}

fn strip_prefix(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}
