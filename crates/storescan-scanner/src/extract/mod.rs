//! Item page extraction.
//!
//! Identifiers come from the structured catalog payload embedded in the page
//! (an element attribute holding JSON). Five strategies run in order:
//!
//! 1. `direct-attribute`: the payload's primary identifier list
//! 2. `nested-parameter`: well-known secondary payload locations
//! 3. `exhaustive-search`: the best-scoring array anywhere in the payload;
//!    it replaces the result of 1 or 2 when it scores higher
//! 4. `serialized-pattern`: fixed-length pattern over the re-serialized payload,
//!    widened when it yields fewer than five matches
//! 5. `raw-text`: the same scan over the unparsed payload string, only when
//!    the payload is not valid JSON
//!
//! Secondary fields run through their own chains (see [`fields`]).

pub mod fields;
pub mod tree;

use crate::strategy::{Attempt, AttemptOutcome, StrategyChain, StrategyReport, StrategyResult};
use fields::{FieldSource, ItemFields};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use storescan_core::ExtractionConfig;
use tree::{lookup_path, ArrayVisitor};

/// Primary identifier length.
pub const IDENTIFIER_LEN: usize = 10;

/// Below this many primary matches the pattern scan widens.
pub const MIN_PRIMARY_MATCHES: usize = 5;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9]{10}$").expect("Identifier regex is hardcoded and valid"));

static PRIMARY_SCAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z0-9]{10}\b").expect("Scan regex is hardcoded and valid"));

static WIDENED_SCAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z0-9]{8,15}\b").expect("Scan regex is hardcoded and valid"));

/// Whether `candidate` looks like a catalog identifier: exactly
/// [`IDENTIFIER_LEN`] ASCII alphanumerics.
#[must_use]
pub fn is_identifier(candidate: &str) -> bool {
    IDENTIFIER.is_match(candidate)
}

/// A loaded item page.
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
    /// URL the document was loaded from
    pub url: String,
    /// Serialized HTML
    pub html: String,
}

impl DocumentSnapshot {
    /// Snapshot of `html` loaded from `url`.
    #[must_use]
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }
}

/// One extracted catalog record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Catalog identifier
    pub identifier: String,
    /// Strategy that produced it
    pub strategy: String,
}

/// Everything extracted from one document.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Identifier records, deduplicated, in payload order
    pub records: Vec<Record>,
    /// Identifier strategy attempts
    pub attempts: Vec<Attempt>,
    /// Secondary fields with their own attempt logs
    pub fields: ItemFields,
}

impl Extraction {
    /// Whether no identifiers were found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Identifier values.
    #[must_use]
    pub fn identifiers(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.identifier.as_str()).collect()
    }

    /// Flatten into the field map stored on a `ScanResult`.
    #[must_use]
    pub fn to_fields(&self) -> BTreeMap<String, Value> {
        let mut fields = BTreeMap::new();
        fields.insert("identifiers".to_string(), json!(self.identifiers()));
        if let Some(record) = self.records.first() {
            fields.insert(
                "identifier_strategy".to_string(),
                Value::String(record.strategy.clone()),
            );
        }
        self.fields.write_into(&mut fields);
        fields
    }
}

enum Payload {
    Parsed(Value),
    Unparsable { raw: String, error: String },
    Missing(String),
}

struct PayloadInput<'a> {
    payload: &'a Value,
    config: &'a ExtractionConfig,
}

/// Multi-strategy extractor. Pure with respect to the snapshot it is given.
#[derive(Debug, Clone)]
pub struct ExtractionPipeline {
    config: ExtractionConfig,
}

impl ExtractionPipeline {
    /// Pipeline using the given payload locations and field keys.
    #[must_use]
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    /// Extract identifiers and secondary fields from a snapshot.
    #[must_use]
    pub fn extract(&self, snapshot: &DocumentSnapshot) -> Extraction {
        let document = Html::parse_document(&snapshot.html);
        let payload = self.read_payload(&document);

        let report = match &payload {
            Payload::Parsed(value) => self.structured(value),
            Payload::Unparsable { raw, error } => {
                tracing::debug!("Payload on {} is not valid JSON: {}", snapshot.url, error);
                let mut report = StrategyReport::new();
                report.record("structural-parse", Err(error.clone()));
                report.record("raw-text", pattern_scan(raw));
                report
            }
            Payload::Missing(reason) => {
                let mut report = StrategyReport::new();
                report.record("payload-lookup", Err(reason.clone()));
                report
            }
        };

        let parsed = match &payload {
            Payload::Parsed(value) => Some(value),
            _ => None,
        };
        let strategy = report.winner.clone().unwrap_or_default();
        let records: Vec<Record> = report
            .value
            .unwrap_or_default()
            .into_iter()
            .map(|identifier| Record {
                identifier,
                strategy: strategy.clone(),
            })
            .collect();

        let fields = ItemFields::lookup(&FieldSource {
            payload: parsed,
            document: &document,
            config: &self.config,
            identifier_count: records.len(),
        });

        tracing::debug!(
            "Extracted {} identifiers from {} via {}",
            records.len(),
            snapshot.url,
            if strategy.is_empty() { "nothing" } else { strategy.as_str() }
        );

        Extraction {
            records,
            attempts: report.attempts,
            fields,
        }
    }

    fn read_payload(&self, document: &Html) -> Payload {
        let selector = match Selector::parse(&self.config.payload_selector) {
            Ok(selector) => selector,
            Err(e) => {
                return Payload::Missing(format!(
                    "invalid payload selector {}: {e}",
                    self.config.payload_selector
                ))
            }
        };
        let Some(element) = document.select(&selector).next() else {
            return Payload::Missing(format!(
                "no element matches {}",
                self.config.payload_selector
            ));
        };

        let raw = element
            .value()
            .attr(&self.config.payload_attribute)
            .map_or_else(|| element.text().collect::<String>(), str::to_string);
        if raw.trim().is_empty() {
            return Payload::Missing("payload element is empty".to_string());
        }

        match serde_json::from_str(&raw) {
            Ok(value) => Payload::Parsed(value),
            Err(e) => Payload::Unparsable {
                raw,
                error: e.to_string(),
            },
        }
    }

    fn structured(&self, payload: &Value) -> StrategyReport<Vec<String>> {
        let input = PayloadInput {
            payload,
            config: &self.config,
        };

        let mut report = StrategyChain::new()
            .then("direct-attribute", direct_attribute)
            .then("nested-parameter", nested_parameter)
            .run(&input);

        let current = report.value.as_ref().map_or(0, Vec::len);
        match exhaustive_search(&input) {
            Ok(Some(candidate)) if candidate.len() > current => {
                if current > 0 {
                    tracing::debug!(
                        "Exhaustive search outscored {:?} ({} > {})",
                        report.winner,
                        candidate.len(),
                        current
                    );
                }
                report.record("exhaustive-search", Ok(Some(candidate)));
            }
            Ok(Some(_)) => report
                .attempts
                .push(Attempt::new("exhaustive-search", AttemptOutcome::Miss)),
            other => {
                report.record("exhaustive-search", other);
            }
        }

        if !report.is_hit() {
            report.record("serialized-pattern", pattern_scan(&payload.to_string()));
        }
        report
    }
}

fn valid_identifiers(items: &[Value]) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .iter()
        .filter_map(Value::as_str)
        .filter(|candidate| is_identifier(candidate))
        .filter(|candidate| seen.insert(*candidate))
        .map(str::to_string)
        .collect()
}

fn non_empty(ids: Vec<String>) -> Option<Vec<String>> {
    if ids.is_empty() {
        None
    } else {
        Some(ids)
    }
}

fn direct_attribute(input: &PayloadInput<'_>) -> StrategyResult<Vec<String>> {
    Ok(input
        .payload
        .get(&input.config.primary_key)
        .and_then(Value::as_array)
        .and_then(|items| non_empty(valid_identifiers(items))))
}

fn nested_parameter(input: &PayloadInput<'_>) -> StrategyResult<Vec<String>> {
    Ok(input.config.nested_paths.iter().find_map(|path| {
        lookup_path(input.payload, path)
            .and_then(Value::as_array)
            .and_then(|items| non_empty(valid_identifiers(items)))
    }))
}

fn exhaustive_search(input: &PayloadInput<'_>) -> StrategyResult<Vec<String>> {
    let visitor = ArrayVisitor::new(input.config.max_depth);
    let mut best: Option<Vec<String>> = None;
    for node in visitor.arrays(input.payload) {
        let candidate = valid_identifiers(node.items);
        // Strictly greater keeps the first (shallowest) array on ties.
        if candidate.len() > best.as_ref().map_or(0, Vec::len) {
            tracing::trace!("Array {} scores {}", node.path, candidate.len());
            best = Some(candidate);
        }
    }
    Ok(best)
}

/// Fixed-length pattern scan with the widened fallback.
fn pattern_scan(text: &str) -> StrategyResult<Vec<String>> {
    let primary = scan_with(&PRIMARY_SCAN, text);
    if primary.len() >= MIN_PRIMARY_MATCHES {
        return Ok(Some(primary));
    }
    let widened = scan_with(&WIDENED_SCAN, text);
    if widened.len() > primary.len() {
        tracing::debug!(
            "Primary pattern found {} matches, widened pattern found {}",
            primary.len(),
            widened.len()
        );
        return Ok(Some(widened));
    }
    Ok(non_empty(primary))
}

fn scan_with(pattern: &Regex, text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    pattern
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|candidate| seen.insert(*candidate))
        .map(str::to_string)
        .collect()
}
