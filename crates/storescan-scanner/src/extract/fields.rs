//! Secondary item fields.
//!
//! Each field has its own first-match-wins chain; the attempt logs are kept so
//! a result can show which lookup produced each value.

use super::tree::find_key;
use crate::strategy::{StrategyChain, StrategyReport, StrategyResult};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use storescan_core::ExtractionConfig;

static PRICE_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[$€£]\s?\d{1,3}(?:[,.]\d{3})*(?:[.,]\d{2})?")
        .expect("Price regex is hardcoded and valid")
});

/// Inputs available to field lookups.
pub struct FieldSource<'a> {
    /// Parsed catalog payload, when it was valid JSON
    pub payload: Option<&'a Value>,
    /// Parsed document
    pub document: &'a Html,
    /// Payload keys to try
    pub config: &'a ExtractionConfig,
    /// Number of identifiers already extracted
    pub identifier_count: usize,
}

/// Secondary fields of one item page.
#[derive(Debug, Clone, Default)]
pub struct ItemFields {
    /// Display title
    pub title: StrategyReport<Value>,
    /// Price as shown, e.g. `"$4.99"`
    pub price: StrategyReport<Value>,
    /// Availability label
    pub availability: StrategyReport<Value>,
    /// Number of variants
    pub variant_count: StrategyReport<Value>,
}

impl ItemFields {
    /// Run every field chain over `source`.
    #[must_use]
    pub fn lookup(source: &FieldSource<'_>) -> Self {
        Self {
            title: StrategyChain::new()
                .then("payload-key", title_from_payload)
                .then("og-title", og_title)
                .then("title-element", title_element)
                .then("document-title", document_title)
                .run(source),
            price: StrategyChain::new()
                .then("payload-key", price_from_payload)
                .then("itemprop-price", itemprop_price)
                .then("price-element", price_element)
                .then("price-pattern", price_pattern)
                .run(source),
            availability: StrategyChain::new()
                .then("payload-key", availability_from_payload)
                .then("itemprop-availability", itemprop_availability)
                .then("availability-element", availability_element)
                .run(source),
            variant_count: StrategyChain::new()
                .then("payload-key", variant_count_from_payload)
                .then("identifier-count", identifier_count)
                .run(source),
        }
    }

    fn named(&self) -> [(&'static str, &StrategyReport<Value>); 4] {
        [
            ("title", &self.title),
            ("price", &self.price),
            ("availability", &self.availability),
            ("variant_count", &self.variant_count),
        ]
    }

    /// Write found values plus a `field_sources` map naming the winning lookup.
    pub fn write_into(&self, fields: &mut BTreeMap<String, Value>) {
        let mut sources = serde_json::Map::new();
        for (name, report) in self.named() {
            if let (Some(value), Some(winner)) = (&report.value, &report.winner) {
                fields.insert(name.to_string(), value.clone());
                sources.insert(name.to_string(), Value::String(winner.clone()));
            }
        }
        if !sources.is_empty() {
            fields.insert("field_sources".to_string(), Value::Object(sources));
        }
    }
}

fn clean(text: &str) -> Option<String> {
    let joined = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

fn first_text(document: &Html, css: &str) -> StrategyResult<String> {
    let selector = Selector::parse(css).map_err(|e| format!("invalid selector {css}: {e}"))?;
    Ok(document
        .select(&selector)
        .find_map(|element| clean(&element.text().collect::<String>())))
}

fn first_attr(document: &Html, css: &str, attr: &str) -> StrategyResult<String> {
    let selector = Selector::parse(css).map_err(|e| format!("invalid selector {css}: {e}"))?;
    Ok(document
        .select(&selector)
        .find_map(|element| element.value().attr(attr).and_then(clean)))
}

fn payload_string(source: &FieldSource<'_>, keys: &[String]) -> Option<Value> {
    let payload = source.payload?;
    keys.iter().find_map(|key| {
        match find_key(payload, key, source.config.max_depth)? {
            Value::String(s) => clean(s).map(Value::String),
            Value::Number(n) => Some(Value::String(n.to_string())),
            _ => None,
        }
    })
}

fn title_from_payload(source: &FieldSource<'_>) -> StrategyResult<Value> {
    Ok(payload_string(source, &source.config.title_keys))
}

fn og_title(source: &FieldSource<'_>) -> StrategyResult<Value> {
    first_attr(source.document, r#"meta[property="og:title"]"#, "content").map(|v| v.map(Value::String))
}

fn title_element(source: &FieldSource<'_>) -> StrategyResult<Value> {
    first_text(source.document, "#productTitle, h1").map(|v| v.map(Value::String))
}

fn document_title(source: &FieldSource<'_>) -> StrategyResult<Value> {
    first_text(source.document, "title").map(|v| v.map(Value::String))
}

fn price_from_payload(source: &FieldSource<'_>) -> StrategyResult<Value> {
    Ok(payload_string(source, &source.config.price_keys))
}

fn itemprop_price(source: &FieldSource<'_>) -> StrategyResult<Value> {
    if let Some(price) = first_attr(source.document, r#"[itemprop="price"]"#, "content")? {
        return Ok(Some(Value::String(price)));
    }
    first_text(source.document, r#"[itemprop="price"]"#).map(|v| v.map(Value::String))
}

fn price_element(source: &FieldSource<'_>) -> StrategyResult<Value> {
    first_text(source.document, ".a-price .a-offscreen, #price, .price").map(|v| v.map(Value::String))
}

fn price_pattern(source: &FieldSource<'_>) -> StrategyResult<Value> {
    let body = first_text(source.document, "body")?.unwrap_or_default();
    Ok(PRICE_TEXT
        .find(&body)
        .map(|m| Value::String(m.as_str().to_string())))
}

fn availability_from_payload(source: &FieldSource<'_>) -> StrategyResult<Value> {
    Ok(payload_string(source, &source.config.availability_keys))
}

fn itemprop_availability(source: &FieldSource<'_>) -> StrategyResult<Value> {
    let selector = r#"[itemprop="availability"]"#;
    let value = match first_attr(source.document, selector, "href")? {
        Some(href) => Some(href),
        None => first_attr(source.document, selector, "content")?,
    };
    // schema.org values arrive as URLs, e.g. https://schema.org/InStock
    Ok(value.map(|v| {
        let short = v.rsplit('/').next().unwrap_or(&v).to_string();
        Value::String(short)
    }))
}

fn availability_element(source: &FieldSource<'_>) -> StrategyResult<Value> {
    first_text(source.document, "#availability, .availability").map(|v| v.map(Value::String))
}

fn variant_count_from_payload(source: &FieldSource<'_>) -> StrategyResult<Value> {
    let Some(payload) = source.payload else {
        return Ok(None);
    };
    Ok(source.config.variant_count_keys.iter().find_map(|key| {
        match find_key(payload, key, source.config.max_depth)? {
            Value::Number(n) => n.as_u64().map(|count| json!(count)),
            Value::String(s) => s.trim().parse::<u64>().ok().map(|count| json!(count)),
            Value::Array(items) => Some(json!(items.len())),
            _ => None,
        }
    }))
}

fn identifier_count(source: &FieldSource<'_>) -> StrategyResult<Value> {
    Ok((source.identifier_count > 0).then(|| json!(source.identifier_count)))
}
