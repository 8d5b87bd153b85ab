//! Token lookups over a loaded document.
//!
//! Run in this order, first hit wins: `meta-tag`, `inline-script`,
//! `data-attribute`, `global-state`, `hidden-field`. Only `global-state`
//! needs the live page; the rest work on the serialized HTML.

use crate::strategy::{run_async_chain, AsyncStrategy, StrategyReport, StrategyResult};
use futures::FutureExt;
use regex::Regex;
use scraper::{Html, Selector};
use storescan_browser::PageSession;
use storescan_core::TokenConfig;

/// Inline script patterns built around the configured header name.
#[derive(Debug, Clone)]
pub struct InlinePatterns {
    patterns: Vec<(&'static str, Regex)>,
}

impl InlinePatterns {
    /// Build the five inline-script variants for `header_name`.
    pub fn new(header_name: &str) -> Result<Self, regex::Error> {
        let name = regex::escape(header_name);
        let patterns = vec![
            ("json-double", format!(r#""{name}"\s*:\s*"([^"\\]+)""#)),
            ("json-single", format!(r"'{name}'\s*:\s*'([^'\\]+)'")),
            ("json-escaped", format!(r#"\\"{name}\\"\s*:\s*\\"([^"\\]+)\\""#)),
            (
                "assignment",
                r#"(?i)\b[\w.]*csrf[\w]*\s*=\s*["']([^"']{8,})["']"#.to_string(),
            ),
            (
                "object-property",
                r#"(?i)\b\w*csrf\w*\s*:\s*["']([^"']{8,})["']"#.to_string(),
            ),
        ];

        let patterns = patterns
            .into_iter()
            .map(|(variant, source)| Regex::new(&source).map(|regex| (variant, regex)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Variant names in match order.
    #[must_use]
    pub fn variants(&self) -> Vec<&'static str> {
        self.patterns.iter().map(|(variant, _)| *variant).collect()
    }

    /// First capture over `script`, with the variant that matched.
    #[must_use]
    pub fn find(&self, script: &str) -> Option<(&'static str, String)> {
        self.patterns.iter().find_map(|(variant, regex)| {
            regex
                .captures(script)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().trim().to_string())
                .filter(|value| !value.is_empty())
                .map(|value| (*variant, value))
        })
    }
}

fn selector(css: &str) -> Result<Selector, String> {
    Selector::parse(css).map_err(|e| format!("invalid selector {css}: {e}"))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// `<meta name="..." content="...">`
pub fn meta_tag(html: &str, config: &TokenConfig) -> StrategyResult<String> {
    let document = Html::parse_document(html);
    for name in &config.meta_names {
        let css = format!(r#"meta[name="{name}"]"#);
        let found = document
            .select(&selector(&css)?)
            .find_map(|meta| non_empty(meta.value().attr("content")));
        if found.is_some() {
            return Ok(found);
        }
    }
    Ok(None)
}

/// Pattern search over inline `<script>` bodies.
pub fn inline_script(html: &str, patterns: &InlinePatterns) -> StrategyResult<String> {
    let document = Html::parse_document(html);
    for script in document.select(&selector("script")?) {
        let body: String = script.text().collect();
        if let Some((variant, value)) = patterns.find(&body) {
            tracing::debug!("Inline script token matched the {} pattern", variant);
            return Ok(Some(value));
        }
    }
    Ok(None)
}

/// Any element carrying one of the configured data attributes.
pub fn data_attribute(html: &str, config: &TokenConfig) -> StrategyResult<String> {
    let document = Html::parse_document(html);
    for attr in &config.data_attributes {
        let found = document
            .select(&selector(&format!("[{attr}]"))?)
            .find_map(|element| non_empty(element.value().attr(attr)));
        if found.is_some() {
            return Ok(found);
        }
    }
    Ok(None)
}

/// Hidden `<input>` fields with one of the configured names.
pub fn hidden_field(html: &str, config: &TokenConfig) -> StrategyResult<String> {
    let document = Html::parse_document(html);
    for name in &config.hidden_field_names {
        let css = format!(r#"input[name="{name}"]"#);
        let found = document
            .select(&selector(&css)?)
            .filter(|input| {
                input
                    .value()
                    .attr("type")
                    .is_some_and(|t| t.eq_ignore_ascii_case("hidden"))
            })
            .find_map(|input| non_empty(input.value().attr("value")));
        if found.is_some() {
            return Ok(found);
        }
    }
    Ok(None)
}

/// Wrap a global-state expression so a missing path yields `null`.
#[must_use]
pub fn global_state_script(path: &str) -> String {
    format!(
        "(() => {{ try {{ const v = ({path}); return typeof v === 'string' && v.length > 0 ? v : null; }} catch (e) {{ return null; }} }})()"
    )
}

/// Well-known global-state lookups evaluated in the live page.
pub async fn global_state(page: &dyn PageSession, config: &TokenConfig) -> StrategyResult<String> {
    for path in &config.global_paths {
        match page.evaluate(&global_state_script(path)).await {
            Ok(serde_json::Value::String(value)) if !value.trim().is_empty() => {
                return Ok(Some(value));
            }
            Ok(_) => {}
            Err(e) => tracing::debug!("Global lookup {} failed: {}", path, e),
        }
    }
    Ok(None)
}

/// Run the five document strategies in order over `html`.
pub async fn scan_document(
    page: &dyn PageSession,
    html: &str,
    config: &TokenConfig,
    patterns: &InlinePatterns,
) -> StrategyReport<String> {
    let strategies: Vec<AsyncStrategy<'_, String>> = vec![
        ("meta-tag", async move { meta_tag(html, config) }.boxed()),
        (
            "inline-script",
            async move { inline_script(html, patterns) }.boxed(),
        ),
        (
            "data-attribute",
            async move { data_attribute(html, config) }.boxed(),
        ),
        ("global-state", global_state(page, config).boxed()),
        (
            "hidden-field",
            async move { hidden_field(html, config) }.boxed(),
        ),
    ];
    run_async_chain(strategies).await
}
