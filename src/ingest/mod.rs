// src/ingest/mod.rs
pub mod config;
pub mod dates;
pub mod json;
pub mod markdown;
pub mod providers;
pub mod types;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;

use crate::category::Category;
use crate::decision::clamp_score;
use crate::error::{PipelineError, Result};
use crate::item::{identity_key, is_absolute_http_url, EnrichmentStatus, Item};
pub use dates::DateFallback;

const TEXT_CAP: usize = 1500;
const TITLE_CAP: usize = 300;
const TAG_CAP: usize = 40;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("radar_records_total", "Raw records handed to the normalizer.");
        describe_counter!(
            "radar_malformed_total",
            "Records skipped as malformed (missing title, bad date, unknown category)."
        );
        describe_counter!(
            "radar_duplicates_total",
            "Records dropped because their identity key was already seen."
        );
        describe_histogram!("ingest_parse_ms", "Source parse time in milliseconds.");
    });
}

/// One raw input record, tagged by the shape it arrived in.
#[derive(Debug, Clone, PartialEq)]
pub enum RawRecord {
    /// Pipe-delimited bullet: `title | source | url | date | score=.. | tags=a,b | summary=..`.
    Markdown {
        line: String,
        category: Option<Category>,
    },
    /// Numbered `1. **title**` item with its continuation bullets.
    Outline {
        title: String,
        lines: Vec<String>,
        category: Option<Category>,
    },
    /// One element of a JSON document.
    Json(Value),
    /// Bare sentence. Category is guessed from the text when absent.
    Plain {
        text: String,
        category: Option<Category>,
    },
}

impl RawRecord {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain {
            text: text.into(),
            category: None,
        }
    }

    /// Force the record into `category`, whatever it said before.
    pub fn with_category(self, category: Category) -> Self {
        match self {
            Self::Markdown { line, .. } => Self::Markdown {
                line,
                category: Some(category),
            },
            Self::Outline { title, lines, .. } => Self::Outline {
                title,
                lines,
                category: Some(category),
            },
            Self::Plain { text, .. } => Self::Plain {
                text,
                category: Some(category),
            },
            Self::Json(mut v) => {
                if let Value::Object(map) = &mut v {
                    map.insert("category".into(), Value::String(category.as_str().into()));
                    map.remove("section");
                    map.remove("topic");
                }
                Self::Json(v)
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Markdown { .. } => "markdown",
            Self::Outline { .. } => "outline",
            Self::Json(_) => "json",
            Self::Plain { .. } => "plain",
        }
    }
}

/// Fields extracted by a per-variant parser, before cleanup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFields {
    pub category: Option<Category>,
    /// Free-text category label when no exact category is known.
    pub category_hint: Option<String>,
    pub title: Option<String>,
    pub source: Option<String>,
    pub url: Option<String>,
    pub published: Option<String>,
    pub summary: Option<String>,
    pub highlights: Vec<String>,
    pub tags: Vec<String>,
    pub score: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct NormalizePolicy {
    pub now: DateTime<Utc>,
    /// Bucket for records whose category can't be resolved. `None` rejects them.
    pub default_category: Option<Category>,
    pub max_tags: usize,
    pub date_fallback: DateFallback,
}

impl NormalizePolicy {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            default_category: None,
            max_tags: 5,
            date_fallback: DateFallback::RunTime,
        }
    }

    pub fn with_default_category(mut self, c: Option<Category>) -> Self {
        self.default_category = c;
        self
    }

    pub fn with_date_fallback(mut self, f: DateFallback) -> Self {
        self.date_fallback = f;
        self
    }
}

/// Normalize text: decode entities, strip tags, ASCII quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[a-z][^>]*>").expect("tag regex"));
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (nbsp included)
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"[\s\u{00A0}]+").expect("ws regex"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    cap_chars(out, TEXT_CAP)
}

/// Title cleanup: `normalize_text`, markdown emphasis and trailing sentence
/// punctuation removed, capped at 300 chars.
pub fn normalize_title(s: &str) -> String {
    let mut out = normalize_text(s);
    out = out.trim_matches('*').trim().to_string();

    while let Some(last) = out.chars().last() {
        if matches!(last, '!' | '?' | '.' | ',' | ':' | ';') {
            out.pop();
        } else {
            break;
        }
    }
    cap_chars(out.trim_end().to_string(), TITLE_CAP)
}

fn cap_chars(s: String, cap: usize) -> String {
    if s.chars().count() > cap {
        s.chars().take(cap).collect()
    } else {
        s
    }
}

/// First `http(s)://` URL in a string.
pub fn extract_url(s: &str) -> Option<String> {
    static RE_URL: OnceCell<Regex> = OnceCell::new();
    let re = RE_URL.get_or_init(|| Regex::new(r#"(?i)https?://[^\s)\]>"']+"#).expect("url regex"));
    re.find(s).map(|m| m.as_str().to_string())
}

/// Parse one record into its fields. Pure.
pub fn parse_fields(record: &RawRecord) -> Result<RawFields> {
    match record {
        RawRecord::Markdown { line, category } => Ok(markdown::parse_bullet(line, *category)),
        RawRecord::Outline {
            title,
            lines,
            category,
        } => Ok(markdown::parse_outline(title, lines, *category)),
        RawRecord::Json(v) => json::fields_from_value(v),
        RawRecord::Plain { text, category } => Ok(RawFields {
            category: category.or_else(|| Category::guess(text)),
            title: Some(text.clone()),
            ..RawFields::default()
        }),
    }
}

/// Canonical constructor shared by every record variant.
pub fn build_item(fields: RawFields, policy: &NormalizePolicy) -> Result<Item> {
    let title = fields
        .title
        .as_deref()
        .map(normalize_title)
        .unwrap_or_default();
    if title.is_empty() {
        return Err(PipelineError::malformed("missing title"));
    }

    let category = fields
        .category
        .or_else(|| fields.category_hint.as_deref().and_then(Category::guess))
        .or(policy.default_category)
        .ok_or_else(|| {
            PipelineError::malformed(format!(
                "unknown category `{}`",
                fields.category_hint.as_deref().unwrap_or_default()
            ))
        })?;

    let published_at = dates::resolve(fields.published.as_deref(), policy.now, policy.date_fallback)
        .ok_or_else(|| {
            PipelineError::malformed(format!(
                "unparseable date `{}`",
                fields.published.as_deref().unwrap_or_default()
            ))
        })?;

    let source = fields
        .source
        .as_deref()
        .map(normalize_text)
        .unwrap_or_default();

    let url = fields
        .url
        .map(|u| u.trim().to_string())
        .filter(|u| is_absolute_http_url(u));

    let summary = fields
        .summary
        .as_deref()
        .map(normalize_text)
        .unwrap_or_default();

    let highlights = fields
        .highlights
        .iter()
        .map(|h| normalize_text(h))
        .filter(|h| !h.is_empty())
        .collect();

    let score = fields.score.filter(|s| s.is_finite()).map(clamp_score);

    let id = identity_key(category, &title, url.as_deref(), &source);

    Ok(Item {
        id,
        category,
        title,
        source,
        url,
        published_at,
        summary,
        highlights,
        tags: clean_tags(&fields.tags, policy.max_tags),
        keywords: Vec::new(),
        score,
        decision: None,
        status: EnrichmentStatus::Collecting,
        decision_generated_at: None,
    })
}

/// Trim, cap each tag, drop empties and case-insensitive repeats, keep `max`.
pub fn clean_tags(tags: &[String], max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for t in tags {
        let t = cap_chars(normalize_text(t), TAG_CAP);
        if t.is_empty() || !seen.insert(t.to_lowercase()) {
            continue;
        }
        out.push(t);
        if out.len() == max {
            break;
        }
    }
    out
}

pub fn normalize_record(record: &RawRecord, policy: &NormalizePolicy) -> Result<Item> {
    build_item(parse_fields(record)?, policy)
}

/// Normalized batch with its skip counts.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub items: Vec<Item>,
    pub malformed: usize,
    pub duplicates: usize,
}

/// Normalize a batch. Malformed records are skipped and counted; repeated
/// identity keys keep the first occurrence.
pub fn normalize_batch(records: &[RawRecord], policy: &NormalizePolicy) -> BatchOutcome {
    ensure_metrics_described();

    let mut out = BatchOutcome::default();
    let mut seen: HashSet<String> = HashSet::new();

    for rec in records {
        match normalize_record(rec, policy) {
            Ok(item) => {
                if seen.insert(item.id.clone()) {
                    out.items.push(item);
                } else {
                    out.duplicates += 1;
                }
            }
            Err(e) => {
                tracing::debug!(target: "ingest", kind = rec.kind(), error = %e, "skipping record");
                out.malformed += 1;
            }
        }
    }

    counter!("radar_records_total").increment(records.len() as u64);
    counter!("radar_malformed_total").increment(out.malformed as u64);
    counter!("radar_duplicates_total").increment(out.duplicates as u64);

    out
}
