// src/ingest/json.rs
//! JSON records and documents, with the field aliases search tools emit.

use serde_json::Value;

use super::{RawFields, RawRecord};
use crate::category::Category;
use crate::decision::coerce_f64;
use crate::error::{PipelineError, Result};

/// First non-empty string under any of `keys`.
fn first_str(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match obj.get(*k) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn string_list(v: Option<&Value>) -> Vec<String> {
    match v {
        Some(Value::Array(arr)) => arr
            .iter()
            .filter_map(|x| match x {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        Some(Value::String(s)) => s.split(',').map(|t| t.trim().to_string()).collect(),
        _ => Vec::new(),
    }
}

/// Fields of one JSON object. Non-objects are malformed.
pub fn fields_from_value(v: &Value) -> Result<RawFields> {
    let obj = v
        .as_object()
        .ok_or_else(|| PipelineError::malformed("json record is not an object"))?;

    let category_hint = first_str(obj, &["category", "section", "topic"]);
    let score = ["score", "relevance"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(coerce_f64));

    Ok(RawFields {
        category: category_hint.as_deref().and_then(Category::parse),
        category_hint,
        title: first_str(obj, &["title", "headline"]),
        source: first_str(obj, &["source", "publisher"]),
        url: first_str(obj, &["url", "link"]),
        published: first_str(obj, &["published_at", "published", "date"]),
        summary: first_str(obj, &["summary", "description"]),
        highlights: string_list(obj.get("highlights")),
        tags: string_list(obj.get("tags")),
        score,
    })
}

/// The item array inside a JSON document: a bare array, `{items: [...]}`
/// or `{results: [...]}`.
pub fn document_items(doc: &Value) -> Option<&Vec<Value>> {
    match doc {
        Value::Array(arr) => Some(arr),
        Value::Object(map) => ["items", "results"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_array)),
        _ => None,
    }
}

pub fn parse_document(text: &str) -> Result<Vec<RawRecord>> {
    let doc: Value = serde_json::from_str(text)
        .map_err(|e| PipelineError::malformed(format!("invalid json document: {e}")))?;
    let items = document_items(&doc)
        .ok_or_else(|| PipelineError::malformed("json document has no item array"))?;
    Ok(items.iter().cloned().map(RawRecord::Json).collect())
}
