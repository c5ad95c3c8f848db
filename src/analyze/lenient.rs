// src/analyze/lenient.rs
//! Pull JSON out of chatty model replies (prose, code fences, trailing notes).

use serde_json::Value;

/// Byte span of the first balanced `open … close` block, string-aware.
fn balanced_span(text: &str, open: u8, close: u8) -> Option<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut search_from = 0;

    while let Some(rel) = bytes[search_from..].iter().position(|&b| b == open) {
        let start = search_from + rel;
        let mut depth = 0usize;
        let mut in_str = false;
        let mut escaped = false;

        for (i, &b) in bytes.iter().enumerate().skip(start) {
            if in_str {
                match b {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_str = false,
                    _ => {}
                }
                continue;
            }
            match b {
                b'"' => in_str = true,
                _ if b == open => depth += 1,
                _ if b == close => {
                    depth -= 1;
                    if depth == 0 {
                        return Some((start, i + 1));
                    }
                }
                _ => {}
            }
        }
        // Unbalanced from here on; try the next opener.
        search_from = start + 1;
    }
    None
}

/// First balanced JSON object that actually parses.
pub fn first_json_object(text: &str) -> Option<Value> {
    let mut rest = text;
    while let Some((s, e)) = balanced_span(rest, b'{', b'}') {
        if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(&rest[s..e]) {
            return Some(v);
        }
        rest = &rest[s + 1..];
    }
    None
}

/// First JSON array in the reply, or the `items`/`results` array of the
/// first object carrying one.
pub fn extract_json_array(text: &str) -> Option<Vec<Value>> {
    let mut rest = text;
    while let Some((s, e)) = balanced_span(rest, b'[', b']') {
        if let Ok(Value::Array(arr)) = serde_json::from_str::<Value>(&rest[s..e]) {
            if arr.iter().any(Value::is_object) || arr.is_empty() {
                return Some(arr);
            }
        }
        rest = &rest[s + 1..];
    }

    let obj = first_json_object(text)?;
    crate::ingest::json::document_items(&obj).cloned()
}
