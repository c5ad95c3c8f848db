// src/ingest/markdown.rs
//! Markdown briefing parser.
//!
//! Two item shapes are understood under a category section:
//!
//! ```text
//! [CATEGORY: listeria_free]
//! - Title | Source | https://url | 2026-01-31T08:00:00Z | score=7.5 | tags=fda,recall | summary=One line
//!
//! ## 🦠 Listeria Free (4)
//! 1. **Title**
//!    - first bullet becomes the summary [web:3]
//!    - later bullets become highlights https://url
//! ```

use once_cell::sync::OnceCell;
use regex::Regex;

use super::{extract_url, RawFields, RawRecord};
use crate::category::Category;

fn re(cell: &'static OnceCell<Regex>, pat: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pat).expect("markdown regex"))
}

fn category_header(line: &str) -> Option<&str> {
    static RE: OnceCell<Regex> = OnceCell::new();
    re(&RE, r"(?i)^\[CATEGORY:\s*([a-z0-9_]+)\s*\]$")
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

fn counted_heading(line: &str) -> bool {
    static RE: OnceCell<Regex> = OnceCell::new();
    re(&RE, r"^#+\s*.*\(\d+\)\s*$").is_match(line)
}

fn plain_heading(line: &str) -> bool {
    static RE: OnceCell<Regex> = OnceCell::new();
    re(&RE, r"^#+\s+").is_match(line)
}

fn numbered_title(line: &str) -> Option<String> {
    static RE: OnceCell<Regex> = OnceCell::new();
    re(&RE, r"^\d+\.\s*\*\*(.+?)\*\*")
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn is_bullet(line: &str) -> bool {
    line.starts_with('-') || line.starts_with('•')
}

fn strip_bullet(line: &str) -> &str {
    line.trim_start_matches(['-', '•', '*']).trim()
}

struct OutlineBuf {
    title: String,
    lines: Vec<String>,
}

/// Split a markdown document into raw records.
///
/// Bullets before any section header are prose and ignored. A `[CATEGORY: x]`
/// header naming an unknown category opens a section with no category, so its
/// records reach the normalizer and are bucketed or counted as malformed there.
pub fn parse_document(text: &str) -> Vec<RawRecord> {
    // None: no section yet. Some(None): section with unresolved category.
    let mut section: Option<Option<Category>> = None;
    let mut outline: Option<OutlineBuf> = None;
    let mut out = Vec::new();

    let flush = |buf: &mut Option<OutlineBuf>, category: Option<Category>, out: &mut Vec<RawRecord>| {
        if let Some(b) = buf.take() {
            out.push(RawRecord::Outline {
                title: b.title,
                lines: b.lines,
                category,
            });
        }
    };

    for raw_line in text.lines() {
        let line = raw_line.trim();
        let current = section.flatten();

        // An open outline item survives blank lines; the next heading,
        // numbered title or section closes it.
        if line.is_empty() {
            continue;
        }

        if let Some(name) = category_header(line) {
            flush(&mut outline, current, &mut out);
            section = Some(Category::parse(name));
            continue;
        }

        if counted_heading(line) || (plain_heading(line) && current.is_none()) {
            flush(&mut outline, current, &mut out);
            if let Some(c) = Category::guess(line) {
                section = Some(Some(c));
            }
            continue;
        }

        if section.is_none() {
            continue;
        }

        if let Some(title) = numbered_title(line) {
            flush(&mut outline, current, &mut out);
            outline = Some(OutlineBuf {
                title,
                lines: Vec::new(),
            });
            continue;
        }

        if is_bullet(line) {
            if let Some(buf) = outline.as_mut() {
                buf.lines.push(line.to_string());
            } else {
                out.push(RawRecord::Markdown {
                    line: line.to_string(),
                    category: current,
                });
            }
        }
    }

    let current = section.flatten();
    flush(&mut outline, current, &mut out);
    out
}

/// Fields of a pipe-delimited bullet.
pub fn parse_bullet(line: &str, category: Option<Category>) -> RawFields {
    let body = strip_bullet(line.trim());
    // Columns are positional; an empty column still holds its slot.
    let parts: Vec<&str> = body.split('|').map(str::trim).collect();
    let column = |i: usize| parts.get(i).copied().filter(|s| !s.is_empty());

    let mut f = RawFields {
        category,
        title: column(0).map(String::from),
        source: column(1).map(String::from),
        url: column(2).and_then(extract_url),
        ..RawFields::default()
    };

    for p in parts.iter().skip(3).filter(|p| !p.is_empty()) {
        if f.published.is_none() && super::dates::parse_published_at(p).is_some() {
            f.published = Some(p.to_string());
        } else if let Some(v) = key_value(p, "score") {
            f.score = v.parse::<f64>().ok();
        } else if let Some(v) = key_value(p, "tags") {
            f.tags = v
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
        } else if let Some(v) = key_value(p, "summary") {
            f.summary = Some(v.to_string());
        }
    }

    if f.url.is_none() {
        f.url = extract_url(body);
    }
    f
}

fn key_value<'a>(part: &'a str, key: &str) -> Option<&'a str> {
    let (k, v) = part.split_once('=')?;
    k.trim()
        .eq_ignore_ascii_case(key)
        .then(|| v.trim())
        .filter(|v| !v.is_empty())
}

/// Fields of a numbered outline item: first bullet is the summary, the rest
/// are highlights. `[web:N]` markers name the source, `[tag:x]` markers in
/// the summary become tags.
pub fn parse_outline(title: &str, lines: &[String], category: Option<Category>) -> RawFields {
    static WEB: OnceCell<Regex> = OnceCell::new();
    static TAG: OnceCell<Regex> = OnceCell::new();
    let web = re(&WEB, r"\[web:(\d+)\]");
    let tag = re(&TAG, r"\[tag:([^\]]+)\]");

    let mut f = RawFields {
        category,
        title: Some(title.to_string()),
        ..RawFields::default()
    };

    for line in lines {
        let content = strip_bullet(line.trim());
        if content.is_empty() {
            continue;
        }
        if f.source.is_none() {
            if let Some(c) = web.captures(content) {
                f.source = Some(format!("web:{}", &c[1]));
            }
        }
        if f.url.is_none() {
            f.url = extract_url(content);
        }
        if f.summary.is_none() {
            f.summary = Some(content.to_string());
        } else {
            f.highlights.push(content.to_string());
        }
    }

    if let Some(summary) = &f.summary {
        f.tags = tag
            .captures_iter(summary)
            .map(|c| c[1].trim().to_string())
            .collect();
    }
    f
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "\
Intro prose
- stray bullet that is not news

[CATEGORY: listeria_free]
- FDA expands recall | FDA | https://fda.gov/r1 | 2026-02-09 | score=8.5 | tags=fda,recall | summary=Ready-to-eat salads
- Second item | Wire | https://wire.io/2

## 🤖 Computer & AI (5)
1. **Blackwell ramps up**
   - Shipments double [web:4] [tag:gpu]
   - Cloud prices drop https://news.io/gpu

2. **Model price war**
   - Vendors cut API prices
";

    #[test]
    fn document_yields_bullets_and_outlines() {
        let recs = parse_document(DOC);
        assert_eq!(recs.len(), 4);
        assert!(matches!(
            &recs[0],
            RawRecord::Markdown { category: Some(Category::ListeriaFree), .. }
        ));
        match &recs[2] {
            RawRecord::Outline { title, lines, category } => {
                assert_eq!(title, "Blackwell ramps up");
                assert_eq!(lines.len(), 2);
                assert_eq!(*category, Some(Category::ComputerAi));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(&recs[3], RawRecord::Outline { title, .. } if title == "Model price war"));
    }

    #[test]
    fn bullet_fields() {
        let f = parse_bullet(
            "- FDA expands recall | FDA | https://fda.gov/r1 | 2026-02-09 | score=8.5 | tags=fda, recall | summary=Ready-to-eat salads",
            Some(Category::ListeriaFree),
        );
        assert_eq!(f.title.as_deref(), Some("FDA expands recall"));
        assert_eq!(f.source.as_deref(), Some("FDA"));
        assert_eq!(f.url.as_deref(), Some("https://fda.gov/r1"));
        assert_eq!(f.published.as_deref(), Some("2026-02-09"));
        assert_eq!(f.score, Some(8.5));
        assert_eq!(f.tags, vec!["fda", "recall"]);
        assert_eq!(f.summary.as_deref(), Some("Ready-to-eat salads"));
    }

    #[test]
    fn outline_fields() {
        let lines = vec![
            "- Shipments double [web:4] [tag:gpu]".to_string(),
            "- Cloud prices drop https://news.io/gpu".to_string(),
        ];
        let f = parse_outline("Blackwell ramps up", &lines, Some(Category::ComputerAi));
        assert_eq!(f.source.as_deref(), Some("web:4"));
        assert_eq!(f.url.as_deref(), Some("https://news.io/gpu"));
        assert_eq!(f.tags, vec!["gpu"]);
        assert_eq!(f.highlights.len(), 1);
    }

    #[test]
    fn unknown_category_header_keeps_records_unresolved() {
        let recs = parse_document("[CATEGORY: sports]\n- Cup final | Wire | https://x.io/c\n");
        assert_eq!(recs.len(), 1);
        assert!(matches!(&recs[0], RawRecord::Markdown { category: None, .. }));
    }

    #[test]
    fn outline_survives_blank_lines() {
        let recs = parse_document("[CATEGORY: computer_ai]\n1. **GPU glut**\n\n   - Spot prices fall\n");
        match &recs[..] {
            [RawRecord::Outline { lines, .. }] => assert_eq!(lines.len(), 1),
            other => panic!("unexpected {other:?}"),
        }
    }
}
