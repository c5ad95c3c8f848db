// src/sinks/html.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;
use std::path::PathBuf;

use super::{truncate_chars, Sink, SinkContext};
use crate::analyze::rerank::select_top;
use crate::document::write_atomic;
use crate::item::Item;

fn anchor_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)(<div[^>]*\bid="intelligence-hub-content"[^>]*>)(.*?)(</div>\s*</section>)"#)
            .expect("anchor regex")
    })
}

pub fn render_card(item: &Item) -> String {
    let title = html_escape::encode_text(&truncate_chars(&item.title, 75)).into_owned();
    let summary = html_escape::encode_text(&truncate_chars(&item.summary, 120)).into_owned();
    let score = item
        .rank_score()
        .map(|s| format!("Score: {s:.2}"))
        .unwrap_or_else(|| "Score: -".to_string());
    let link = match item.url.as_deref().filter(|_| item.is_sourced()) {
        Some(u) => format!(
            "\n    <a href=\"{}\" target=\"_blank\" rel=\"noopener\">원문</a>",
            html_escape::encode_double_quoted_attribute(u)
        ),
        None => String::new(),
    };
    format!(
        "<div class=\"news-item\">\n    \
         <div class=\"news-title\">{icon} {title}</div>\n    \
         <div class=\"news-summary\">{summary}</div>\n    \
         <div class=\"news-meta\"><span>{cat}</span><span>{score}</span></div>{link}\n\
         </div>",
        icon = item.category.icon(),
        cat = item.category.as_str(),
    )
}

/// Replace whatever sits inside the `intelligence-hub-content` anchor.
/// Fails if the anchor is missing, leaving the file untouched.
pub fn inject(page: &str, cards_html: &str) -> Option<String> {
    let caps = anchor_re().captures(page)?;
    let whole = caps.get(0)?;
    let mut out = String::with_capacity(page.len() + cards_html.len());
    out.push_str(&page[..whole.start()]);
    out.push_str(&caps[1]);
    out.push('\n');
    if !cards_html.is_empty() {
        out.push_str(cards_html);
        out.push('\n');
    }
    out.push_str(&caps[3]);
    out.push_str(&page[whole.end()..]);
    Some(out)
}

pub struct HtmlFragmentSink {
    path: PathBuf,
    top_n: usize,
}

impl HtmlFragmentSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            top_n: 2,
        }
    }

    pub fn with_top_n(mut self, n: usize) -> Self {
        self.top_n = n.max(1);
        self
    }
}

#[async_trait]
impl Sink for HtmlFragmentSink {
    async fn publish(&self, ctx: &SinkContext<'_>) -> Result<()> {
        let page = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))?;
        let cards: Vec<String> = select_top(ctx.ranked, self.top_n)
            .into_iter()
            .map(render_card)
            .collect();
        let updated = inject(&page, &cards.join("\n")).with_context(|| {
            format!("no intelligence-hub-content anchor in {}", self.path.display())
        })?;
        write_atomic(&self.path, updated.as_bytes())?;
        Ok(())
    }

    fn name(&self) -> &str {
        "html_fragment"
    }
}
