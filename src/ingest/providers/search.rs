// src/ingest/providers/search.rs
use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::analyze::ai_adapter::Provider;
use crate::analyze::lenient;
use crate::category::Category;
use crate::ingest::types::RawSource;
use crate::ingest::{markdown, RawRecord};

const BRIEFING_SYSTEM: &str =
    "You are a news researcher. Report only real, recent articles with their original URLs.";

/// Asks a search-capable provider for a daily briefing covering every
/// category, then parses the reply as markdown sections or a JSON array.
pub struct SearchSource<P: Provider> {
    provider: P,
    days_back: u32,
    per_category: usize,
}

impl<P: Provider> SearchSource<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            days_back: 2,
            per_category: 5,
        }
    }

    pub fn with_window(mut self, days_back: u32, per_category: usize) -> Self {
        self.days_back = days_back.max(1);
        self.per_category = per_category.max(1);
        self
    }

    pub fn briefing_prompt(&self) -> String {
        let mut p = format!(
            "Collect the most relevant news from the last {} days, {} items per section.\n\
             Write one section per category using the exact header `[CATEGORY: <key>]`, \
             then one bullet per article:\n\
             - <title> | <source> | <https url> | <YYYY-MM-DD> | summary=<one sentence>\n\n",
            self.days_back, self.per_category
        );
        for c in Category::ALL {
            p.push_str(&format!("[CATEGORY: {}] {}: {}\n", c.as_str(), c.label(), c.backfill_topic()));
        }
        p
    }
}

/// Markdown sections first; a JSON array if the reply carried no bullets.
pub fn parse_briefing(text: &str) -> Vec<RawRecord> {
    let records = markdown::parse_document(text);
    if !records.is_empty() {
        return records;
    }
    lenient::extract_json_array(text)
        .map(|arr| arr.into_iter().map(RawRecord::Json).collect())
        .unwrap_or_default()
}

#[async_trait]
impl<P: Provider> RawSource for SearchSource<P> {
    async fn fetch_records(&self) -> Result<Vec<RawRecord>> {
        let prompt = self.briefing_prompt();
        let text = self
            .provider
            .complete(BRIEFING_SYSTEM, &prompt)
            .await
            .with_context(|| format!("daily briefing via {}", self.provider.name()))?;
        let records = parse_briefing(&text);
        tracing::info!(target: "ingest", provider = self.provider.name(), records = records.len(), "briefing parsed");
        Ok(records)
    }

    fn name(&self) -> &str {
        "search"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::ai_adapter::MockProvider;

    #[test]
    fn prompt_names_every_category() {
        let p = SearchSource::new(MockProvider::new("")).briefing_prompt();
        for c in Category::ALL {
            assert!(p.contains(&format!("[CATEGORY: {}]", c.as_str())));
        }
    }

    #[tokio::test]
    async fn markdown_reply_becomes_records() {
        let reply = "[CATEGORY: computer_ai]\n\
                     - Blackwell supply tightens | Reuters | https://reuters.com/gpu | 2026-02-09\n";
        let src = SearchSource::new(MockProvider::new(reply));
        let recs = src.fetch_records().await.unwrap();
        assert_eq!(recs.len(), 1);
        assert!(matches!(
            &recs[0],
            RawRecord::Markdown { category: Some(Category::ComputerAi), .. }
        ));
    }

    #[test]
    fn json_reply_is_accepted() {
        let recs = parse_briefing("[{\"category\":\"global_biz\",\"title\":\"Tariff\"}]");
        assert_eq!(recs.len(), 1);
    }
}
