// src/sinks/dashboard.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::PathBuf;

use super::{truncate_chars, Sink, SinkContext};
use crate::analyze::rerank::select_top;
use crate::category::Category;
use crate::decision::TimeSensitivity;
use crate::document::write_atomic;
use crate::item::Item;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntelligenceCard {
    pub title: String,
    pub summary: String,
    pub tag: &'static str,
    pub score: Option<f64>,
}

impl IntelligenceCard {
    pub fn from_item(item: &Item) -> Self {
        let urgent = item.category == Category::ListeriaFree
            || item
                .decision
                .as_ref()
                .is_some_and(|d| d.time_sensitivity == TimeSensitivity::Immediate);
        let tag = if urgent {
            "긴급"
        } else if item.category == Category::CulturedMeat {
            "중요"
        } else {
            "정보"
        };

        let summary = if !item.summary.is_empty() {
            item.summary.clone()
        } else if let Some(d) = &item.decision {
            d.impact_reason.split('.').next().unwrap_or_default().trim().to_string()
        } else {
            "분석 중".to_string()
        };

        Self {
            title: truncate_chars(&item.title, 100),
            summary: truncate_chars(&summary, 150),
            tag,
            score: item.rank_score(),
        }
    }
}

/// Read-modify-write of the dashboard document. Only `intelligence` and
/// `last_updated` are replaced; every other key is kept.
pub struct DashboardSink {
    path: PathBuf,
    top_n: usize,
}

impl DashboardSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            top_n: 3,
        }
    }

    pub fn with_top_n(mut self, n: usize) -> Self {
        self.top_n = n.max(1);
        self
    }

    async fn load(&self) -> Result<Map<String, Value>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let seed = json!({"todo_list": [], "system_status": "NORMAL", "intelligence": []});
                return Ok(seed.as_object().cloned().unwrap_or_default());
            }
            Err(e) => return Err(e).with_context(|| format!("reading {}", self.path.display())),
        };
        match serde_json::from_str::<Value>(&text)
            .with_context(|| format!("parsing {}", self.path.display()))?
        {
            Value::Object(m) => Ok(m),
            _ => anyhow::bail!("{} is not a JSON object", self.path.display()),
        }
    }
}

#[async_trait]
impl Sink for DashboardSink {
    async fn publish(&self, ctx: &SinkContext<'_>) -> Result<()> {
        let pool = if ctx.detected.is_empty() { ctx.ranked } else { ctx.detected };
        if pool.is_empty() {
            return Ok(());
        }
        let cards: Vec<IntelligenceCard> = select_top(pool, self.top_n)
            .into_iter()
            .map(IntelligenceCard::from_item)
            .collect();

        let mut doc = self.load().await?;
        doc.insert("intelligence".into(), serde_json::to_value(&cards)?);
        doc.insert(
            "last_updated".into(),
            Value::String(ctx.now.format("%Y-%m-%d %H:%M:%S").to_string()),
        );
        write_atomic(&self.path, &serde_json::to_vec_pretty(&Value::Object(doc))?)?;
        tracing::debug!(target: "pipeline", cards = cards.len(), "dashboard updated");
        Ok(())
    }

    fn name(&self) -> &str {
        "dashboard"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{normalize_record, NormalizePolicy, RawRecord};
    use chrono::Utc;

    #[tokio::test]
    async fn keeps_foreign_keys_and_caps_cards() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dashboard_data.json");
        std::fs::write(&path, r#"{"todo_list":["ship it"],"system_status":"NORMAL","intelligence":[]}"#).unwrap();

        let p = NormalizePolicy::new(Utc::now());
        let items: Vec<Item> = [
            "FDA 리스테리아 긴급 알림 발표",
            "배양육 단가 30% 절감",
            "NVIDIA Blackwell GPU 출하",
            "관세 인상 발표",
        ]
        .iter()
        .map(|t| normalize_record(&RawRecord::plain(*t), &p).unwrap())
        .collect();
        let ctx = SinkContext { now: Utc::now(), detected: &items, ranked: &[] };
        DashboardSink::new(&path).publish(&ctx).await.unwrap();

        let v: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["todo_list"][0], "ship it");
        assert_eq!(v["intelligence"].as_array().unwrap().len(), 3);
        assert!(v["last_updated"].is_string());
        assert_eq!(v["intelligence"][0]["tag"], "긴급");
    }
}
