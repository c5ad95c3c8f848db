// src/sinks/history.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::{analysis_line, Sink, SinkContext};
use crate::document::write_atomic;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: String,
    pub news: String,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub analysis: String,
}

/// Flat JSON array of every detection, appended per run.
pub struct HistorySink {
    path: PathBuf,
}

impl HistorySink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<Vec<serde_json::Value>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) if text.trim().is_empty() => Ok(Vec::new()),
            Ok(text) => serde_json::from_str(&text)
                .with_context(|| format!("{} is not a JSON array", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e).with_context(|| format!("reading {}", self.path.display())),
        }
    }
}

#[async_trait]
impl Sink for HistorySink {
    async fn publish(&self, ctx: &SinkContext<'_>) -> Result<()> {
        if ctx.detected.is_empty() {
            return Ok(());
        }
        // Unknown entry shapes are kept as-is.
        let mut entries = self.load().await?;
        let stamp = ctx.now.to_rfc3339();
        for it in ctx.detected {
            let e = HistoryEntry {
                timestamp: stamp.clone(),
                news: it.title.clone(),
                keywords: it.keywords.clone(),
                analysis: analysis_line(it),
            };
            entries.push(serde_json::to_value(e)?);
        }
        let body = serde_json::to_vec_pretty(&entries)?;
        write_atomic(&self.path, &body)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "history"
    }
}
