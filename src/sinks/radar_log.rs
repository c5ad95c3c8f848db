// src/sinks/radar_log.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fmt::Write as _;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

use super::{analysis_line, truncate_chars, Sink, SinkContext};
use crate::item::Item;

pub const RADAR_LOG_HEADER: &str = "# Project Radar - 뉴스 감지 로그\n\n";

/// Append-only markdown log, one entry per detected item.
pub struct RadarLogSink {
    path: PathBuf,
}

impl RadarLogSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn render_entry(item: &Item, stamp: &str) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "## [{stamp}] 신규 감지");
        let _ = writeln!(s, "**뉴스**: {}\n", truncate_chars(&item.title, 100));
        let _ = writeln!(s, "**감지 키워드**: {}\n", item.keywords.join(", "));
        let analysis = analysis_line(item);
        if !analysis.is_empty() {
            let _ = writeln!(s, "**분석**: {analysis}");
        }
        s.push_str("\n---\n\n");
        s
    }
}

#[async_trait]
impl Sink for RadarLogSink {
    async fn publish(&self, ctx: &SinkContext<'_>) -> Result<()> {
        if ctx.detected.is_empty() {
            return Ok(());
        }
        let stamp = ctx.now.format("%Y-%m-%d %H:%M:%S").to_string();
        let mut body = String::new();
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(dir).await?;
            }
            body.push_str(RADAR_LOG_HEADER);
        }
        for it in ctx.detected {
            body.push_str(&Self::render_entry(it, &stamp));
        }

        let mut f = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("opening {}", self.path.display()))?;
        f.write_all(body.as_bytes()).await.context("appending radar log")?;
        f.flush().await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "radar_log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{normalize_record, NormalizePolicy, RawRecord};
    use chrono::Utc;

    #[tokio::test]
    async fn header_written_once_then_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Project_Radar.md");
        let mut item = normalize_record(&RawRecord::plain("FDA 리스테리아 긴급 알림 발표"), &NormalizePolicy::new(Utc::now())).unwrap();
        item.keywords = vec!["리스테리아".into(), "fda".into()];
        let items = [item];
        let ctx = SinkContext { now: Utc::now(), detected: &items, ranked: &[] };

        let sink = RadarLogSink::new(&path);
        sink.publish(&ctx).await.unwrap();
        sink.publish(&ctx).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("# Project Radar").count(), 1);
        assert_eq!(text.matches("신규 감지").count(), 2);
        assert!(text.contains("**감지 키워드**: 리스테리아, fda"));
    }
}
