// src/ingest/providers/file.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::histogram;
use std::path::{Path, PathBuf};

use crate::ingest::types::RawSource;
use crate::ingest::{json, markdown, RawRecord};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    /// Pick by extension: `.json` → Json, `.txt` → Plain, anything else → Markdown.
    #[default]
    Auto,
    Markdown,
    Json,
    Plain,
}

impl InputFormat {
    pub fn for_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("json") => Self::Json,
            Some("txt") => Self::Plain,
            _ => Self::Markdown,
        }
    }
}

/// Reads one local file of raw records.
pub struct FileSource {
    path: PathBuf,
    format: InputFormat,
    name: String,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("file:{}", path.display());
        Self {
            path,
            format: InputFormat::Auto,
            name,
        }
    }

    pub fn with_format(mut self, format: InputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn parse_str(text: &str, format: InputFormat) -> Result<Vec<RawRecord>> {
        let t0 = std::time::Instant::now();
        let records = match format {
            InputFormat::Json => json::parse_document(text).context("parsing json records")?,
            InputFormat::Plain => text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(RawRecord::plain)
                .collect(),
            InputFormat::Markdown | InputFormat::Auto => markdown::parse_document(text),
        };
        histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(records)
    }
}

#[async_trait]
impl RawSource for FileSource {
    async fn fetch_records(&self) -> Result<Vec<RawRecord>> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))?;
        let format = match self.format {
            InputFormat::Auto => InputFormat::for_path(&self.path),
            f => f,
        };
        let records = Self::parse_str(&text, format)?;
        tracing::debug!(target: "ingest", source = %self.name, records = records.len(), "file parsed");
        Ok(records)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_follows_extension() {
        assert_eq!(InputFormat::for_path(Path::new("a/news.JSON")), InputFormat::Json);
        assert_eq!(InputFormat::for_path(Path::new("raw.txt")), InputFormat::Plain);
        assert_eq!(InputFormat::for_path(Path::new("raw_news.md")), InputFormat::Markdown);
    }

    #[tokio::test]
    async fn reads_plain_lines() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("lines.txt");
        std::fs::write(&p, "first line\n\n  second line  \n").unwrap();
        let recs = FileSource::new(&p).fetch_records().await.unwrap();
        assert_eq!(recs, vec![RawRecord::plain("first line"), RawRecord::plain("second line")]);
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let src = FileSource::new("/definitely/not/here.md");
        assert!(src.fetch_records().await.is_err());
    }
}
