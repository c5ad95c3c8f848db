//! The persisted canonical document: `{generated_at, items}`.
//!
//! Read once at the start of a run, mutated in memory, written back whole
//! through a temp file + rename. Single writer; nothing here locks.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{PipelineError, Result};
use crate::ingest::{self, NormalizePolicy, RawRecord};
use crate::item::{identity_key, iso_millis, Item};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewsDocument {
    #[serde(with = "iso_millis")]
    pub generated_at: DateTime<Utc>,
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub loaded: usize,
    /// Items that failed strict decoding but normalized from their fields.
    pub renormalized: usize,
    pub skipped: usize,
    pub duplicates: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub added: usize,
    pub duplicates: usize,
}

impl NewsDocument {
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            generated_at: now,
            items: Vec::new(),
        }
    }

    /// Missing file → empty document. Unreadable file or invalid JSON is a
    /// persistence failure.
    pub fn load(path: &Path, policy: &NormalizePolicy) -> Result<(Self, LoadReport)> {
        if !path.exists() {
            return Ok((Self::empty(policy.now), LoadReport::default()));
        }
        let text = fs::read_to_string(path).map_err(|e| PipelineError::persistence(path, e))?;
        Self::from_json_str(&text, policy).map_err(|e| match e {
            PipelineError::Persistence { message, .. } => PipelineError::persistence(path, message),
            other => other,
        })
    }

    pub fn from_json_str(text: &str, policy: &NormalizePolicy) -> Result<(Self, LoadReport)> {
        let doc: Value = serde_json::from_str(text)
            .map_err(|e| PipelineError::persistence("<document>", format!("invalid json: {e}")))?;

        let generated_at = doc
            .get("generated_at")
            .and_then(Value::as_str)
            .and_then(ingest::dates::parse_published_at)
            .unwrap_or(policy.now);

        let raw_items = ingest::json::document_items(&doc).ok_or_else(|| {
            PipelineError::persistence("<document>", "document has no `items` array")
        })?;

        let mut report = LoadReport::default();
        let mut seen = HashSet::new();
        let mut items = Vec::with_capacity(raw_items.len());

        for v in raw_items {
            let item = match serde_json::from_value::<Item>(v.clone()) {
                Ok(mut it) => {
                    if it.id.trim().is_empty() {
                        it.id = identity_key(it.category, &it.title, it.url.as_deref(), &it.source);
                    }
                    report.loaded += 1;
                    it
                }
                Err(strict) => match ingest::normalize_record(&RawRecord::Json(v.clone()), policy) {
                    Ok(it) => {
                        tracing::debug!(target: "pipeline", error = %strict, id = %it.id, "re-normalized stored item");
                        report.renormalized += 1;
                        it
                    }
                    Err(e) => {
                        tracing::warn!(target: "pipeline", error = %e, "dropping unreadable stored item");
                        report.skipped += 1;
                        continue;
                    }
                },
            };
            if seen.insert(item.id.clone()) {
                items.push(item);
            } else {
                report.duplicates += 1;
            }
        }

        Ok((
            Self {
                generated_at,
                items,
            },
            report,
        ))
    }

    /// Append incoming items whose identity key is not present yet.
    /// Existing items win, so merging the same batch twice is a no-op.
    pub fn merge_by_id(&mut self, incoming: Vec<Item>) -> MergeStats {
        let mut ids: HashSet<String> = self.items.iter().map(|i| i.id.clone()).collect();
        let mut stats = MergeStats::default();
        for it in incoming {
            if ids.insert(it.id.clone()) {
                self.items.push(it);
                stats.added += 1;
            } else {
                stats.duplicates += 1;
            }
        }
        stats
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| PipelineError::persistence("<document>", format!("serialize: {e}")))
    }

    /// Write via `<path>.tmp` + rename so readers never see a partial file.
    pub fn save_atomic(&self, path: &Path) -> Result<()> {
        let body = self.to_json_pretty()?;
        write_atomic(path, body.as_bytes())
    }
}

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let fail = |e: std::io::Error| PipelineError::persistence(path, e);
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(fail)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    let mut f = fs::File::create(&tmp).map_err(fail)?;
    f.write_all(bytes).map_err(fail)?;
    f.sync_all().map_err(fail)?;
    fs::rename(&tmp, path).map_err(fail)
}
