// src/ingest/types.rs
use anyhow::Result;

use super::RawRecord;

/// Where raw records come from (files, canned samples, a search provider).
#[async_trait::async_trait]
pub trait RawSource: Send + Sync {
    async fn fetch_records(&self) -> Result<Vec<RawRecord>>;
    fn name(&self) -> &str;
}
