// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod backfill;
pub mod category;
pub mod config;
pub mod decision;
pub mod document;
pub mod error;
pub mod filter;
pub mod item;
pub mod metrics;
pub mod pipeline;
pub mod sinks;

// Normalization, record parsers and acquisition sources
pub mod ingest;

// Scoring, enrichment, ranking
pub mod analyze;

// ---- Re-exports for stable public API ----
pub use analyze::ai_adapter;
pub use crate::api::router;
pub use crate::category::Category;
pub use crate::decision::{Decision, DecisionOrigin, TimeSensitivity};
pub use crate::document::NewsDocument;
pub use crate::error::{ExternalCallError, PipelineError};
pub use crate::item::{EnrichmentStatus, Item};
pub use crate::pipeline::{Pipeline, RunSummary};
