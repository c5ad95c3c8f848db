// src/analyze/mod.rs
//! Scoring and ranking: heuristic and delegated scorers, the enrichment
//! stage, retry policy, lenient JSON extraction, and the ranker/trimmer.

pub mod ai_adapter;
pub mod enrich;
pub mod heuristic;
pub mod lenient;
pub mod rerank;
pub mod retry;

// Re-export convenient types.
pub use crate::analyze::ai_adapter::{DelegatedScorer, DynProvider, Provider, Scorer};
pub use crate::analyze::enrich::{enrich_items, EnrichOptions, EnrichReport};
pub use crate::analyze::heuristic::{HeuristicRules, HeuristicScorer};
pub use crate::analyze::rerank::{rank_and_trim, select_top, RankOptions};
pub use crate::analyze::retry::{run_with_retry, Backoff, RetryOutcome, RetryPolicy};
