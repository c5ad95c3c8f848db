// src/analyze/enrich.rs
//! Enrichment stage: attach a decision to every item that lacks a complete one.

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::analyze::ai_adapter::Scorer;
use crate::analyze::heuristic::HeuristicScorer;
use crate::category::Category;
use crate::item::Item;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichOptions {
    /// Upper bound on scorer calls per run; 0 means unlimited.
    pub max_enrich: usize,
    /// Also score items without a valid URL. Off by default: informational
    /// items stay `COLLECTING`.
    pub score_informational: bool,
    /// Confidence ceiling for heuristic fallback decisions.
    pub fallback_confidence_cap: f64,
    /// Per-category business context; missing entries use the built-in text.
    pub contexts: BTreeMap<Category, String>,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            max_enrich: 20,
            score_informational: false,
            fallback_confidence_cap: 0.3,
            contexts: BTreeMap::new(),
        }
    }
}

impl EnrichOptions {
    pub fn context_for(&self, c: Category) -> &str {
        self.contexts
            .get(&c)
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| c.default_context())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichReport {
    pub attempted: usize,
    /// Decisions produced by the configured scorer.
    pub enriched: usize,
    /// Heuristic fallbacks after the scorer returned nothing usable.
    pub fallback: usize,
    pub skipped_enriched: usize,
    pub skipped_informational: usize,
    /// Items left untouched because `max_enrich` was reached.
    pub deferred: usize,
    pub per_category: BTreeMap<Category, usize>,
}

/// Score items in order, one call at a time. Items that already carry a
/// complete decision are never touched.
pub async fn enrich_items(
    items: &mut [Item],
    scorer: &dyn Scorer,
    fallback: &HeuristicScorer,
    opts: &EnrichOptions,
    now: DateTime<Utc>,
) -> EnrichReport {
    let mut report = EnrichReport::default();

    for item in items.iter_mut() {
        if item.is_enriched() {
            report.skipped_enriched += 1;
            continue;
        }
        if !opts.score_informational && !item.is_sourced() {
            report.skipped_informational += 1;
            continue;
        }
        if opts.max_enrich > 0 && report.attempted >= opts.max_enrich {
            report.deferred += 1;
            continue;
        }
        report.attempted += 1;

        let context = opts.context_for(item.category);
        let decision = match scorer.score(item, context).await {
            Some(d) if d.is_complete() => {
                report.enriched += 1;
                d
            }
            _ => {
                tracing::info!(target: "enrich", id = %item.id, scorer = scorer.name(), "scorer gave no usable decision; using heuristic fallback");
                report.fallback += 1;
                fallback.fallback(item, opts.fallback_confidence_cap)
            }
        };

        if item.attach_decision(decision, now).is_ok() {
            *report.per_category.entry(item.category).or_insert(0) += 1;
        }
    }

    counter!("radar_enriched_total").increment(report.enriched as u64);
    counter!("radar_enrich_fallback_total").increment(report.fallback as u64);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::ai_adapter::{DelegatedScorer, MockProvider};
    use crate::analyze::retry::RetryPolicy;
    use crate::decision::{Decision, DecisionOrigin};
    use crate::ingest::{normalize_record, NormalizePolicy, RawRecord};
    use crate::item::EnrichmentStatus;
    use serde_json::json;

    fn items() -> Vec<Item> {
        let p = NormalizePolicy::new(Utc::now());
        vec![
            normalize_record(
                &RawRecord::Json(json!({
                    "category": "computer_ai", "title": "GPU cloud prices fall",
                    "url": "https://news.io/gpu"
                })),
                &p,
            )
            .unwrap(),
            normalize_record(
                &RawRecord::Json(json!({"category": "global_biz", "title": "Tariff memo"})),
                &p,
            )
            .unwrap(),
        ]
    }

    #[tokio::test]
    async fn unparseable_reply_falls_back_with_capped_confidence() {
        let scorer = DelegatedScorer::new(MockProvider::new("I cannot help"), RetryPolicy::immediate(1));
        let mut its = items();
        let rep = enrich_items(
            &mut its,
            &scorer,
            &HeuristicScorer::default(),
            &EnrichOptions::default(),
            Utc::now(),
        )
        .await;

        assert_eq!(rep.fallback, 1);
        assert_eq!(rep.enriched, 0);
        let d = its[0].decision.as_ref().unwrap();
        assert_eq!(d.origin, DecisionOrigin::Fallback);
        assert!(d.confidence <= 0.3);
        assert_eq!(its[0].status, EnrichmentStatus::PendingAction);
    }

    #[tokio::test]
    async fn informational_items_stay_collecting_by_default() {
        let scorer = HeuristicScorer::default();
        let mut its = items();
        let rep = enrich_items(&mut its, &scorer, &HeuristicScorer::default(), &EnrichOptions::default(), Utc::now()).await;

        assert_eq!(rep.attempted, 1);
        assert_eq!(rep.skipped_informational, 1);
        assert!(its[1].decision.is_none());
        assert_eq!(its[1].score, None);
        assert_eq!(its[1].status, EnrichmentStatus::Collecting);
        assert_eq!(its[0].status, EnrichmentStatus::PendingAction);
    }

    #[tokio::test]
    async fn enriched_items_are_skipped_and_informational_optional() {
        let scorer = HeuristicScorer::default();
        let mut its = items();
        its[0]
            .attach_decision(Decision::new(2.0, "prior").with_next_action("done"), Utc::now())
            .unwrap();

        let opts = EnrichOptions {
            score_informational: false,
            ..EnrichOptions::default()
        };
        let rep = enrich_items(&mut its, &scorer, &HeuristicScorer::default(), &opts, Utc::now()).await;
        assert_eq!(rep.skipped_enriched, 1);
        assert_eq!(rep.skipped_informational, 1);
        assert_eq!(rep.attempted, 0);
        assert_eq!(its[0].score, Some(2.0));
        assert!(its[1].decision.is_none());
    }

    #[tokio::test]
    async fn max_enrich_defers_the_rest() {
        let scorer = HeuristicScorer::default();
        let mut its = items();
        let opts = EnrichOptions {
            max_enrich: 1,
            score_informational: true,
            ..EnrichOptions::default()
        };
        let rep = enrich_items(&mut its, &scorer, &HeuristicScorer::default(), &opts, Utc::now()).await;
        assert_eq!(rep.attempted, 1);
        assert_eq!(rep.deferred, 1);
        assert!(its[1].decision.is_none());
    }
}
