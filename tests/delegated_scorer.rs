// tests/delegated_scorer.rs
//
// Delegated scoring over a scripted provider: retries, lenient parsing,
// and the fallback path when the reply is unusable.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

use news_radar::analyze::ai_adapter::{DelegatedScorer, ScriptedProvider};
use news_radar::analyze::{enrich_items, EnrichOptions, HeuristicScorer, RetryPolicy};
use news_radar::decision::{DecisionOrigin, TimeSensitivity};
use news_radar::error::ExternalCallError;
use news_radar::ingest::{normalize_record, NormalizePolicy, RawRecord};
use news_radar::item::Item;

fn gpu_item() -> Item {
    normalize_record(
        &RawRecord::Json(json!({
            "category": "computer_ai",
            "title": "Blackwell cloud capacity doubles",
            "source": "Reuters",
            "url": "https://reuters.com/gpu"
        })),
        &NormalizePolicy::new(Utc::now()),
    )
    .unwrap()
}

const REPLY: &str = r#"Sure, here is the assessment:
```json
{"impact_score": "7.5/10", "impact_reason": "GPU rental cost falls {sharply}",
 "confidence": 0.8, "confidence_basis": "two sources",
 "next_action": "Re-price the inference tier", "time_sensitivity": "short",
 "opportunity": "cheaper capacity", "risk": "lock-in"}
```"#;

#[tokio::test]
async fn rate_limit_then_fenced_reply_yields_delegated_decision() {
    let provider = Arc::new(ScriptedProvider::new([
        Err(ExternalCallError::RateLimited("429".into())),
        Ok(REPLY.to_string()),
    ]));
    let scorer = DelegatedScorer::new(provider.clone(), RetryPolicy::immediate(3));

    let d = scorer.try_score(&gpu_item(), "AI infra context").await.unwrap();
    assert_eq!(provider.calls(), 2);
    assert_eq!(d.impact_score, 7.5);
    assert_eq!(d.confidence, 0.8);
    assert_eq!(d.time_sensitivity, TimeSensitivity::Short);
    assert_eq!(d.origin, DecisionOrigin::Delegated);
    assert!(d.is_complete());

    let prompt = &provider.prompts()[0];
    assert!(prompt.contains("AI infra context"));
    assert!(prompt.contains("https://reuters.com/gpu"));
}

#[tokio::test]
async fn retries_are_bounded() {
    let provider = Arc::new(ScriptedProvider::new(
        (0..5).map(|_| Err(ExternalCallError::RateLimited("529".into()))),
    ));
    let scorer = DelegatedScorer::new(provider.clone(), RetryPolicy::immediate(3));
    let err = scorer.try_score(&gpu_item(), "").await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn reply_without_next_action_falls_back() {
    let provider = ScriptedProvider::new([Ok(r#"{"impact_score": 9, "impact_reason": "big"}"#.to_string())]);
    let scorer = DelegatedScorer::new(provider, RetryPolicy::immediate(1));
    let mut items = vec![gpu_item()];

    let rep = enrich_items(
        &mut items,
        &scorer,
        &HeuristicScorer::default(),
        &EnrichOptions::default(),
        Utc::now(),
    )
    .await;

    assert_eq!(rep.enriched, 0);
    assert_eq!(rep.fallback, 1);
    let d = items[0].decision.as_ref().unwrap();
    assert_eq!(d.origin, DecisionOrigin::Fallback);
    assert!(d.next_action.contains("GPU capacity"));
}
