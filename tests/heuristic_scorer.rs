// tests/heuristic_scorer.rs
//
// The FDA listeria alert from the sample feed must come out as a high-impact,
// immediate item with a safety action, whether scored directly or as the
// fallback after a failed remote call.

use chrono::Utc;

use news_radar::analyze::ai_adapter::{DelegatedScorer, ScriptedProvider};
use news_radar::analyze::{enrich_items, EnrichOptions, HeuristicScorer, RetryPolicy};
use news_radar::decision::{DecisionOrigin, TimeSensitivity};
use news_radar::error::ExternalCallError;
use news_radar::filter::{FilterDecision, KeywordFilter};
use news_radar::ingest::{normalize_record, NormalizePolicy, RawRecord};
use news_radar::item::{EnrichmentStatus, Item};
use news_radar::Category;

fn fda_item() -> Item {
    let mut item = normalize_record(
        &RawRecord::plain("FDA 리스테리아 긴급 알림 발표 - 냉장 식품 관련"),
        &NormalizePolicy::new(Utc::now()),
    )
    .expect("normalizes");
    match KeywordFilter::default().evaluate(&item.match_text()) {
        FilterDecision::Accepted(kws) => item.keywords = kws,
        other => panic!("sample alert must pass the gate, got {other:?}"),
    }
    item
}

#[test]
fn fda_listeria_alert_scores_high_with_safety_action() {
    let item = fda_item();
    assert_eq!(item.category, Category::ListeriaFree);
    assert!(item.keywords.iter().any(|k| k == "리스테리아"));

    let d = HeuristicScorer::default().decide(&item);
    assert!(d.impact_score >= 6.5, "score was {}", d.impact_score);
    assert!(d.next_action.contains("safety monitoring"));
    assert_eq!(d.time_sensitivity, TimeSensitivity::Immediate);
    assert_eq!(d.origin, DecisionOrigin::Heuristic);
    assert!(d.confidence <= 0.75);
}

#[tokio::test]
async fn fallback_keeps_the_safety_action_but_caps_confidence() {
    let scorer = DelegatedScorer::new(
        ScriptedProvider::new([Err(ExternalCallError::Status {
            status: 401,
            body: "bad key".into(),
        })]),
        RetryPolicy::immediate(3),
    );
    let mut items = vec![fda_item()];
    // The alert carries no URL, so informational scoring has to be on.
    let opts = EnrichOptions {
        score_informational: true,
        ..EnrichOptions::default()
    };
    let rep = enrich_items(
        &mut items,
        &scorer,
        &HeuristicScorer::default(),
        &opts,
        Utc::now(),
    )
    .await;

    assert_eq!(rep.fallback, 1);
    let d = items[0].decision.as_ref().unwrap();
    assert_eq!(d.origin, DecisionOrigin::Fallback);
    assert!(d.confidence <= 0.3);
    assert!(d.next_action.contains("safety monitoring"));
    assert!(items[0].score.unwrap() >= 6.5);
    assert_eq!(items[0].status, EnrichmentStatus::PendingAction);
}
