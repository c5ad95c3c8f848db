// src/analyze/heuristic.rs
//! Local deterministic scorer.
//!
//! Score = base + high-impact term groups (each group counts once, total
//! capped) + matched keywords (capped), clamped and rounded to one decimal.
//! The first action rule whose terms appear picks the next action; rule
//! order in the default set is cost/efficiency, safety, infrastructure.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::analyze::ai_adapter::Scorer;
use crate::decision::{clamp01, round1, Decision, DecisionOrigin, TimeSensitivity};
use crate::filter::fold;
use crate::item::Item;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermGroup {
    pub name: String,
    pub any_contains: Vec<String>,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRule {
    pub name: String,
    pub any_contains: Vec<String>,
    pub next_action: String,
    #[serde(default)]
    pub opportunity: String,
    #[serde(default)]
    pub risk: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicRules {
    pub base_score: f64,
    pub impact_groups: Vec<TermGroup>,
    pub impact_cap: f64,
    pub keyword_weight: f64,
    pub keyword_cap: f64,
    pub min_score: f64,
    pub max_score: f64,
    pub actions: Vec<ActionRule>,
    pub default_action: String,
    pub immediate_terms: Vec<String>,
    pub base_confidence: f64,
    pub sourced_confidence_bonus: f64,
    pub keyword_confidence_step: f64,
    pub max_confidence: f64,
}

fn strs(xs: &[&str]) -> Vec<String> {
    xs.iter().map(|s| s.to_string()).collect()
}

impl Default for HeuristicRules {
    fn default() -> Self {
        Self {
            base_score: 5.0,
            impact_groups: vec![
                TermGroup {
                    name: "urgent".into(),
                    any_contains: strs(&["긴급", "urgent", "breaking", "속보", "alert"]),
                    weight: 1.5,
                },
                TermGroup {
                    name: "regulatory".into(),
                    any_contains: strs(&[
                        "fda", "recall", "리콜", "outbreak", "발병", "금지", "규제",
                        "regulation",
                    ]),
                    weight: 1.0,
                },
                TermGroup {
                    name: "market".into(),
                    any_contains: strs(&[
                        "funding", "투자", "acquisition", "인수", "approval", "승인", "launch",
                        "출시", "tariff", "관세",
                    ]),
                    weight: 0.5,
                },
            ],
            impact_cap: 3.0,
            keyword_weight: 0.5,
            keyword_cap: 1.5,
            min_score: 1.0,
            max_score: 10.0,
            actions: vec![
                ActionRule {
                    name: "cost".into(),
                    any_contains: strs(&[
                        "cost", "비용", "단가", "efficiency", "효율", "절감", "price", "가격",
                    ]),
                    next_action: "Re-run the unit cost model against this change and flag margin impact."
                        .into(),
                    opportunity: "Cost position may improve against competitors.".into(),
                    risk: "Pricing assumptions in current plans may be stale.".into(),
                },
                ActionRule {
                    name: "safety".into(),
                    any_contains: strs(&[
                        "listeria",
                        "리스테리아",
                        "recall",
                        "리콜",
                        "fda",
                        "outbreak",
                        "contamination",
                        "오염",
                        "food safety",
                        "식품 안전",
                    ]),
                    next_action: "Step up safety monitoring: check supplier exposure and export lots against the alert."
                        .into(),
                    opportunity: "Sterile production can be pitched as a differentiator.".into(),
                    risk: "Tighter inspection can delay customs clearance.".into(),
                },
                ActionRule {
                    name: "infra".into(),
                    any_contains: strs(&[
                        "gpu",
                        "server",
                        "서버",
                        "data center",
                        "데이터센터",
                        "cloud",
                        "클라우드",
                        "blackwell",
                        "infrastructure",
                        "인프라",
                    ]),
                    next_action: "Review server and GPU capacity plans against this shift.".into(),
                    opportunity: "Capacity or pricing window for AI infrastructure.".into(),
                    risk: "Hardware payback period may stretch.".into(),
                },
            ],
            default_action: "Keep on the watch list and revisit at the next weekly review.".into(),
            immediate_terms: strs(&["긴급", "urgent", "breaking", "속보"]),
            base_confidence: 0.35,
            sourced_confidence_bonus: 0.15,
            keyword_confidence_step: 0.05,
            max_confidence: 0.75,
        }
    }
}

fn any_in(hay: &str, terms: &[String]) -> bool {
    terms.iter().any(|t| !t.is_empty() && hay.contains(&fold(t)))
}

#[derive(Debug, Clone, Default)]
pub struct HeuristicScorer {
    rules: HeuristicRules,
}

impl HeuristicScorer {
    pub fn new(rules: HeuristicRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &HeuristicRules {
        &self.rules
    }

    /// Impact score and the names of the groups that fired.
    pub fn impact(&self, text: &str, keyword_count: usize) -> (f64, Vec<&str>) {
        let r = &self.rules;
        let hay = fold(text);

        let mut fired = Vec::new();
        let mut bump = 0.0_f64;
        for g in &r.impact_groups {
            if any_in(&hay, &g.any_contains) {
                bump += g.weight;
                fired.push(g.name.as_str());
            }
        }
        let bump = bump.min(r.impact_cap);
        let kw = (keyword_count as f64 * r.keyword_weight).min(r.keyword_cap);

        let score = (r.base_score + bump + kw).clamp(r.min_score, r.max_score);
        (round1(score), fired)
    }

    pub fn decide(&self, item: &Item) -> Decision {
        let r = &self.rules;
        let text = item.match_text();
        let hay = fold(&text);
        let (score, fired) = self.impact(&text, item.keywords.len());

        let action = r.actions.iter().find(|a| any_in(&hay, &a.any_contains));
        let (next_action, opportunity, risk) = match action {
            Some(a) => (a.next_action.clone(), a.opportunity.clone(), a.risk.clone()),
            None => (r.default_action.clone(), String::new(), String::new()),
        };

        let time_sensitivity = if any_in(&hay, &r.immediate_terms) {
            TimeSensitivity::Immediate
        } else if score >= 8.0 {
            TimeSensitivity::Short
        } else if score >= 6.0 {
            TimeSensitivity::Medium
        } else {
            TimeSensitivity::Low
        };

        let mut confidence = r.base_confidence + r.keyword_confidence_step * item.keywords.len() as f64;
        if item.is_sourced() {
            confidence += r.sourced_confidence_bonus;
        }
        let confidence = clamp01(confidence.min(r.max_confidence));

        let reason = if fired.is_empty() {
            format!("Baseline relevance; {} keyword match(es)", item.keywords.len())
        } else {
            format!(
                "High-impact signals: {}; {} keyword match(es)",
                fired.join(", "),
                item.keywords.len()
            )
        };

        Decision::new(score, reason)
            .with_confidence((confidence * 100.0).round() / 100.0)
            .with_basis(match action {
                Some(a) => format!("rule `{}`", a.name),
                None => "default rule".to_string(),
            })
            .with_next_action(next_action)
            .with_time_sensitivity(time_sensitivity)
            .with_outlook(opportunity, risk)
            .with_origin(DecisionOrigin::Heuristic)
    }

    /// Decision used when the delegated scorer gave up.
    pub fn fallback(&self, item: &Item, confidence_cap: f64) -> Decision {
        let mut d = self.decide(item);
        d.confidence = d.confidence.min(confidence_cap);
        d.origin = DecisionOrigin::Fallback;
        d
    }
}

#[async_trait]
impl Scorer for HeuristicScorer {
    async fn score(&self, item: &Item, _context: &str) -> Option<Decision> {
        Some(self.decide(item))
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}
