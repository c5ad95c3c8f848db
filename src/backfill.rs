//! Category quota backfill.
//!
//! For each category short of its target, ask a [`CandidateGenerator`] for
//! more records until the target is met, attempts run out, or the generator
//! keeps coming back empty. Existing items are never modified; the backfiller
//! only appends. Running short is a reported outcome, not an error.

use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::analyze::ai_adapter::Provider;
use crate::analyze::lenient;
use crate::analyze::retry::{run_with_retry, RetryOutcome, RetryPolicy};
use crate::category::Category;
use crate::error::ExternalCallError;
use crate::ingest::{normalize_record, NormalizePolicy, RawRecord};
use crate::item::{identity_key, Item};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillRequest {
    pub category: Category,
    pub needed: usize,
    /// URLs already held for this category, at most `max_excluded_urls`.
    pub excluded_urls: Vec<String>,
    /// 1-based attempt number within this category.
    pub attempt: u32,
    /// Set after an empty batch when the widen policy is on.
    pub widen: bool,
}

#[async_trait]
pub trait CandidateGenerator: Send + Sync {
    async fn generate_candidates(
        &self,
        req: &BackfillRequest,
    ) -> Result<Vec<RawRecord>, ExternalCallError>;
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: CandidateGenerator + ?Sized> CandidateGenerator for Box<T> {
    async fn generate_candidates(
        &self,
        req: &BackfillRequest,
    ) -> Result<Vec<RawRecord>, ExternalCallError> {
        (**self).generate_candidates(req).await
    }
    fn name(&self) -> &str {
        (**self).name()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackfillPolicy {
    pub enabled: bool,
    pub max_attempts: u32,
    pub max_consecutive_empty: u32,
    pub widen_on_empty: bool,
    pub max_excluded_urls: usize,
    /// Source label for candidates that name none.
    pub default_source: String,
}

impl Default for BackfillPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 4,
            max_consecutive_empty: 2,
            widen_on_empty: false,
            max_excluded_urls: 20,
            default_source: "Web".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum StopReason {
    AttemptsExhausted,
    ConsecutiveEmpty,
    RetriesExhausted(String),
    Fatal(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CategoryOutcome {
    AlreadyFull,
    Filled {
        added: usize,
        attempts: u32,
    },
    UnderQuota {
        added: usize,
        attempts: u32,
        have: usize,
        target: usize,
        stop: StopReason,
    },
}

impl CategoryOutcome {
    pub fn added(&self) -> usize {
        match self {
            Self::AlreadyFull => 0,
            Self::Filled { added, .. } | Self::UnderQuota { added, .. } => *added,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub per_category: BTreeMap<Category, CategoryOutcome>,
    pub generator_calls: usize,
}

impl BackfillReport {
    pub fn added_total(&self) -> usize {
        self.per_category.values().map(CategoryOutcome::added).sum()
    }

    pub fn under_quota(&self) -> Vec<Category> {
        self.per_category
            .iter()
            .filter(|(_, o)| matches!(o, CategoryOutcome::UnderQuota { .. }))
            .map(|(c, _)| *c)
            .collect()
    }
}

pub struct Backfiller<G: CandidateGenerator> {
    generator: G,
    policy: BackfillPolicy,
    retry: RetryPolicy,
}

impl<G: CandidateGenerator> Backfiller<G> {
    pub fn new(generator: G, policy: BackfillPolicy, retry: RetryPolicy) -> Self {
        Self {
            generator,
            policy,
            retry,
        }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Append candidates to `items` until each category in `targets` reaches
    /// its count. Categories are visited in canonical order.
    pub async fn backfill(
        &self,
        items: &mut Vec<Item>,
        targets: &BTreeMap<Category, usize>,
        normalize: &NormalizePolicy,
    ) -> BackfillReport {
        let mut report = BackfillReport::default();
        let mut known_ids: HashSet<String> = items.iter().map(|i| i.id.clone()).collect();
        let mut known_urls: HashSet<String> = items.iter().filter_map(|i| i.url.clone()).collect();

        for (&category, &target) in targets {
            let mut have = items.iter().filter(|i| i.category == category).count();
            if have >= target {
                report.per_category.insert(category, CategoryOutcome::AlreadyFull);
                continue;
            }

            let mut attempts = 0u32;
            let mut consecutive_empty = 0u32;
            let mut widen = false;
            let mut added = 0usize;
            let mut stop = None;

            while have < target {
                if attempts >= self.policy.max_attempts {
                    stop = Some(StopReason::AttemptsExhausted);
                    break;
                }
                attempts += 1;

                let req = BackfillRequest {
                    category,
                    needed: target - have,
                    excluded_urls: items
                        .iter()
                        .filter(|i| i.category == category)
                        .filter_map(|i| i.url.clone())
                        .take(self.policy.max_excluded_urls)
                        .collect(),
                    attempt: attempts,
                    widen,
                };

                let mut calls = 0usize;
                let outcome = run_with_retry(&self.retry, ExternalCallError::is_transient, |_| {
                    calls += 1;
                    self.generator.generate_candidates(&req)
                })
                .await;
                report.generator_calls += calls;

                let batch = match outcome {
                    RetryOutcome::Success(b) => b,
                    RetryOutcome::Fatal(ExternalCallError::Unparseable(msg)) => {
                        tracing::debug!(target: "backfill", %category, attempt = attempts, %msg, "unparseable candidate batch");
                        Vec::new()
                    }
                    RetryOutcome::ExhaustedRetries { last_error, .. } => {
                        stop = Some(StopReason::RetriesExhausted(last_error.to_string()));
                        break;
                    }
                    RetryOutcome::Fatal(e) => {
                        stop = Some(StopReason::Fatal(e.to_string()));
                        break;
                    }
                };

                let mut accepted = 0usize;
                for rec in batch {
                    if have >= target {
                        break;
                    }
                    let Some(item) = self.admit(rec, category, normalize) else {
                        continue;
                    };
                    let url = item.url.clone().unwrap_or_default();
                    if known_ids.contains(&item.id) || known_urls.contains(&url) {
                        continue;
                    }
                    known_ids.insert(item.id.clone());
                    known_urls.insert(url);
                    items.push(item);
                    have += 1;
                    added += 1;
                    accepted += 1;
                }

                if accepted == 0 {
                    consecutive_empty += 1;
                    widen = self.policy.widen_on_empty;
                    if consecutive_empty >= self.policy.max_consecutive_empty {
                        stop = Some(StopReason::ConsecutiveEmpty);
                        break;
                    }
                } else {
                    consecutive_empty = 0;
                    widen = false;
                }
            }

            let outcome = if have >= target {
                CategoryOutcome::Filled { added, attempts }
            } else {
                let stop = stop.unwrap_or(StopReason::AttemptsExhausted);
                tracing::warn!(target: "backfill", %category, have, target, ?stop, "category left under quota");
                CategoryOutcome::UnderQuota {
                    added,
                    attempts,
                    have,
                    target,
                    stop,
                }
            };
            tracing::info!(target: "backfill", %category, added, attempts, "backfill finished");
            report.per_category.insert(category, outcome);
        }

        counter!("radar_backfill_added_total").increment(report.added_total() as u64);
        report
    }

    /// Force the candidate into `category`, normalize it and require a URL.
    fn admit(&self, rec: RawRecord, category: Category, normalize: &NormalizePolicy) -> Option<Item> {
        let mut item = normalize_record(&rec.with_category(category), normalize).ok()?;
        if !item.is_sourced() {
            return None;
        }
        if item.source.is_empty() && !self.policy.default_source.is_empty() {
            item.source = self.policy.default_source.clone();
            item.id = identity_key(item.category, &item.title, item.url.as_deref(), &item.source);
        }
        Some(item)
    }
}

// ------------------------------------------------------------
// Generator backed by a text-generation provider
// ------------------------------------------------------------

const CURATOR_SYSTEM: &str =
    "You are a fact-based news curator. Use only real article URLs and never repeat a URL.";

pub struct LlmCandidateGenerator<P: Provider> {
    provider: P,
    days_back: u32,
}

impl<P: Provider> LlmCandidateGenerator<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            days_back: 45,
        }
    }

    pub fn with_days_back(mut self, days: u32) -> Self {
        self.days_back = days.max(1);
        self
    }

    pub fn prompt_for(&self, req: &BackfillRequest) -> String {
        let c = req.category;
        let days = if req.widen {
            self.days_back.saturating_mul(2)
        } else {
            self.days_back
        };
        let mut p = format!(
            "Collect only {label} news from the last {days} days. Topics: {topic}.\n",
            label = c.label(),
            topic = c.backfill_topic(),
        );
        if req.widen {
            p.push_str("If little fits, widen to adjacent topics in the same industry.\n");
        }
        p.push_str(&format!(
            "Use only real article URLs (https://...). Return at least {n} items.\n\
             Output a JSON array only:\n\
             [{{\"title\":\"\", \"source\":\"\", \"url\":\"https://...\", \"published_at\":\"YYYY-MM-DD\", \"tags\":[\"\",\"\"], \"summary\":\"1-2 sentences\"}}]",
            n = req.needed
        ));
        if !req.excluded_urls.is_empty() {
            p.push_str("\nAlready collected URLs (do not reuse):\n");
            for u in &req.excluded_urls {
                p.push_str("- ");
                p.push_str(u);
                p.push('\n');
            }
        }
        p
    }
}

/// JSON array (or `{items}` object) first, markdown bullets second.
pub fn parse_candidates(text: &str, category: Category) -> Result<Vec<RawRecord>, ExternalCallError> {
    if let Some(arr) = lenient::extract_json_array(text) {
        return Ok(arr.into_iter().map(RawRecord::Json).collect());
    }
    let bullets: Vec<RawRecord> = text
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with('-') && l.contains('|'))
        .map(|l| RawRecord::Markdown {
            line: l.to_string(),
            category: Some(category),
        })
        .collect();
    if bullets.is_empty() {
        Err(ExternalCallError::Unparseable("no candidates in reply".into()))
    } else {
        Ok(bullets)
    }
}

#[async_trait]
impl<P: Provider> CandidateGenerator for LlmCandidateGenerator<P> {
    async fn generate_candidates(
        &self,
        req: &BackfillRequest,
    ) -> Result<Vec<RawRecord>, ExternalCallError> {
        let prompt = self.prompt_for(req);
        let text = self.provider.complete(CURATOR_SYSTEM, &prompt).await?;
        parse_candidates(&text, req.category)
    }

    fn name(&self) -> &str {
        self.provider.name()
    }
}
