// src/pipeline.rs
//! One batch run: load → normalize → filter → merge → backfill → enrich →
//! rank → persist → sinks.
//!
//! Only a persistence failure aborts the run, and it does so before any sink
//! sees the data.

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::analyze::ai_adapter::{build_provider, DelegatedScorer, DynProvider, Scorer};
use crate::analyze::enrich::{enrich_items, EnrichReport};
use crate::analyze::heuristic::HeuristicScorer;
use crate::analyze::rerank::{counts_by_category, rank_and_trim, RankOptions};
use crate::backfill::{BackfillReport, Backfiller, CandidateGenerator, LlmCandidateGenerator};
use crate::category::Category;
use crate::config::PipelineConfig;
use crate::document::{LoadReport, NewsDocument};
use crate::error::Result;
use crate::filter::{FilterDecision, KeywordFilter};
use crate::ingest::config::{load_keywords_default, load_keywords_from};
use crate::ingest::types::RawSource;
use crate::ingest::{normalize_batch, NormalizePolicy};
use crate::sinks::{
    DashboardSink, HistorySink, HtmlFragmentSink, RadarLogSink, SinkContext, SinkFailure, SinkSet,
};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("radar_records_total", "Raw records read from all sources.");
        describe_counter!("radar_malformed_total", "Raw records that failed normalization.");
        describe_counter!("radar_duplicates_total", "In-batch duplicate identity keys dropped.");
        describe_counter!("radar_filtered_total", "Items rejected by the keyword gate.");
        describe_counter!("radar_backfill_added_total", "Items appended by quota backfill.");
        describe_counter!("radar_enriched_total", "Decisions produced by the configured scorer.");
        describe_counter!(
            "radar_enrich_fallback_total",
            "Heuristic fallback decisions after the scorer gave nothing usable."
        );
        describe_gauge!("radar_last_run_ts", "Unix time of the last completed run.");
    });
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub source: String,
    pub error: String,
}

/// Everything a run did, for logs and `--json` output.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub document: PathBuf,
    pub loaded: LoadReport,
    pub records: usize,
    pub normalized: usize,
    pub malformed: usize,
    pub duplicates: usize,
    pub filtered: usize,
    pub accepted: usize,
    pub merged_new: usize,
    pub backfill: Option<BackfillReport>,
    pub enrich: EnrichReport,
    pub retained: usize,
    pub per_category: BTreeMap<Category, usize>,
    /// Categories holding fewer items than their slot count after ranking.
    pub under_quota: Vec<Category>,
    pub source_failures: Vec<SourceFailure>,
    pub sink_failures: Vec<SinkFailure>,
}

impl RunSummary {
    fn new(started_at: DateTime<Utc>, document: PathBuf) -> Self {
        Self {
            started_at,
            document,
            loaded: LoadReport::default(),
            records: 0,
            normalized: 0,
            malformed: 0,
            duplicates: 0,
            filtered: 0,
            accepted: 0,
            merged_new: 0,
            backfill: None,
            enrich: EnrichReport::default(),
            retained: 0,
            per_category: BTreeMap::new(),
            under_quota: Vec::new(),
            source_failures: Vec::new(),
            sink_failures: Vec::new(),
        }
    }

    pub fn backfilled(&self) -> usize {
        self.backfill.as_ref().map_or(0, BackfillReport::added_total)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "run at {} → {}", self.started_at.to_rfc3339(), self.document.display())?;
        writeln!(
            f,
            "  records {} | normalized {} | malformed {} | duplicates {} | filtered {} | accepted {} | new {}",
            self.records,
            self.normalized,
            self.malformed,
            self.duplicates,
            self.filtered,
            self.accepted,
            self.merged_new
        )?;
        writeln!(
            f,
            "  enriched {} | fallback {} | deferred {} | backfilled {}",
            self.enrich.enriched,
            self.enrich.fallback,
            self.enrich.deferred,
            self.backfilled()
        )?;
        for c in Category::ALL {
            writeln!(
                f,
                "  {:<15} {}",
                c.as_str(),
                self.per_category.get(&c).copied().unwrap_or(0)
            )?;
        }
        if self.under_quota.is_empty() {
            write!(f, "  all categories at quota")?;
        } else {
            let names: Vec<&str> = self.under_quota.iter().map(Category::as_str).collect();
            write!(f, "  under quota: {}", names.join(", "))?;
        }
        for s in &self.source_failures {
            write!(f, "\n  source {} failed: {}", s.source, s.error)?;
        }
        for s in &self.sink_failures {
            write!(f, "\n  sink {} failed: {}", s.sink, s.error)?;
        }
        Ok(())
    }
}

pub struct Pipeline {
    cfg: PipelineConfig,
    filter: KeywordFilter,
    sources: Vec<Box<dyn RawSource>>,
    scorer: Box<dyn Scorer>,
    heuristic: HeuristicScorer,
    backfiller: Option<Backfiller<Box<dyn CandidateGenerator>>>,
    sinks: SinkSet,
}

impl Pipeline {
    /// Heuristic scoring, no sources, no backfill, no sinks.
    pub fn new(cfg: PipelineConfig, filter: KeywordFilter) -> Self {
        let heuristic = HeuristicScorer::new(cfg.scorer.heuristic.clone());
        Self {
            scorer: Box::new(heuristic.clone()),
            heuristic,
            cfg,
            filter,
            sources: Vec::new(),
            backfiller: None,
            sinks: SinkSet::new(),
        }
    }

    /// Wire scorer, backfill generator and sinks from the config.
    pub fn from_config(cfg: PipelineConfig) -> anyhow::Result<Self> {
        let lists = match &cfg.paths.keywords {
            Some(p) => load_keywords_from(p)?,
            None => load_keywords_default()?,
        };
        let filter = KeywordFilter::from_lists(&lists);

        let scorer_provider = build_provider(&cfg.scorer.provider.clone().resolve_env());
        let backfill_provider = build_provider(&cfg.backfill_provider());
        let sinks = sinks_from_config(&cfg);
        let retry = cfg.retry.clone();
        let backfill_policy = cfg.backfill.policy.clone();
        let days_back = cfg.backfill.days_back;

        let mut p = Self::new(cfg, filter).with_sinks(sinks);
        if is_active(&scorer_provider) {
            p = p.with_scorer(Box::new(DelegatedScorer::new(scorer_provider, retry.clone())));
        }
        if backfill_policy.enabled && is_active(&backfill_provider) {
            let generator = LlmCandidateGenerator::new(backfill_provider).with_days_back(days_back);
            p = p.with_generator(Box::new(generator));
        } else if backfill_policy.enabled {
            tracing::info!(target: "pipeline", "backfill enabled but no provider configured; skipping");
        }
        Ok(p)
    }

    pub fn with_source(mut self, source: Box<dyn RawSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_scorer(mut self, scorer: Box<dyn Scorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_generator(mut self, generator: Box<dyn CandidateGenerator>) -> Self {
        self.backfiller = Some(Backfiller::new(
            generator,
            self.cfg.backfill.policy.clone(),
            self.cfg.retry.clone(),
        ));
        self
    }

    pub fn without_backfill(mut self) -> Self {
        self.backfiller = None;
        self
    }

    pub fn with_sinks(mut self, sinks: SinkSet) -> Self {
        self.sinks = sinks;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    pub fn normalize_policy(&self, now: DateTime<Utc>) -> NormalizePolicy {
        NormalizePolicy::new(now)
            .with_default_category(self.cfg.normalize.default_category)
            .with_date_fallback(self.cfg.normalize.date_fallback)
    }

    pub async fn run(&self, now: DateTime<Utc>) -> Result<RunSummary> {
        ensure_metrics_described();
        let doc_path = self.cfg.paths.document.clone();
        let mut summary = RunSummary::new(now, doc_path.clone());
        let policy = self.normalize_policy(now);

        let (mut doc, loaded) = NewsDocument::load(&doc_path, &policy)?;
        summary.loaded = loaded;
        tracing::info!(target: "pipeline", path = %doc_path.display(), items = doc.items.len(), "document loaded");

        let mut records = Vec::new();
        for src in &self.sources {
            match src.fetch_records().await {
                Ok(mut r) => {
                    tracing::info!(target: "ingest", source = src.name(), records = r.len(), "source fetched");
                    records.append(&mut r);
                }
                Err(e) => {
                    tracing::warn!(target: "ingest", source = src.name(), error = %format!("{e:#}"), "source failed");
                    summary.source_failures.push(SourceFailure {
                        source: src.name().to_string(),
                        error: format!("{e:#}"),
                    });
                }
            }
        }
        summary.records = records.len();

        let batch = normalize_batch(&records, &policy);
        summary.normalized = batch.items.len();
        summary.malformed = batch.malformed;
        summary.duplicates = batch.duplicates;

        let mut accepted = Vec::with_capacity(batch.items.len());
        for mut item in batch.items {
            match self.filter.evaluate(&item.match_text()) {
                FilterDecision::Accepted(kws) => {
                    item.keywords = kws;
                    accepted.push(item);
                }
                FilterDecision::Rejected(reason) => {
                    tracing::debug!(target: "ingest", id = %item.id, ?reason, "filtered out");
                    summary.filtered += 1;
                }
            }
        }
        counter!("radar_filtered_total").increment(summary.filtered as u64);
        summary.accepted = accepted.len();

        let existing: HashSet<String> = doc.items.iter().map(|i| i.id.clone()).collect();
        let new_ids: HashSet<String> = accepted
            .iter()
            .filter(|i| !existing.contains(&i.id))
            .map(|i| i.id.clone())
            .collect();
        let merged = doc.merge_by_id(accepted);
        summary.merged_new = merged.added;
        summary.duplicates += merged.duplicates;

        if let Some(bf) = &self.backfiller {
            let targets: BTreeMap<Category, usize> = Category::ALL
                .iter()
                .map(|c| (*c, self.cfg.ranking.slots_for(*c)))
                .collect();
            summary.backfill = Some(bf.backfill(&mut doc.items, &targets, &policy).await);
        }

        summary.enrich = enrich_items(
            &mut doc.items,
            self.scorer.as_ref(),
            &self.heuristic,
            &self.cfg.enrich,
            now,
        )
        .await;

        let detected: Vec<_> = doc
            .items
            .iter()
            .filter(|i| new_ids.contains(&i.id))
            .cloned()
            .collect();

        doc.items = rank_and_trim(std::mem::take(&mut doc.items), &self.cfg.ranking);
        doc.generated_at = now;
        summary.retained = doc.items.len();
        summary.per_category = counts_by_category(&doc.items);
        summary.under_quota = Category::ALL
            .iter()
            .copied()
            .filter(|c| summary.per_category.get(c).copied().unwrap_or(0) < self.cfg.ranking.slots_for(*c))
            .collect();

        doc.save_atomic(&doc_path)?;
        tracing::info!(target: "pipeline", path = %doc_path.display(), items = doc.items.len(), "document saved");

        if !self.sinks.is_empty() {
            let ctx = SinkContext {
                now,
                detected: &detected,
                ranked: &doc.items,
            };
            summary.sink_failures = self.sinks.publish_all(&ctx).await;
        }

        gauge!("radar_last_run_ts").set(now.timestamp() as f64);
        if !summary.under_quota.is_empty() {
            tracing::warn!(target: "pipeline", under_quota = ?summary.under_quota, "run finished with categories under quota");
        }
        Ok(summary)
    }
}

fn is_active(p: &DynProvider) -> bool {
    p.name() != "disabled"
}

fn sinks_from_config(cfg: &PipelineConfig) -> SinkSet {
    let s = &cfg.sinks;
    let mut set = SinkSet::new();
    if let Some(p) = &s.radar_log {
        set.push(Box::new(RadarLogSink::new(p)));
    }
    if let Some(p) = &s.history {
        set.push(Box::new(HistorySink::new(p)));
    }
    if let Some(p) = &s.dashboard {
        set.push(Box::new(DashboardSink::new(p).with_top_n(s.dashboard_top_n)));
    }
    if let Some(p) = &s.html {
        set.push(Box::new(HtmlFragmentSink::new(p).with_top_n(s.html_top_n)));
    }
    set
}

/// Rank an existing document file without ingesting anything.
pub fn rank_file(
    input: &Path,
    output: &Path,
    opts: &RankOptions,
    policy: &NormalizePolicy,
) -> Result<NewsDocument> {
    let (mut doc, _) = NewsDocument::load(input, policy)?;
    doc.items = rank_and_trim(std::mem::take(&mut doc.items), opts);
    doc.generated_at = policy.now;
    doc.save_atomic(output)?;
    Ok(doc)
}
