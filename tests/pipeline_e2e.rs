// tests/pipeline_e2e.rs
//
// Full runs over a markdown briefing with a deterministic candidate
// generator and every sink pointed at a temp dir.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use news_radar::backfill::{BackfillRequest, CandidateGenerator};
use news_radar::config::PipelineConfig;
use news_radar::error::ExternalCallError;
use news_radar::filter::KeywordFilter;
use news_radar::ingest::providers::FileSource;
use news_radar::ingest::{NormalizePolicy, RawRecord};
use news_radar::sinks::{DashboardSink, HistorySink, HtmlFragmentSink, RadarLogSink, SinkSet};
use news_radar::{Category, NewsDocument, Pipeline};

const BRIEFING: &str = "\
# Morning briefing

[CATEGORY: computer_ai]
- NVIDIA Blackwell GPU supply expands | Reuters | https://r.io/gpu | 2026-02-09T08:00:00Z
- Sponsored GPU deal of the week | AdNet | https://ads.io/deal | 2026-02-09

[CATEGORY: listeria_free]
- FDA recalls enoki mushrooms over listeria | FDA | https://fda.gov/r1 | 2026-02-08
";

const PAGE: &str = r#"<html><body>
<section class="hub">
  <div class="cards" id="intelligence-hub-content">
    <p>stale</p>
  </div>
</section>
</body></html>
"#;

/// One candidate per request, named after the requested category.
struct PerCategory {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl CandidateGenerator for PerCategory {
    async fn generate_candidates(
        &self,
        req: &BackfillRequest,
    ) -> Result<Vec<RawRecord>, ExternalCallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = req.category.as_str();
        Ok(vec![RawRecord::Json(json!({
            "title": format!("{key} market update"),
            "url": format!("https://bf.io/{key}"),
            "source": "Wire",
            "published_at": "2026-02-07"
        }))])
    }

    fn name(&self) -> &str {
        "per_category"
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 10, 9, 0, 0).unwrap()
}

fn config(dir: &Path) -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    cfg.paths.document = dir.join("data/news.json");
    for c in Category::ALL {
        cfg.ranking.slots.insert(c, 1);
    }
    cfg
}

fn sinks(dir: &Path) -> SinkSet {
    let mut set = SinkSet::new();
    set.push(Box::new(RadarLogSink::new(dir.join("radar_log.md"))));
    set.push(Box::new(HistorySink::new(dir.join("detected_news.json"))));
    set.push(Box::new(DashboardSink::new(dir.join("dashboard_data.json"))));
    set.push(Box::new(HtmlFragmentSink::new(dir.join("index.html"))));
    set
}

fn pipeline(dir: &Path, calls: &Arc<AtomicUsize>) -> Pipeline {
    Pipeline::new(config(dir), KeywordFilter::default())
        .with_source(Box::new(FileSource::new(dir.join("briefing.md"))))
        .with_generator(Box::new(PerCategory {
            calls: Arc::clone(calls),
        }))
        .with_sinks(sinks(dir))
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn briefing_run_fills_quota_and_feeds_every_sink() {
    let dir = tempfile::tempdir().unwrap();
    let d = dir.path();
    std::fs::write(d.join("briefing.md"), BRIEFING).unwrap();
    std::fs::write(d.join("index.html"), PAGE).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    let summary = pipeline(d, &calls).run(now()).await.unwrap();

    assert_eq!(summary.records, 3);
    assert_eq!(summary.filtered, 1);
    assert_eq!(summary.accepted, 2);
    assert_eq!(summary.merged_new, 2);
    assert_eq!(summary.backfilled(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(summary.retained, 5);
    assert!(summary.under_quota.is_empty());
    assert!(summary.sink_failures.is_empty(), "{:?}", summary.sink_failures);

    let (doc, _) = NewsDocument::load(&d.join("data/news.json"), &NormalizePolicy::new(now())).unwrap();
    assert_eq!(doc.items.len(), 5);
    assert!(doc.items.iter().all(|i| i.is_enriched()));
    let order: Vec<Category> = doc.items.iter().map(|i| i.category).collect();
    assert_eq!(order, Category::ALL.to_vec());
    let backfilled = doc.items.iter().find(|i| i.category == Category::HighEndAudio).unwrap();
    assert_eq!(backfilled.source, "Wire");

    let log = std::fs::read_to_string(d.join("radar_log.md")).unwrap();
    assert!(log.starts_with("# Project Radar"));
    assert_eq!(log.matches("신규 감지").count(), 2);
    assert!(log.contains("NVIDIA Blackwell GPU supply expands"));
    assert!(!log.contains("Sponsored"));

    let history = read_json(&d.join("detected_news.json"));
    assert_eq!(history.as_array().unwrap().len(), 2);

    let dash = read_json(&d.join("dashboard_data.json"));
    assert_eq!(dash["intelligence"].as_array().unwrap().len(), 2);
    assert_eq!(dash["system_status"], json!("NORMAL"));

    let page = std::fs::read_to_string(d.join("index.html")).unwrap();
    assert!(!page.contains("stale"));
    assert_eq!(page.matches("Score:").count(), 2);
    assert!(page.trim_end().ends_with("</html>"));
}

#[tokio::test]
async fn second_run_over_same_input_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let d = dir.path();
    std::fs::write(d.join("briefing.md"), BRIEFING).unwrap();
    std::fs::write(d.join("index.html"), PAGE).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let doc_path = d.join("data/news.json");

    pipeline(d, &calls).run(now()).await.unwrap();
    let first = std::fs::read_to_string(&doc_path).unwrap();
    let calls_after_first = calls.load(Ordering::SeqCst);

    let again = pipeline(d, &calls).run(now()).await.unwrap();
    assert_eq!(again.merged_new, 0);
    assert_eq!(again.backfilled(), 0);
    assert_eq!(again.enrich.attempted, 0);
    assert_eq!(again.enrich.skipped_enriched, 5);
    assert_eq!(calls.load(Ordering::SeqCst), calls_after_first);
    assert_eq!(std::fs::read_to_string(&doc_path).unwrap(), first);

    // Nothing new was detected, so the append-only sinks stay as they were.
    let log = std::fs::read_to_string(d.join("radar_log.md")).unwrap();
    assert_eq!(log.matches("신규 감지").count(), 2);
    assert_eq!(read_json(&d.join("detected_news.json")).as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn persistence_failure_aborts_before_sinks() {
    let dir = tempfile::tempdir().unwrap();
    let d = dir.path();
    std::fs::write(d.join("briefing.md"), BRIEFING).unwrap();
    // The document path is a directory, so loading it fails.
    std::fs::create_dir_all(d.join("data/news.json")).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    let err = pipeline(d, &calls).run(now()).await.unwrap_err();
    assert!(err.is_fatal());
    assert!(!d.join("radar_log.md").exists());
    assert!(!d.join("detected_news.json").exists());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failing_sink_does_not_fail_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let d = dir.path();
    std::fs::write(d.join("briefing.md"), BRIEFING).unwrap();
    // No index.html: the fragment sink fails, the rest still publish.
    let calls = Arc::new(AtomicUsize::new(0));

    let summary = pipeline(d, &calls).run(now()).await.unwrap();
    assert_eq!(summary.sink_failures.len(), 1);
    assert_eq!(summary.sink_failures[0].sink, "html_fragment");
    assert!(d.join("data/news.json").exists());
    assert!(d.join("radar_log.md").exists());
    assert!(d.join("dashboard_data.json").exists());
}
