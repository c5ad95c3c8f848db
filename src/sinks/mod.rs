// src/sinks/mod.rs
//! Downstream artifacts written after the document is persisted.
//!
//! Sink failures are logged and reported, never fatal for the run.

pub mod dashboard;
pub mod history;
pub mod html;
pub mod radar_log;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::item::Item;

pub use dashboard::DashboardSink;
pub use history::HistorySink;
pub use html::HtmlFragmentSink;
pub use radar_log::RadarLogSink;

/// What a sink gets to see at the end of a run.
#[derive(Debug, Clone, Copy)]
pub struct SinkContext<'a> {
    pub now: DateTime<Utc>,
    /// Items accepted by the keyword gate in this run, enriched.
    pub detected: &'a [Item],
    /// The persisted, ranked document items.
    pub ranked: &'a [Item],
}

#[async_trait]
pub trait Sink: Send + Sync {
    async fn publish(&self, ctx: &SinkContext<'_>) -> Result<()>;
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SinkFailure {
    pub sink: String,
    pub error: String,
}

/// Fans one context out to every sink, in order, collecting failures.
#[derive(Default)]
pub struct SinkSet {
    sinks: Vec<Box<dyn Sink>>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Box<dyn Sink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub async fn publish_all(&self, ctx: &SinkContext<'_>) -> Vec<SinkFailure> {
        let mut failures = Vec::new();
        for s in &self.sinks {
            match s.publish(ctx).await {
                Ok(()) => tracing::debug!(target: "pipeline", sink = s.name(), "sink published"),
                Err(e) => {
                    tracing::warn!(target: "pipeline", sink = s.name(), error = %format!("{e:#}"), "sink failed");
                    failures.push(SinkFailure {
                        sink: s.name().to_string(),
                        error: format!("{e:#}"),
                    });
                }
            }
        }
        failures
    }
}

/// Cut to `max` characters, appending `...` when something was cut.
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push_str("...");
    out
}

/// One-line analysis text for log-style sinks.
pub(crate) fn analysis_line(item: &Item) -> String {
    match &item.decision {
        Some(d) => {
            let mut s = format!("[{:.1}/10] {}", d.impact_score, d.impact_reason);
            if !d.next_action.is_empty() {
                s.push_str(" | action: ");
                s.push_str(&d.next_action);
            }
            s
        }
        None => String::new(),
    }
}
