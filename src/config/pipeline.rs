// src/config/pipeline.rs
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::analyze::enrich::EnrichOptions;
use crate::analyze::heuristic::HeuristicRules;
use crate::analyze::rerank::RankOptions;
use crate::analyze::retry::RetryPolicy;
use crate::backfill::BackfillPolicy;
use crate::category::Category;
use crate::config::ai::ProviderConfig;
use crate::error::{PipelineError, Result};
use crate::ingest::dates::DateFallback;

pub const DEFAULT_PIPELINE_CONFIG_PATH: &str = "config/pipeline.toml";
pub const ENV_PIPELINE_CONFIG_PATH: &str = "NEWS_RADAR_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub document: PathBuf,
    /// Explicit keyword list; `None` uses the env/`config/keywords.*` lookup.
    pub keywords: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            document: PathBuf::from("data/normalized/news.json"),
            keywords: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Bucket for records whose category is unknown; `None` rejects them.
    pub default_category: Option<Category>,
    pub date_fallback: DateFallback,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    pub provider: ProviderConfig,
    pub heuristic: HeuristicRules,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackfillConfig {
    #[serde(flatten)]
    pub policy: BackfillPolicy,
    pub days_back: u32,
    /// Candidate provider; `None` reuses `scorer.provider`.
    pub provider: Option<ProviderConfig>,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            policy: BackfillPolicy::default(),
            days_back: 45,
            provider: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub days_back: u32,
    pub per_category: usize,
    /// Briefing provider; `None` reuses `scorer.provider`.
    pub provider: Option<ProviderConfig>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            days_back: 2,
            per_category: 5,
            provider: None,
        }
    }
}

/// Artifact paths; a missing path disables that sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinksConfig {
    pub radar_log: Option<PathBuf>,
    pub history: Option<PathBuf>,
    pub dashboard: Option<PathBuf>,
    pub html: Option<PathBuf>,
    pub dashboard_top_n: usize,
    pub html_top_n: usize,
}

impl Default for SinksConfig {
    fn default() -> Self {
        Self {
            radar_log: None,
            history: None,
            dashboard: None,
            html: None,
            dashboard_top_n: 3,
            html_top_n: 2,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub normalize: NormalizeConfig,
    pub ranking: RankOptions,
    pub scorer: ScorerConfig,
    pub enrich: EnrichOptions,
    pub retry: RetryPolicy,
    pub backfill: BackfillConfig,
    pub search: SearchConfig,
    pub sinks: SinksConfig,
}

impl PipelineConfig {
    /// `$NEWS_RADAR_CONFIG`, else `config/pipeline.toml`. A missing default
    /// file yields built-in defaults; a missing explicit file is an error.
    pub fn load() -> anyhow::Result<Self> {
        if let Ok(p) = std::env::var(ENV_PIPELINE_CONFIG_PATH) {
            return Self::load_from(Path::new(&p));
        }
        let p = Path::new(DEFAULT_PIPELINE_CONFIG_PATH);
        if p.exists() {
            return Self::load_from(p);
        }
        tracing::info!(target: "pipeline", "no {DEFAULT_PIPELINE_CONFIG_PATH}; using built-in defaults");
        Ok(Self::default())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config at {}", path.display()))?;
        let cfg = Self::from_toml_str(&content)
            .with_context(|| format!("parsing pipeline config at {}", path.display()))?;
        Ok(cfg)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(s).map_err(|e| PipelineError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(PipelineError::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.retry.max_delay < self.retry.base_delay {
            return Err(PipelineError::Config(
                "retry.max_delay_ms must not be below retry.base_delay_ms".into(),
            ));
        }
        if self.ranking.overflow_multiplier == 0 {
            return Err(PipelineError::Config("ranking.overflow_multiplier must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.enrich.fallback_confidence_cap) {
            return Err(PipelineError::Config(
                "enrich.fallback_confidence_cap must be within [0, 1]".into(),
            ));
        }
        Ok(())
    }

    /// Provider for backfill candidates, with env keys resolved.
    pub fn backfill_provider(&self) -> ProviderConfig {
        self.backfill
            .provider
            .clone()
            .unwrap_or_else(|| self.scorer.provider.clone())
            .resolve_env()
    }

    pub fn search_provider(&self) -> ProviderConfig {
        self.search
            .provider
            .clone()
            .unwrap_or_else(|| self.scorer.provider.clone())
            .resolve_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::retry::Backoff;
    use crate::config::ai::ProviderKind;
    use std::time::Duration;

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.paths.document, PathBuf::from("data/normalized/news.json"));
        assert_eq!(cfg.ranking.slots_for(Category::ListeriaFree), 4);
        assert_eq!(cfg.retry.max_attempts, 3);
        assert!(cfg.backfill.policy.enabled);
        assert_eq!(cfg.sinks.html_top_n, 2);
    }

    #[test]
    fn sections_override_defaults() {
        let cfg = PipelineConfig::from_toml_str(
            r#"
[normalize]
default_category = "global_biz"
date_fallback = "reject"

[ranking]
overflow_multiplier = 2
[ranking.slots]
computer_ai = 3

[retry]
max_attempts = 5
base_delay_ms = 500
max_delay_ms = 4000
backoff = "exponential"

[backfill]
max_attempts = 2
widen_on_empty = true

[backfill.provider]
provider = "perplexity"

[sinks]
radar_log = "Project_Radar.md"
"#,
        )
        .unwrap();
        assert_eq!(cfg.normalize.default_category, Some(Category::GlobalBiz));
        assert_eq!(cfg.normalize.date_fallback, DateFallback::Reject);
        assert_eq!(cfg.ranking.limit_for(Category::ComputerAi), 6);
        assert_eq!(cfg.retry.base_delay, Duration::from_millis(500));
        assert_eq!(cfg.retry.backoff, Backoff::Exponential);
        assert_eq!(cfg.backfill.policy.max_attempts, 2);
        assert!(cfg.backfill.policy.widen_on_empty);
        assert_eq!(cfg.backfill.provider.as_ref().map(|p| p.kind), Some(ProviderKind::Perplexity));
        assert_eq!(cfg.sinks.radar_log, Some(PathBuf::from("Project_Radar.md")));
    }

    #[test]
    fn invalid_values_are_config_errors() {
        let err = PipelineConfig::from_toml_str("[retry]\nmax_attempts = 0\n").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        assert!(PipelineConfig::from_toml_str("[ranking\n").is_err());
    }
}
