// src/config/mod.rs
//! Run configuration: `config/pipeline.toml` plus provider credentials.

pub mod ai;
pub mod pipeline;

pub use ai::{ProviderConfig, ProviderKind};
pub use pipeline::{
    BackfillConfig, NormalizeConfig, PathsConfig, PipelineConfig, ScorerConfig, SearchConfig,
    SinksConfig, DEFAULT_PIPELINE_CONFIG_PATH, ENV_PIPELINE_CONFIG_PATH,
};
