// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::{env, path::PathBuf, time::Duration};

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_tokens() -> u32 {
    800
}
fn default_daily_limit() -> u32 {
    200
}
fn default_api_key() -> String {
    "ENV".into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Disabled,
    Anthropic,
    Openai,
    Perplexity,
}

impl ProviderKind {
    pub fn key_env(&self) -> Option<&'static str> {
        match self {
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Openai => Some("OPENAI_API_KEY"),
            Self::Perplexity => Some("PERPLEXITY_API_KEY"),
            Self::Disabled => None,
        }
    }

    pub fn model_env(&self) -> Option<&'static str> {
        match self {
            Self::Anthropic => Some("ANTHROPIC_MODEL"),
            Self::Openai => Some("OPENAI_MODEL"),
            Self::Perplexity => Some("PERPLEXITY_MODEL"),
            Self::Disabled => None,
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            Self::Anthropic => "claude-sonnet-4-20250514",
            Self::Openai => "gpt-4o-mini",
            Self::Perplexity => "sonar",
            Self::Disabled => "",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, rename = "provider")]
    pub kind: ProviderKind,
    #[serde(default)]
    pub model: Option<String>,
    /// "ENV" means: read from the provider's `*_API_KEY` env var.
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// File cache for replies; `None` disables caching and the daily limit.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
}

fn default_true() -> bool {
    true
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            kind: ProviderKind::Disabled,
            model: None,
            api_key: default_api_key(),
            base_url: None,
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
            cache_dir: None,
            daily_limit: default_daily_limit(),
        }
    }
}

impl ProviderConfig {
    pub fn of(kind: ProviderKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Resolve an `"ENV"` api key and the model override from the environment.
    /// A missing key leaves `api_key` empty, which disables the provider.
    pub fn resolve_env(mut self) -> Self {
        if self.api_key.trim().eq_ignore_ascii_case("env") {
            self.api_key = self
                .kind
                .key_env()
                .and_then(|k| env::var(k).ok())
                .map(|k| k.trim().to_string())
                .unwrap_or_default();
        }
        if self.model.is_none() {
            self.model = self.kind.model_env().and_then(|k| env::var(k).ok());
        }
        self
    }

    pub fn model_or_default(&self) -> &str {
        self.model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.kind.default_model())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn is_usable(&self) -> bool {
        self.enabled && self.kind != ProviderKind::Disabled && !self.api_key.is_empty()
    }
}
