//! AI adapter: text-generation providers, file cache + daily limit, and the
//! delegated scorer built on top of them.

use std::collections::VecDeque;
use std::fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::analyze::lenient;
use crate::analyze::retry::{run_with_retry, RetryOutcome, RetryPolicy};
use crate::config::ai::{ProviderConfig, ProviderKind};
use crate::decision::Decision;
use crate::error::ExternalCallError;
use crate::item::Item;

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

pub type ProviderFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String, ExternalCallError>> + Send + 'a>>;

/// Low-level provider: one remote text-generation call, no retries.
pub trait Provider: Send + Sync + 'static {
    fn complete<'a>(&'a self, system: &'a str, prompt: &'a str) -> ProviderFuture<'a>;
    fn name(&self) -> &'static str;
}

impl<P: Provider + ?Sized> Provider for Arc<P> {
    fn complete<'a>(&'a self, system: &'a str, prompt: &'a str) -> ProviderFuture<'a> {
        (**self).complete(system, prompt)
    }
    fn name(&self) -> &'static str {
        (**self).name()
    }
}

pub type DynProvider = Arc<dyn Provider>;

/// Relevance scorer seam. `None` means "no usable decision".
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, item: &Item, context: &str) -> Option<Decision>;
    fn name(&self) -> &str;
}

/// Factory: build a provider according to config and environment variables.
///
/// * If `NEWS_RADAR_AI_MODE=mock`, returns a deterministic mock provider.
/// * Else if the provider is disabled or has no key, returns a disabled provider.
/// * Else builds the real provider, wrapped with caching + daily limit when a
///   cache dir is configured.
pub fn build_provider(cfg: &ProviderConfig) -> DynProvider {
    if std::env::var("NEWS_RADAR_AI_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(MockProvider::new(MOCK_DECISION));
    }

    if !cfg.is_usable() || cfg.api_key.eq_ignore_ascii_case("env") {
        return Arc::new(DisabledProvider);
    }

    let built: Result<DynProvider, ExternalCallError> = match cfg.kind {
        ProviderKind::Anthropic => AnthropicProvider::new(cfg).map(|p| wrap(p, cfg)),
        ProviderKind::Openai | ProviderKind::Perplexity => {
            OpenAiCompatProvider::new(cfg).map(|p| wrap(p, cfg))
        }
        ProviderKind::Disabled => Ok(Arc::new(DisabledProvider)),
    };

    match built {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "provider construction failed; scoring stays local");
            Arc::new(DisabledProvider)
        }
    }
}

fn wrap<P: Provider>(p: P, cfg: &ProviderConfig) -> DynProvider {
    match &cfg.cache_dir {
        Some(dir) => Arc::new(CachingProvider::new(p, dir.clone(), cfg.daily_limit)),
        None => Arc::new(p),
    }
}

const MOCK_DECISION: &str = r#"{"impact_score": 6.0, "impact_reason": "Mock assessment", "confidence": 0.5, "confidence_basis": "mock", "next_action": "Review manually", "time_sensitivity": "MEDIUM", "opportunity": "n/a", "risk": "n/a"}"#;

// ------------------------------------------------------------
// Concrete providers
// ------------------------------------------------------------

fn http_client(timeout: Duration) -> Result<reqwest::Client, ExternalCallError> {
    reqwest::Client::builder()
        .user_agent(concat!("news-radar/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(5))
        .timeout(timeout)
        .build()
        .map_err(|e| ExternalCallError::NotConfigured(format!("http client: {e}")))
}

fn transport(e: reqwest::Error) -> ExternalCallError {
    ExternalCallError::Transport(e.to_string())
}

/// Anthropic Messages API.
pub struct AnthropicProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
}

impl AnthropicProvider {
    pub fn new(cfg: &ProviderConfig) -> Result<Self, ExternalCallError> {
        Ok(Self {
            http: http_client(cfg.timeout())?,
            api_key: cfg.api_key.clone(),
            model: cfg.model_or_default().to_string(),
            base_url: cfg
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.anthropic.com".into()),
            max_tokens: cfg.max_tokens,
        })
    }
}

impl Provider for AnthropicProvider {
    fn complete<'a>(&'a self, system: &'a str, prompt: &'a str) -> ProviderFuture<'a> {
        Box::pin(async move {
            #[derive(Serialize)]
            struct Msg<'a> {
                role: &'a str,
                content: &'a str,
            }
            #[derive(Serialize)]
            struct Req<'a> {
                model: &'a str,
                max_tokens: u32,
                #[serde(skip_serializing_if = "str::is_empty")]
                system: &'a str,
                messages: Vec<Msg<'a>>,
            }
            #[derive(Deserialize)]
            struct Resp {
                #[serde(default)]
                content: Vec<Block>,
            }
            #[derive(Deserialize)]
            struct Block {
                #[serde(default)]
                text: String,
            }

            let req = Req {
                model: &self.model,
                max_tokens: self.max_tokens,
                system,
                messages: vec![Msg {
                    role: "user",
                    content: prompt,
                }],
            };

            let resp = self
                .http
                .post(format!("{}/v1/messages", self.base_url.trim_end_matches('/')))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01")
                .json(&req)
                .send()
                .await
                .map_err(transport)?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(ExternalCallError::from_status(status.as_u16(), body));
            }
            let body: Resp = resp
                .json()
                .await
                .map_err(|e| ExternalCallError::Unparseable(e.to_string()))?;
            let text: String = body.content.into_iter().map(|b| b.text).collect();
            if text.trim().is_empty() {
                return Err(ExternalCallError::Unparseable("empty completion".into()));
            }
            Ok(text)
        })
    }
    fn name(&self) -> &'static str {
        "anthropic"
    }
}

/// OpenAI-compatible Chat Completions (OpenAI, Perplexity).
pub struct OpenAiCompatProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    name: &'static str,
}

impl OpenAiCompatProvider {
    pub fn new(cfg: &ProviderConfig) -> Result<Self, ExternalCallError> {
        let (name, default_base) = match cfg.kind {
            ProviderKind::Perplexity => ("perplexity", "https://api.perplexity.ai"),
            _ => ("openai", "https://api.openai.com/v1"),
        };
        Ok(Self {
            http: http_client(cfg.timeout())?,
            api_key: cfg.api_key.clone(),
            model: cfg.model_or_default().to_string(),
            base_url: cfg.base_url.clone().unwrap_or_else(|| default_base.into()),
            max_tokens: cfg.max_tokens,
            name,
        })
    }
}

impl Provider for OpenAiCompatProvider {
    fn complete<'a>(&'a self, system: &'a str, prompt: &'a str) -> ProviderFuture<'a> {
        Box::pin(async move {
            #[derive(Serialize)]
            struct Msg<'a> {
                role: &'a str,
                content: &'a str,
            }
            #[derive(Serialize)]
            struct Req<'a> {
                model: &'a str,
                messages: Vec<Msg<'a>>,
                temperature: f32,
                max_tokens: u32,
            }
            #[derive(Deserialize)]
            struct Resp {
                choices: Vec<Choice>,
            }
            #[derive(Deserialize)]
            struct Choice {
                message: ChoiceMsg,
            }
            #[derive(Deserialize)]
            struct ChoiceMsg {
                #[serde(default)]
                content: String,
            }

            let mut messages = Vec::with_capacity(2);
            if !system.is_empty() {
                messages.push(Msg {
                    role: "system",
                    content: system,
                });
            }
            messages.push(Msg {
                role: "user",
                content: prompt,
            });
            let req = Req {
                model: &self.model,
                messages,
                temperature: 0.2,
                max_tokens: self.max_tokens,
            };

            let resp = self
                .http
                .post(format!(
                    "{}/chat/completions",
                    self.base_url.trim_end_matches('/')
                ))
                .bearer_auth(&self.api_key)
                .json(&req)
                .send()
                .await
                .map_err(transport)?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(ExternalCallError::from_status(status.as_u16(), body));
            }
            let body: Resp = resp
                .json()
                .await
                .map_err(|e| ExternalCallError::Unparseable(e.to_string()))?;
            body.choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .filter(|c| !c.trim().is_empty())
                .ok_or_else(|| ExternalCallError::Unparseable("empty completion".into()))
        })
    }
    fn name(&self) -> &'static str {
        self.name
    }
}

/// Always fails with `NotConfigured`; used when remote scoring is off.
pub struct DisabledProvider;

impl Provider for DisabledProvider {
    fn complete<'a>(&'a self, _system: &'a str, _prompt: &'a str) -> ProviderFuture<'a> {
        Box::pin(async { Err(ExternalCallError::NotConfigured("provider disabled".into())) })
    }
    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Returns the same reply for every prompt.
#[derive(Clone)]
pub struct MockProvider {
    pub fixed: String,
}

impl MockProvider {
    pub fn new(fixed: impl Into<String>) -> Self {
        Self {
            fixed: fixed.into(),
        }
    }
}

impl Provider for MockProvider {
    fn complete<'a>(&'a self, _system: &'a str, _prompt: &'a str) -> ProviderFuture<'a> {
        let out = self.fixed.clone();
        Box::pin(async move { Ok(out) })
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Replays a queue of canned results and records every prompt it sees.
/// Once the queue is empty every call fails with `NotConfigured`.
#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<String, ExternalCallError>>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new<I>(script: I) -> Self
    where
        I: IntoIterator<Item = Result<String, ExternalCallError>>,
    {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

impl Provider for ScriptedProvider {
    fn complete<'a>(&'a self, _system: &'a str, prompt: &'a str) -> ProviderFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut g) = self.prompts.lock() {
            g.push(prompt.to_string());
        }
        let next = self
            .script
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| Err(ExternalCallError::NotConfigured("script exhausted".into())));
        Box::pin(async move { next })
    }
    fn name(&self) -> &'static str {
        "scripted"
    }
}

// ------------------------------------------------------------
// Caching wrapper (file cache + daily limit)
// ------------------------------------------------------------

/// Caches successful replies on disk and caps real calls per UTC day.
/// Cache and counter writes are best-effort: a failed write is logged and the
/// reply is still returned.
pub struct CachingProvider<P: Provider> {
    inner: P,
    cache_dir: PathBuf,
    daily_limit_max: u32,
    counter: Mutex<DailyCounter>,
}

impl<P: Provider> CachingProvider<P> {
    pub fn new(inner: P, cache_dir: PathBuf, daily_limit_max: u32) -> Self {
        if let Err(e) = fs::create_dir_all(&cache_dir) {
            tracing::warn!(target: "ai", dir = %cache_dir.display(), error = %e, "cannot create reply cache dir");
        }
        let counter = match load_daily_counter(&cache_dir) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => DailyCounter::default(),
            Err(e) => {
                tracing::warn!(target: "ai", dir = %cache_dir.display(), error = %e, "daily counter unreadable; starting from zero");
                DailyCounter::default()
            }
        };
        let counter = Mutex::new(counter);
        Self {
            inner,
            cache_dir,
            daily_limit_max,
            counter,
        }
    }

    async fn complete_impl(&self, system: &str, prompt: &str) -> Result<String, ExternalCallError> {
        let key = cache_key(system, prompt);
        if let Some(hit) = read_cache_file(&self.cache_dir, &key).await {
            return Ok(hit);
        }

        // Real API calls only increment; cache hits do not.
        // The guard is dropped before any await.
        let reset = {
            let mut g = self
                .counter
                .lock()
                .map_err(|_| ExternalCallError::NotConfigured("counter poisoned".into()))?;
            let reset = if g.is_expired() {
                g.reset_to_today();
                Some(g.clone())
            } else {
                None
            };
            if g.count >= self.daily_limit_max {
                return Err(ExternalCallError::NotConfigured(format!(
                    "daily limit of {} calls reached",
                    self.daily_limit_max
                )));
            }
            reset
        };
        if let Some(snapshot) = reset {
            self.persist_counter(&snapshot).await;
        }

        let fresh = self.inner.complete(system, prompt).await?;
        if let Err(e) = write_cache_file(&self.cache_dir, &key, &fresh).await {
            tracing::warn!(target: "ai", key = %key, error = %e, "reply cache write failed");
        }
        let snapshot = {
            match self.counter.lock() {
                Ok(mut g) => {
                    g.count = g.count.saturating_add(1);
                    Some(g.clone())
                }
                Err(_) => None,
            }
        };
        if let Some(snapshot) = snapshot {
            self.persist_counter(&snapshot).await;
        }
        Ok(fresh)
    }

    async fn persist_counter(&self, dc: &DailyCounter) {
        if let Err(e) = save_daily_counter(&self.cache_dir, dc).await {
            tracing::warn!(target: "ai", count = dc.count, error = %e, "daily counter write failed");
        }
    }
}

impl<P: Provider> Provider for CachingProvider<P> {
    fn complete<'a>(&'a self, system: &'a str, prompt: &'a str) -> ProviderFuture<'a> {
        Box::pin(self.complete_impl(system, prompt))
    }
    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

fn cache_key(system: &str, prompt: &str) -> String {
    let mut h = Sha256::new();
    h.update(system.as_bytes());
    h.update([0u8]);
    h.update(prompt.as_bytes());
    h.finalize()
        .iter()
        .take(16)
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn cache_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.txt"))
}

async fn read_cache_file(dir: &Path, key: &str) -> Option<String> {
    tokio::fs::read_to_string(cache_path(dir, key)).await.ok()
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}

async fn write_cache_file(dir: &Path, key: &str, value: &str) -> io::Result<()> {
    write_atomic(&cache_path(dir, key), value.as_bytes()).await
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DailyCounter {
    date: String,
    count: u32,
}

impl Default for DailyCounter {
    fn default() -> Self {
        Self {
            date: today(),
            count: 0,
        }
    }
}

impl DailyCounter {
    fn is_expired(&self) -> bool {
        self.date != today()
    }
    fn reset_to_today(&mut self) {
        self.date = today();
        self.count = 0;
    }
}

fn today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

fn counter_path(dir: &Path) -> PathBuf {
    dir.join("daily_count.json")
}

fn load_daily_counter(dir: &Path) -> io::Result<DailyCounter> {
    let s = fs::read_to_string(counter_path(dir))?;
    serde_json::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

async fn save_daily_counter(dir: &Path, dc: &DailyCounter) -> io::Result<()> {
    let s = serde_json::to_string(dc).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    write_atomic(&counter_path(dir), s.as_bytes()).await
}

// ------------------------------------------------------------
// Delegated scorer
// ------------------------------------------------------------

const SCORER_SYSTEM: &str =
    "You are a business decision analyst for a founder. Reply with one JSON object only.";

/// Scores items by asking a text-generation provider for a structured decision.
pub struct DelegatedScorer<P: Provider> {
    provider: P,
    retry: RetryPolicy,
}

impl<P: Provider> DelegatedScorer<P> {
    pub fn new(provider: P, retry: RetryPolicy) -> Self {
        Self { provider, retry }
    }

    pub fn prompt_for(item: &Item, context: &str) -> String {
        format!(
            "[Business context]\n{context}\n\n\
             [News]\nTitle: {title}\nSummary: {summary}\nSource: {source}\nLink: {url}\n\n\
             Output only this JSON object, no other text:\n\
             {{\n  \"impact_score\": number 0-10 (one decimal),\n  \
             \"impact_reason\": \"1-2 sentences\",\n  \
             \"confidence\": number 0-1 (two decimals),\n  \
             \"confidence_basis\": \"1 sentence\",\n  \
             \"next_action\": \"the founder's next step, 1 sentence\",\n  \
             \"time_sensitivity\": \"IMMEDIATE|SHORT|MEDIUM|LOW\",\n  \
             \"opportunity\": \"1 sentence\",\n  \
             \"risk\": \"1 sentence\"\n}}",
            title = item.title,
            summary = item.summary,
            source = item.source,
            url = item.url.as_deref().unwrap_or_default(),
        )
    }

    /// One scoring attempt under the retry policy, with the failure kept.
    pub async fn try_score(&self, item: &Item, context: &str) -> Result<Decision, ExternalCallError> {
        let prompt = Self::prompt_for(item, context);
        let outcome = run_with_retry(&self.retry, ExternalCallError::is_transient, |_| {
            self.provider.complete(SCORER_SYSTEM, &prompt)
        })
        .await;

        let text = match outcome {
            RetryOutcome::Success(t) => t,
            RetryOutcome::ExhaustedRetries {
                attempts,
                last_error,
            } => {
                tracing::warn!(target: "enrich", id = %item.id, attempts, error = %last_error, "scorer retries exhausted");
                return Err(last_error);
            }
            RetryOutcome::Fatal(e) => return Err(e),
        };

        let obj = lenient::first_json_object(&text)
            .ok_or_else(|| ExternalCallError::Unparseable("no json object in reply".into()))?;
        Ok(Decision::from_loose_value(&obj))
    }
}

#[async_trait]
impl<P: Provider> Scorer for DelegatedScorer<P> {
    async fn score(&self, item: &Item, context: &str) -> Option<Decision> {
        match self.try_score(item, context).await {
            Ok(d) => Some(d),
            Err(e) => {
                tracing::debug!(target: "enrich", id = %item.id, provider = self.provider.name(), error = %e, "delegated scoring failed");
                None
            }
        }
    }

    fn name(&self) -> &str {
        self.provider.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn caching_provider_serves_repeats_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let inner = Arc::new(ScriptedProvider::new([Ok("first".to_string())]));
        let cached = CachingProvider::new(inner.clone(), dir.path().to_path_buf(), 10);

        assert_eq!(cached.complete("s", "p").await.unwrap(), "first");
        assert_eq!(cached.complete("s", "p").await.unwrap(), "first");
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn daily_limit_blocks_real_calls() {
        let dir = tempfile::tempdir().unwrap();
        let inner = MockProvider::new("ok");
        let cached = CachingProvider::new(inner, dir.path().to_path_buf(), 1);

        assert!(cached.complete("s", "a").await.is_ok());
        let err = cached.complete("s", "b").await.unwrap_err();
        assert!(matches!(err, ExternalCallError::NotConfigured(_)));
        // cache hit still served
        assert!(cached.complete("s", "a").await.is_ok());
    }

    #[tokio::test]
    async fn unwritable_cache_still_returns_the_reply() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the cache dir should be: every cache write fails.
        let blocked = dir.path().join("cache");
        std::fs::write(&blocked, "not a dir").unwrap();
        let inner = Arc::new(ScriptedProvider::new([Ok("a".to_string()), Ok("b".to_string())]));
        let cached = CachingProvider::new(inner.clone(), blocked.clone(), 10);

        assert_eq!(cached.complete("s", "p").await.unwrap(), "a");
        // Nothing was cached, so the repeat goes to the provider again.
        assert_eq!(cached.complete("s", "p").await.unwrap(), "b");
        assert_eq!(inner.calls(), 2);
        assert_eq!(cached.counter.lock().unwrap().count, 2);
        assert_eq!(std::fs::read_to_string(&blocked).unwrap(), "not a dir");
    }

    #[tokio::test]
    async fn daily_counter_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let cached = CachingProvider::new(MockProvider::new("ok"), dir.path().to_path_buf(), 5);
        cached.complete("s", "a").await.unwrap();
        cached.complete("s", "b").await.unwrap();
        assert_eq!(load_daily_counter(dir.path()).unwrap().count, 2);
    }

    #[tokio::test]
    async fn disabled_provider_is_not_configured() {
        let err = DisabledProvider.complete("", "x").await.unwrap_err();
        assert!(!err.is_transient());
    }
}
