// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const ENV_PATH: &str = "NEWS_RADAR_KEYWORDS_PATH";

/// Include/exclude keyword lists for the relevance gate.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeywordLists {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for KeywordLists {
    fn default() -> Self {
        let s = |xs: &[&str]| xs.iter().map(|x| x.to_string()).collect::<Vec<_>>();
        Self {
            include: s(&[
                "균사체",
                "mycelium",
                "배양육",
                "cultured meat",
                "cell-based",
                "fermentation",
                "배양",
                "바이오",
                "listeria",
                "리스테리아",
                "recall",
                "리콜",
                "fda",
                "고급 오디오",
                "하이엔드",
                "high-end audio",
                "hi-fi",
                "gpu",
                "blackwell",
                "openai",
                "data center",
                "인공지능",
                "tariff",
                "관세",
                "환율",
            ]),
            exclude: s(&["광고", "스폰서", "sponsored", "promo", "affiliate"]),
        }
    }
}

/// Load keyword lists from an explicit path. Supports TOML or JSON formats.
pub fn load_keywords_from(path: &Path) -> Result<KeywordLists> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading keyword lists from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_keywords(&content, ext.as_str())
}

/// Load keyword lists using env var + fallbacks:
/// 1) $NEWS_RADAR_KEYWORDS_PATH
/// 2) config/keywords.toml
/// 3) config/keywords.json
/// 4) built-in defaults
pub fn load_keywords_default() -> Result<KeywordLists> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_keywords_from(&pb);
        } else {
            return Err(anyhow!("{ENV_PATH} points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/keywords.toml");
    if toml_p.exists() {
        return load_keywords_from(&toml_p);
    }
    let json_p = PathBuf::from("config/keywords.json");
    if json_p.exists() {
        return load_keywords_from(&json_p);
    }
    Ok(KeywordLists::default())
}

fn parse_keywords(s: &str, hint_ext: &str) -> Result<KeywordLists> {
    if hint_ext == "toml" {
        return parse_toml(s);
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    parse_toml(s).map_err(|_| anyhow!("unsupported keyword list format"))
}

fn parse_toml(s: &str) -> Result<KeywordLists> {
    let v: KeywordLists = toml::from_str(s).context("parsing keyword toml")?;
    Ok(clean(v))
}

fn parse_json(s: &str) -> Result<KeywordLists> {
    let v: KeywordLists = serde_json::from_str(s).context("parsing keyword json")?;
    Ok(clean(v))
}

fn clean(v: KeywordLists) -> KeywordLists {
    KeywordLists {
        include: clean_list(v.include),
        exclude: clean_list(v.exclude),
    }
}

/// Trim, drop empties and case-insensitive repeats. Order is preserved
/// because it decides the order of matched keywords.
fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for it in items {
        let t = it.trim();
        if !t.is_empty() && seen.insert(t.to_lowercase()) {
            out.push(t.to_string());
        }
    }
    out
}
