//! Canonical news item.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::category::Category;
use crate::decision::{clamp_score, Decision};

/// Enrichment status. `Collecting → PendingAction`, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrichmentStatus {
    #[default]
    Collecting,
    PendingAction,
}

/// Sourced items carry a valid absolute http(s) URL; informational ones don't.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemClass {
    Sourced,
    Informational,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub category: Category,
    pub title: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(with = "iso_millis")]
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    #[serde(default)]
    pub status: EnrichmentStatus,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "iso_millis::option"
    )]
    pub decision_generated_at: Option<DateTime<Utc>>,
}

/// Returned when a decision would overwrite a completed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlreadyEnriched;

impl Item {
    pub fn class(&self) -> ItemClass {
        match self.url.as_deref() {
            Some(u) if is_absolute_http_url(u) => ItemClass::Sourced,
            _ => ItemClass::Informational,
        }
    }

    pub fn is_sourced(&self) -> bool {
        self.class() == ItemClass::Sourced
    }

    /// True once a decision with a next action is attached.
    pub fn is_enriched(&self) -> bool {
        self.decision.as_ref().is_some_and(Decision::is_complete)
    }

    /// Attach a scorer decision. Refuses to touch an already enriched item.
    pub fn attach_decision(
        &mut self,
        decision: Decision,
        now: DateTime<Utc>,
    ) -> Result<(), AlreadyEnriched> {
        if self.is_enriched() {
            return Err(AlreadyEnriched);
        }
        self.score = Some(clamp_score(decision.impact_score));
        if decision.is_complete() {
            self.status = EnrichmentStatus::PendingAction;
        }
        self.decision = Some(decision);
        self.decision_generated_at = Some(now);
        Ok(())
    }

    /// Score used for ranking: clamped, `None` for missing or NaN.
    pub fn rank_score(&self) -> Option<f64> {
        self.score.filter(|s| s.is_finite()).map(clamp_score)
    }

    pub fn rank_confidence(&self) -> Option<f64> {
        self.decision
            .as_ref()
            .map(|d| d.confidence)
            .filter(|c| c.is_finite())
    }

    /// Text the keyword gate and heuristic scorer look at.
    pub fn match_text(&self) -> String {
        let mut s = String::with_capacity(self.title.len() + self.summary.len() + 32);
        s.push_str(&self.title);
        s.push(' ');
        s.push_str(&self.summary);
        for t in &self.tags {
            s.push(' ');
            s.push_str(t);
        }
        s
    }
}

/// Stable identity key: SHA-256 over the lowercased
/// `category||title||url||source`, first 20 bytes as hex.
pub fn identity_key(category: Category, title: &str, url: Option<&str>, source: &str) -> String {
    let base = format!(
        "{}||{}||{}||{}",
        category.as_str(),
        title.trim(),
        url.unwrap_or_default().trim(),
        source.trim()
    )
    .to_lowercase();

    let digest = Sha256::digest(base.as_bytes());
    let mut out = String::with_capacity(40);
    for b in digest.iter().take(20) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Syntactically valid absolute `http(s)` URL with a host.
pub fn is_absolute_http_url(s: &str) -> bool {
    match url::Url::parse(s.trim()) {
        Ok(u) => matches!(u.scheme(), "http" | "https") && u.host_str().is_some(),
        Err(_) => false,
    }
}

/// ISO-8601 UTC with milliseconds and `Z`, e.g. `2026-02-10T00:00:00.000Z`.
pub(crate) mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        crate::ingest::dates::parse_published_at(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unparseable timestamp `{raw}`")))
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            dt: &Option<DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match dt {
                Some(dt) => super::serialize(dt, s),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            let raw: Option<String> = Option::deserialize(d)?;
            Ok(raw.and_then(|r| crate::ingest::dates::parse_published_at(&r)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::Decision;
    use chrono::TimeZone;

    fn sample() -> Item {
        Item {
            id: identity_key(Category::ComputerAi, "GPU prices fall", None, "Wire"),
            category: Category::ComputerAi,
            title: "GPU prices fall".into(),
            source: "Wire".into(),
            url: None,
            published_at: Utc.with_ymd_and_hms(2026, 2, 10, 0, 0, 0).unwrap(),
            summary: String::new(),
            highlights: vec![],
            tags: vec![],
            keywords: vec![],
            score: None,
            decision: None,
            status: EnrichmentStatus::Collecting,
            decision_generated_at: None,
        }
    }

    #[test]
    fn identity_key_is_stable_and_case_insensitive() {
        let a = identity_key(Category::GlobalBiz, "Tariffs Rise", Some("https://x.io/a"), "Wire");
        let b = identity_key(Category::GlobalBiz, "tariffs rise", Some("https://x.io/a"), "WIRE");
        let c = identity_key(Category::ComputerAi, "Tariffs Rise", Some("https://x.io/a"), "Wire");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 40);
    }

    #[test]
    fn url_validity_decides_class() {
        let mut it = sample();
        assert_eq!(it.class(), ItemClass::Informational);
        it.url = Some("www.example.com/story".into());
        assert_eq!(it.class(), ItemClass::Informational);
        it.url = Some("ftp://example.com/a".into());
        assert_eq!(it.class(), ItemClass::Informational);
        it.url = Some("https://example.com/story".into());
        assert_eq!(it.class(), ItemClass::Sourced);
    }

    #[test]
    fn status_never_regresses() {
        let mut it = sample();
        let now = Utc::now();
        let d = Decision::new(6.5, "r").with_next_action("Watch pricing");
        assert!(it.attach_decision(d, now).is_ok());
        assert_eq!(it.status, EnrichmentStatus::PendingAction);
        assert_eq!(it.score, Some(6.5));

        let again = Decision::new(1.0, "other").with_next_action("Ignore");
        assert_eq!(it.attach_decision(again, now), Err(AlreadyEnriched));
        assert_eq!(it.score, Some(6.5));
        assert_eq!(it.status, EnrichmentStatus::PendingAction);
    }

    #[test]
    fn published_at_serializes_with_millis() {
        let v = serde_json::to_value(sample()).unwrap();
        assert_eq!(v["published_at"], serde_json::json!("2026-02-10T00:00:00.000Z"));
        assert_eq!(v["status"], serde_json::json!("COLLECTING"));
        assert!(v.get("decision").is_none());
    }
}
