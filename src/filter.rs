//! Keyword relevance gate.
//!
//! Case-insensitive substring containment. Exclusions are checked strictly
//! before inclusions, so one excluded term rejects the text no matter how
//! many included terms also match.

use serde::Serialize;

use crate::ingest::config::KeywordLists;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "keyword", rename_all = "snake_case")]
pub enum RejectReason {
    ExcludedKeyword(String),
    NoMatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    /// Matched include keywords, non-empty, in keyword-list order.
    Accepted(Vec<String>),
    Rejected(RejectReason),
}

#[derive(Debug, Clone)]
pub struct KeywordFilter {
    include: Vec<(String, String)>,
    exclude: Vec<(String, String)>,
}

/// Lowercase fold used for every containment check.
pub fn fold(s: &str) -> String {
    s.to_lowercase()
}

fn prepare(list: &[String]) -> Vec<(String, String)> {
    let mut seen = std::collections::HashSet::new();
    list.iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .filter(|k| seen.insert(fold(k)))
        .map(|k| (k.to_string(), fold(k)))
        .collect()
}

impl KeywordFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Self {
        Self {
            include: prepare(include),
            exclude: prepare(exclude),
        }
    }

    pub fn from_lists(lists: &KeywordLists) -> Self {
        Self::new(&lists.include, &lists.exclude)
    }

    pub fn evaluate(&self, text: &str) -> FilterDecision {
        let hay = fold(text);

        if let Some((kw, _)) = self.exclude.iter().find(|(_, f)| hay.contains(f.as_str())) {
            return FilterDecision::Rejected(RejectReason::ExcludedKeyword(kw.clone()));
        }

        let matched: Vec<String> = self
            .include
            .iter()
            .filter(|(_, f)| hay.contains(f.as_str()))
            .map(|(kw, _)| kw.clone())
            .collect();

        if matched.is_empty() {
            FilterDecision::Rejected(RejectReason::NoMatch)
        } else {
            FilterDecision::Accepted(matched)
        }
    }
}

impl Default for KeywordFilter {
    fn default() -> Self {
        Self::from_lists(&KeywordLists::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(include: &[&str], exclude: &[&str]) -> KeywordFilter {
        let s = |xs: &[&str]| xs.iter().map(|x| x.to_string()).collect::<Vec<_>>();
        KeywordFilter::new(&s(include), &s(exclude))
    }

    #[test]
    fn accepted_in_list_order() {
        let kf = f(&["gpu", "Blackwell", "mycelium"], &[]);
        assert_eq!(
            kf.evaluate("NVIDIA BLACKWELL GPU ramps"),
            FilterDecision::Accepted(vec!["gpu".into(), "Blackwell".into()])
        );
    }

    #[test]
    fn duplicate_keywords_match_once() {
        let kf = f(&["GPU", "gpu"], &[]);
        assert_eq!(kf.evaluate("gpu gpu"), FilterDecision::Accepted(vec!["GPU".into()]));
    }

    #[test]
    fn no_match_is_rejected() {
        assert_eq!(
            f(&["listeria"], &[]).evaluate("Weather update"),
            FilterDecision::Rejected(RejectReason::NoMatch)
        );
    }

    #[test]
    fn exclusion_wins() {
        let kf = f(&["gpu"], &["Sponsored"]);
        assert_eq!(
            kf.evaluate("sponsored: new GPU deal"),
            FilterDecision::Rejected(RejectReason::ExcludedKeyword("Sponsored".into()))
        );
    }
}
