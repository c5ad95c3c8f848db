// src/analyze/rerank.rs
//! Ranking: dedup by identity key, order each category by
//! (score, confidence, published_at) descending, cap to its slots.
//!
//! - Missing or NaN scores/confidences rank lowest.
//! - Sorting is stable, so full ties keep input order.
//! - Output concatenates categories in canonical order, which makes
//!   `rank_and_trim(rank_and_trim(x)) == rank_and_trim(x)`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use crate::category::Category;
use crate::item::Item;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankOptions {
    /// Per-category slot counts; missing categories use their defaults.
    pub slots: BTreeMap<Category, usize>,
    /// Keep `slots × multiplier` per category (overflow pool). Default 1.
    pub overflow_multiplier: usize,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            slots: Category::ALL
                .iter()
                .map(|c| (*c, c.default_slots()))
                .collect(),
            overflow_multiplier: 1,
        }
    }
}

impl RankOptions {
    pub fn slots_for(&self, c: Category) -> usize {
        self.slots.get(&c).copied().unwrap_or_else(|| c.default_slots())
    }

    /// How many items the ranker retains for `c`.
    pub fn limit_for(&self, c: Category) -> usize {
        self.slots_for(c).saturating_mul(self.overflow_multiplier.max(1))
    }
}

fn key(v: Option<f64>) -> f64 {
    v.unwrap_or(f64::NEG_INFINITY)
}

/// Descending by score, then confidence, then recency.
pub fn compare(a: &Item, b: &Item) -> Ordering {
    key(b.rank_score())
        .total_cmp(&key(a.rank_score()))
        .then_with(|| key(b.rank_confidence()).total_cmp(&key(a.rank_confidence())))
        .then_with(|| b.published_at.cmp(&a.published_at))
}

pub fn rank_and_trim(items: Vec<Item>, opts: &RankOptions) -> Vec<Item> {
    let mut seen: HashSet<String> = HashSet::with_capacity(items.len());
    let mut buckets: BTreeMap<Category, Vec<Item>> = BTreeMap::new();

    for it in items {
        if seen.insert(it.id.clone()) {
            buckets.entry(it.category).or_default().push(it);
        }
    }

    let mut out = Vec::new();
    for c in Category::ALL {
        if let Some(mut bucket) = buckets.remove(&c) {
            bucket.sort_by(compare);
            bucket.truncate(opts.limit_for(c));
            out.extend(bucket);
        }
    }
    out
}

/// Top `n` across all categories, ties in input order.
pub fn select_top(items: &[Item], n: usize) -> Vec<&Item> {
    let mut refs: Vec<&Item> = items.iter().collect();
    refs.sort_by(|a, b| compare(a, b));
    refs.truncate(n);
    refs
}

pub fn counts_by_category(items: &[Item]) -> BTreeMap<Category, usize> {
    let mut m = BTreeMap::new();
    for it in items {
        *m.entry(it.category).or_insert(0) += 1;
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{identity_key, EnrichmentStatus};
    use chrono::{TimeZone, Utc};

    fn item(cat: Category, title: &str, score: Option<f64>, day: u32) -> Item {
        Item {
            id: identity_key(cat, title, None, ""),
            category: cat,
            title: title.into(),
            source: String::new(),
            url: None,
            published_at: Utc.with_ymd_and_hms(2026, 2, day, 0, 0, 0).unwrap(),
            summary: String::new(),
            highlights: vec![],
            tags: vec![],
            keywords: vec![],
            score,
            decision: None,
            status: EnrichmentStatus::Collecting,
            decision_generated_at: None,
        }
    }

    #[test]
    fn missing_and_nan_scores_sort_last() {
        let items = vec![
            item(Category::GlobalBiz, "none", None, 9),
            item(Category::GlobalBiz, "nan", Some(f64::NAN), 9),
            item(Category::GlobalBiz, "low", Some(1.0), 1),
            item(Category::GlobalBiz, "high", Some(9.0), 1),
        ];
        let out = rank_and_trim(items, &RankOptions::default());
        let titles: Vec<&str> = out.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["high", "low", "none", "nan"]);
    }

    #[test]
    fn recency_breaks_score_ties() {
        let items = vec![
            item(Category::ComputerAi, "old", Some(5.0), 1),
            item(Category::ComputerAi, "new", Some(5.0), 5),
        ];
        let out = rank_and_trim(items, &RankOptions::default());
        assert_eq!(out[0].title, "new");
    }

    #[test]
    fn overflow_multiplier_widens_limit() {
        let items: Vec<Item> = (1..=12)
            .map(|d| item(Category::ListeriaFree, &format!("t{d}"), Some(d as f64 / 2.0), d))
            .collect();
        assert_eq!(rank_and_trim(items.clone(), &RankOptions::default()).len(), 4);
        let wide = RankOptions {
            overflow_multiplier: 2,
            ..RankOptions::default()
        };
        assert_eq!(rank_and_trim(items, &wide).len(), 8);
    }

    #[test]
    fn canonical_category_order() {
        let items = vec![
            item(Category::GlobalBiz, "g", Some(9.0), 1),
            item(Category::ListeriaFree, "l", Some(1.0), 1),
        ];
        let out = rank_and_trim(items, &RankOptions::default());
        assert_eq!(out[0].category, Category::ListeriaFree);
        assert_eq!(out[1].category, Category::GlobalBiz);
    }
}
