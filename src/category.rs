//! Closed set of business categories the radar tracks.
//!
//! Declaration order is the canonical output order; `Ord` follows it, so
//! `BTreeMap<Category, _>` iterates in canonical order too.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    ListeriaFree,
    CulturedMeat,
    HighEndAudio,
    ComputerAi,
    GlobalBiz,
}

impl Category {
    /// Canonical order used when concatenating ranked output.
    pub const ALL: [Category; 5] = [
        Category::ListeriaFree,
        Category::CulturedMeat,
        Category::HighEndAudio,
        Category::ComputerAi,
        Category::GlobalBiz,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListeriaFree => "listeria_free",
            Self::CulturedMeat => "cultured_meat",
            Self::HighEndAudio => "high_end_audio",
            Self::ComputerAi => "computer_ai",
            Self::GlobalBiz => "global_biz",
        }
    }

    /// Slot count per category when the config does not override it.
    pub fn default_slots(&self) -> usize {
        match self {
            Self::ListeriaFree | Self::GlobalBiz => 4,
            Self::CulturedMeat | Self::HighEndAudio | Self::ComputerAi => 5,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::ListeriaFree => "Listeria Free",
            Self::CulturedMeat => "Cultured Meat",
            Self::HighEndAudio => "High-End Audio",
            Self::ComputerAi => "Computer & AI",
            Self::GlobalBiz => "Global Biz",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::ListeriaFree => "🦠",
            Self::CulturedMeat => "🥩",
            Self::HighEndAudio => "🎵",
            Self::ComputerAi => "🤖",
            Self::GlobalBiz => "🌍",
        }
    }

    /// Business context handed to the scorer for this category.
    pub fn default_context(&self) -> &'static str {
        match self {
            Self::ListeriaFree => {
                "The company runs a food business built on sterile mushroom cultivation. \
                 Weigh listeria outbreaks, recalls and tighter regulation by their effect on \
                 export pricing, customs clearance and brand trust."
            }
            Self::CulturedMeat => {
                "The company is expanding mycelium-based alternative protein and bio-media. \
                 Focus on regulation, investment, commercialization timelines and competitor \
                 partnerships or funding."
            }
            Self::HighEndAudio => {
                "Assess audio technology and market moves that affect the premium audio \
                 product lines: roadmap, patents and IP, and monetization potential."
            }
            Self::ComputerAi => {
                "Assess GPU supply, model competition and cloud pricing from the point of view \
                 of an AI infrastructure business: server payback, pricing policy, competitiveness."
            }
            Self::GlobalBiz => {
                "Assess macro issues that touch the whole portfolio: trade, FX, interest rates, \
                 subsidies and policy shifts, and how they interact."
            }
        }
    }

    /// Topic line used when asking a generator for more candidates.
    pub fn backfill_topic(&self) -> &'static str {
        match self {
            Self::ListeriaFree => "listeria outbreaks, food recalls, food-safety regulation",
            Self::CulturedMeat => "cultured meat, mycelium protein, precision fermentation",
            Self::HighEndAudio => {
                "DACs, high-end amplifiers, hi-fi streaming, audio shows, flagship releases"
            }
            Self::ComputerAi => {
                "GPUs, AI infrastructure, data centers, model releases, cloud pricing and policy"
            }
            Self::GlobalBiz => "trade, tariffs, FX, interest rates, subsidies, industrial policy",
        }
    }

    /// Exact (case-insensitive) snake_case match.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }

    /// Exact match first, then loose substring heuristics over free text
    /// (section headings, topics, plain sentences).
    pub fn guess(s: &str) -> Option<Self> {
        if let Some(c) = Self::parse(s) {
            return Some(c);
        }
        let s = s.to_lowercase();
        if s.contains("listeria") || s.contains("리스테리아") {
            return Some(Self::ListeriaFree);
        }
        if s.contains("cultured")
            || s.contains("mycelium")
            || s.contains("배양")
            || s.contains("균사체")
            || s.contains("fermentation")
            || s.contains("발효")
        {
            return Some(Self::CulturedMeat);
        }
        if s.contains("audio")
            || s.contains("hifi")
            || s.contains("hi-fi")
            || s.contains("하이엔드")
            || s.contains("오디오")
        {
            return Some(Self::HighEndAudio);
        }
        if s.contains("computer")
            || s.contains("openai")
            || s.contains("gpu")
            || s.contains("blackwell")
            || ai_word().is_match(&s)
        {
            return Some(Self::ComputerAi);
        }
        if s.contains("global") || s.contains("biz") || s.contains("tariff") || s.contains("관세")
        {
            return Some(Self::GlobalBiz);
        }
        None
    }
}

// "ai" only as a standalone token, never inside "said" or "daily".
fn ai_word() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?i)(^|[^a-z])ai([^a-z]|$)").expect("ai word regex"))
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown category `{s}`"))
    }
}
