//! Structured enrichment attached to an item by the scorer.
//!
//! A `Decision` is the standardized scorer output: impact score, rationale,
//! confidence and a suggested next action, plus opportunity/risk one-liners.
//! Remote replies are parsed through [`Decision::from_loose_value`], which
//! coerces every numeric field and defaults the rest.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How soon the operator should act on the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeSensitivity {
    Immediate,
    Short,
    Medium,
    #[default]
    Low,
}

impl TimeSensitivity {
    /// Lenient parse: unknown or empty values map to `Low`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "IMMEDIATE" => Self::Immediate,
            "SHORT" => Self::Short,
            "MEDIUM" => Self::Medium,
            _ => Self::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "IMMEDIATE",
            Self::Short => "SHORT",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

/// Which strategy produced the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOrigin {
    #[default]
    Heuristic,
    Delegated,
    /// Local heuristic used after the delegated scorer gave up.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Impact on the business, in <0.0, 10.0>.
    pub impact_score: f64,
    #[serde(default)]
    pub impact_reason: String,
    /// Confidence in <0.0, 1.0>.
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub confidence_basis: String,
    #[serde(default)]
    pub next_action: String,
    #[serde(default)]
    pub time_sensitivity: TimeSensitivity,
    #[serde(default)]
    pub opportunity: String,
    #[serde(default)]
    pub risk: String,
    #[serde(default)]
    pub origin: DecisionOrigin,
}

impl Decision {
    pub fn new(impact_score: f64, impact_reason: impl Into<String>) -> Self {
        Self {
            impact_score: clamp_score(impact_score),
            impact_reason: impact_reason.into(),
            confidence: 0.0,
            confidence_basis: String::new(),
            next_action: String::new(),
            time_sensitivity: TimeSensitivity::Low,
            opportunity: String::new(),
            risk: String::new(),
            origin: DecisionOrigin::Heuristic,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = clamp01(confidence);
        self
    }

    pub fn with_basis(mut self, basis: impl Into<String>) -> Self {
        self.confidence_basis = basis.into();
        self
    }

    pub fn with_next_action(mut self, action: impl Into<String>) -> Self {
        self.next_action = action.into();
        self
    }

    pub fn with_time_sensitivity(mut self, ts: TimeSensitivity) -> Self {
        self.time_sensitivity = ts;
        self
    }

    pub fn with_outlook(mut self, opportunity: impl Into<String>, risk: impl Into<String>) -> Self {
        self.opportunity = opportunity.into();
        self.risk = risk.into();
        self
    }

    pub fn with_origin(mut self, origin: DecisionOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// A decision counts as complete once it names a next action.
    pub fn is_complete(&self) -> bool {
        !self.next_action.trim().is_empty()
    }

    /// Build from a loosely-typed JSON object (remote scorer reply).
    /// Numbers may arrive as numbers, numeric strings or `"7.5/10"`;
    /// anything unreadable defaults to 0 / empty / `LOW`.
    pub fn from_loose_value(v: &Value) -> Self {
        let text = |key: &str| -> String {
            match v.get(key) {
                Some(Value::String(s)) => s.trim().to_string(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            }
        };

        let impact = v.get("impact_score").and_then(coerce_f64).unwrap_or(0.0);
        let confidence = v.get("confidence").and_then(coerce_f64).unwrap_or(0.0);

        Self {
            impact_score: round1(clamp_score(impact)),
            impact_reason: text("impact_reason"),
            confidence: clamp01(confidence),
            confidence_basis: text("confidence_basis"),
            next_action: text("next_action"),
            time_sensitivity: TimeSensitivity::parse_lenient(&text("time_sensitivity")),
            opportunity: text("opportunity"),
            risk: text("risk"),
            origin: DecisionOrigin::Delegated,
        }
    }
}

/// Coerce a JSON value into a finite f64.
pub fn coerce_f64(v: &Value) -> Option<f64> {
    let x = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let head = s.trim().split('/').next().unwrap_or_default().trim();
            head.trim_end_matches('%').trim().parse::<f64>().ok()?
        }
        _ => return None,
    };
    x.is_finite().then_some(x)
}

pub fn clamp_score(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 10.0)
    }
}

pub fn clamp01(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serialize_decision_shape() {
        let d = Decision::new(7.4, "Recall widens across retailers")
            .with_confidence(0.82)
            .with_next_action("Brief the export team")
            .with_time_sensitivity(TimeSensitivity::Short)
            .with_outlook("Pitch sterile supply", "Buyer hesitancy");

        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["time_sensitivity"], json!("SHORT"));
        assert_eq!(v["origin"], json!("heuristic"));
        assert!(v.get("confidence_basis").is_none());
        let conf = v["confidence"].as_f64().unwrap();
        assert!((conf - 0.82).abs() < 1e-9);
    }

    #[test]
    fn loose_values_are_coerced_and_clamped() {
        let v = json!({
            "impact_score": "12.34/10",
            "confidence": "0.7",
            "next_action": "  Call supplier ",
            "time_sensitivity": "immediate",
            "risk": 3
        });
        let d = Decision::from_loose_value(&v);
        assert_eq!(d.impact_score, 10.0);
        assert!((d.confidence - 0.7).abs() < 1e-9);
        assert_eq!(d.next_action, "Call supplier");
        assert_eq!(d.time_sensitivity, TimeSensitivity::Immediate);
        assert_eq!(d.risk, "3");
        assert_eq!(d.origin, DecisionOrigin::Delegated);
    }

    #[test]
    fn garbage_fields_default() {
        let d = Decision::from_loose_value(&json!({"impact_score": "high", "confidence": null}));
        assert_eq!(d.impact_score, 0.0);
        assert_eq!(d.confidence, 0.0);
        assert_eq!(d.time_sensitivity, TimeSensitivity::Low);
        assert!(!d.is_complete());
    }
}
