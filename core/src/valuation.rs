//! Valuation snapshots and the value resolver.
//!
//! A snapshot maps a source name ("KBB", "MMR", ...) to whatever the
//! scraper captured for it: a number, a currency string, or a nested
//! structure of sub-values. `ValueResolver` reduces any of those shapes
//! to a single positive-or-negative amount, or `None`.
//!
//! RULE: resolution never fails. Anything unusable is `None`, and
//! `None` is the only "no value" signal the rest of the engine sees.

use crate::{config::InsightConfig, types::Amount};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// One raw reading for a single valuation source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum RawValuation {
    Number(f64),
    Text(String),
    /// Sub-values in the order the source wrote them.
    Nested(IndexMap<String, RawValuation>),
    /// null, booleans, arrays: shapes no source ever uses for an amount.
    Absent,
}

impl From<Value> for RawValuation {
    fn from(value: Value) -> Self {
        match value {
            Value::Number(n) => n.as_f64().map(RawValuation::Number).unwrap_or(RawValuation::Absent),
            Value::String(s) => RawValuation::Text(s),
            Value::Object(map) => RawValuation::Nested(
                map.into_iter().map(|(k, v)| (k, RawValuation::from(v))).collect(),
            ),
            Value::Null | Value::Bool(_) | Value::Array(_) => RawValuation::Absent,
        }
    }
}

impl From<RawValuation> for Value {
    fn from(raw: RawValuation) -> Self {
        match raw {
            RawValuation::Number(n) => serde_json::Number::from_f64(n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            RawValuation::Text(s) => Value::String(s),
            RawValuation::Nested(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
            RawValuation::Absent => Value::Null,
        }
    }
}

impl From<&str> for RawValuation {
    fn from(s: &str) -> Self {
        RawValuation::Text(s.to_string())
    }
}

impl From<f64> for RawValuation {
    fn from(n: f64) -> Self {
        RawValuation::Number(n)
    }
}

/// Source name → raw reading, captured either before or after an
/// automation run. Immutable once captured.
///
/// Keys iterate in lexicographic order, which makes every downstream
/// "first encountered" tie-break deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValuationSnapshot {
    sources: BTreeMap<String, RawValuation>,
}

impl ValuationSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly for tests and demo data.
    pub fn with(mut self, source: &str, raw: impl Into<RawValuation>) -> Self {
        self.sources.insert(source.to_string(), raw.into());
        self
    }

    /// Parse the stored JSON text of a snapshot.
    /// A top-level value that is not an object yields an empty snapshot.
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Ok(match value {
            Value::Object(map) => Self {
                sources: map.into_iter().map(|(k, v)| (k, RawValuation::from(v))).collect(),
            },
            _ => Self::default(),
        })
    }

    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn get(&self, source: &str) -> Option<&RawValuation> {
        self.sources.get(source)
    }

    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

}

impl FromIterator<(String, RawValuation)> for ValuationSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, RawValuation)>>(iter: I) -> Self {
        Self { sources: iter.into_iter().collect() }
    }
}

fn currency_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"-?\d[\d,]*(?:\.\d+)?").expect("currency pattern is valid"))
}

/// Reduces raw readings to amounts.
#[derive(Debug, Clone)]
pub struct ValueResolver {
    priority_keys: Vec<String>,
}

impl ValueResolver {
    pub fn new(config: &InsightConfig) -> Self {
        Self { priority_keys: config.priority_keys.clone() }
    }

    /// Resolve a raw reading. Zero is treated as "no value": a $0 book
    /// value is never a real quote.
    pub fn resolve(&self, raw: &RawValuation) -> Option<Amount> {
        match raw {
            RawValuation::Number(n) => non_zero(*n),
            RawValuation::Text(s) => parse_currency(s),
            RawValuation::Nested(map) => self.resolve_nested(map),
            RawValuation::Absent => None,
        }
    }

    /// Resolve an optional reading; a missing source is absent.
    pub fn resolve_opt(&self, raw: Option<&RawValuation>) -> Option<Amount> {
        raw.and_then(|r| self.resolve(r))
    }

    fn resolve_nested(&self, map: &IndexMap<String, RawValuation>) -> Option<Amount> {
        for key in &self.priority_keys {
            if let Some(resolved) = map.get(key).and_then(|v| self.resolve(v)) {
                return Some(resolved);
            }
        }

        // Remaining keys in document order. Pre-computed deltas would
        // double count the move.
        map.iter()
            .filter(|(key, _)| !self.priority_keys.contains(key))
            .filter(|(key, _)| !key.to_lowercase().contains("difference"))
            .find_map(|(_, v)| self.resolve(v))
    }
}

/// Parse "$25,000", "-$1,250.50", "25000" and friends.
/// Returns the first signed decimal number found, or `None`.
pub fn parse_currency(text: &str) -> Option<Amount> {
    let cleaned: String = text.trim().chars().filter(|c| *c != '$').collect();
    if cleaned.is_empty() {
        return None;
    }
    let found = currency_pattern().find(&cleaned)?;
    let digits = found.as_str().replace(',', "");
    digits.parse::<f64>().ok().and_then(non_zero)
}

fn non_zero(n: f64) -> Option<Amount> {
    if n == 0.0 || !n.is_finite() {
        None
    } else {
        Some(n)
    }
}
