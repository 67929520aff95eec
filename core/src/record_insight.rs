//! Per-record insight: what automation changed on one vehicle.
//!
//! For every source named in either snapshot:
//!   1. Resolve the before and after readings.
//!   2. Keep the source only if BOTH resolve to a positive amount.
//!   3. difference = after - before.
//!
//! RULE: step 2 is the single exclusion policy of the engine. A source
//! that goes from nothing (absent or $0) to a value is initial
//! merchandising, not an automation effect, and never produces a
//! `SourceDifference` anywhere, not only in the headline figures.

use crate::{
    config::InsightConfig,
    types::{Amount, SourceName},
    valuation::{ValuationSnapshot, ValueResolver},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDifference {
    pub source: SourceName,
    pub before: Amount,
    pub after: Amount,
    pub difference: Amount,
    pub improved: bool,
}

/// The single largest positive move on one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMove {
    pub source: SourceName,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordInsight {
    /// Comparable sources only, in source-name order.
    pub differences: Vec<SourceDifference>,
    /// The source this record's headline figure is attributed to.
    pub primary_source: Option<SourceName>,
    /// The primary source's difference, or 0.0 when nothing is comparable.
    pub total_difference: Amount,
    pub best_improvement: Option<SourceMove>,
    pub summary: String,
}

impl RecordInsight {
    pub fn difference_for(&self, source: &str) -> Option<&SourceDifference> {
        self.differences.iter().find(|d| d.source == source)
    }

    pub fn has_comparable_sources(&self) -> bool {
        !self.differences.is_empty()
    }
}

/// Computes `RecordInsight`s with a fixed resolver and attribution order.
#[derive(Debug, Clone)]
pub struct RecordInsightCalculator {
    resolver: ValueResolver,
    source_preference: Vec<SourceName>,
}

impl RecordInsightCalculator {
    pub fn new(config: &InsightConfig) -> Self {
        Self {
            resolver: ValueResolver::new(config),
            source_preference: config.source_preference().map(str::to_string).collect(),
        }
    }

    pub fn compute(&self, before: &ValuationSnapshot, after: &ValuationSnapshot) -> RecordInsight {
        let sources: BTreeSet<&str> = before
            .source_names()
            .chain(after.source_names())
            .filter(|name| !name.is_empty())
            .collect();

        let mut differences = Vec::new();
        // Strict `>` keeps the first source (in name order) on ties.
        let mut best_improvement: Option<SourceMove> = None;

        for source in sources {
            let before_val = self.resolver.resolve_opt(before.get(source));
            let after_val = self.resolver.resolve_opt(after.get(source));

            let (before_val, after_val) = match (before_val, after_val) {
                (Some(b), Some(a)) if b > 0.0 && a > 0.0 => (b, a),
                _ => continue,
            };

            let difference = after_val - before_val;
            if difference > 0.0
                && best_improvement.as_ref().map_or(true, |best| difference > best.amount)
            {
                best_improvement = Some(SourceMove { source: source.to_string(), amount: difference });
            }

            differences.push(SourceDifference {
                source: source.to_string(),
                before: before_val,
                after: after_val,
                difference,
                improved: difference > 0.0,
            });
        }

        let primary = self
            .source_preference
            .iter()
            .find_map(|preferred| differences.iter().find(|d| &d.source == preferred));

        let (primary_source, total_difference) = match primary {
            Some(d) => (Some(d.source.clone()), d.difference),
            None => (None, 0.0),
        };

        RecordInsight {
            summary: record_summary(total_difference),
            differences,
            primary_source,
            total_difference,
            best_improvement,
        }
    }
}

/// Headline phrasing for a single vehicle.
pub fn record_summary(total: Amount) -> String {
    if total > 0.0 {
        format!("${} increase found by automation", format_dollars(total))
    } else if total < 0.0 {
        format!("${} decrease found by automation", format_dollars(total))
    } else {
        "No value change detected".to_string()
    }
}

/// Whole dollars, absolute value, `,` thousands separators: 1234.6 → "1,235".
pub fn format_dollars(amount: Amount) -> String {
    let whole = amount.abs().round() as u64;
    let digits = whole.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dollars_are_grouped_by_thousands() {
        assert_eq!(format_dollars(0.0), "0");
        assert_eq!(format_dollars(999.4), "999");
        assert_eq!(format_dollars(1_300.0), "1,300");
        assert_eq!(format_dollars(-1_234_567.8), "1,234,568");
    }

    #[test]
    fn summary_follows_sign() {
        assert_eq!(record_summary(1_300.0), "$1,300 increase found by automation");
        assert_eq!(record_summary(-250.0), "$250 decrease found by automation");
        assert_eq!(record_summary(0.0), "No value change detected");
    }
}
