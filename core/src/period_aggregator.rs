//! Period aggregation: folds per-record insights into one summary.
//!
//! The aggregator has no notion of month or year. Month-to-date and
//! year-to-date are two record selections made by the caller.
//!
//! Two figures are kept separate:
//!   - `total_difference` sums each record's PRIMARY-source difference
//!     (one attributed figure per vehicle).
//!   - `categories` sums EVERY comparable source across all records,
//!     for the per-source breakdown.
//!
//! The fold is expressed as an accumulator with an associative and
//! commutative `merge`, so large record sets can be split across rayon
//! workers and recombined in any order. Best-improvement ties resolve
//! to the earliest (record position, source name) pair, which is the
//! same answer the sequential fold gives.

use crate::{
    config::InsightConfig,
    record_insight::{format_dollars, RecordInsightCalculator},
    types::{Amount, SourceName},
    valuation::ValuationSnapshot,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One record as seen by the aggregator.
#[derive(Debug, Clone)]
pub struct AttributedRecord<'a> {
    /// Vehicle / stock label used when this record is credited.
    pub attribution: String,
    pub before: &'a ValuationSnapshot,
    pub after: &'a ValuationSnapshot,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotals {
    pub difference: Amount,
    pub before_total: Amount,
    pub after_total: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestImprovement {
    pub source: SourceName,
    pub amount: Amount,
    pub attribution: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodInsight {
    pub record_count: usize,
    pub total_difference: Amount,
    pub categories: BTreeMap<SourceName, CategoryTotals>,
    /// Largest positive move; if nothing improved, the largest move of
    /// either sign. `None` when no comparable move exists at all.
    pub best_improvement: Option<BestImprovement>,
    pub summary: String,
}

impl PeriodInsight {
    pub fn empty() -> Self {
        Self {
            record_count: 0,
            total_difference: 0.0,
            categories: BTreeMap::new(),
            best_improvement: None,
            summary: period_summary(0, 0.0),
        }
    }
}

/// Headline phrasing for a period.
pub fn period_summary(record_count: usize, total: Amount) -> String {
    if record_count == 0 {
        "No data available".to_string()
    } else if total > 0.0 {
        format!("${} total increase", format_dollars(total))
    } else if total < 0.0 {
        format!("${} total decrease", format_dollars(total))
    } else {
        "No value changes detected".to_string()
    }
}

// ── Accumulator ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    /// (record position, source position within the record).
    position: (usize, usize),
    source: SourceName,
    amount: Amount,
    attribution: String,
}

impl Candidate {
    /// `self` wins over `other` under the ranking `key`; earlier position breaks ties.
    fn beats(&self, other: &Candidate, key: fn(Amount) -> Amount) -> bool {
        let (a, b) = (key(self.amount), key(other.amount));
        a > b || (a == b && self.position < other.position)
    }
}

fn pick(a: Option<Candidate>, b: Option<Candidate>, key: fn(Amount) -> Amount) -> Option<Candidate> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if b.beats(&a, key) { b } else { a }),
        (a, None) => a,
        (None, b) => b,
    }
}

#[derive(Debug, Clone, Default)]
struct PeriodAccumulator {
    record_count: usize,
    total_difference: Amount,
    categories: BTreeMap<SourceName, CategoryTotals>,
    best_positive: Option<Candidate>,
    most_notable: Option<Candidate>,
}

impl PeriodAccumulator {
    fn add(mut self, calc: &RecordInsightCalculator, position: usize, record: &AttributedRecord<'_>) -> Self {
        let insight = calc.compute(record.before, record.after);

        self.record_count += 1;
        self.total_difference += insight.total_difference;

        for (source_pos, diff) in insight.differences.iter().enumerate() {
            let totals = self.categories.entry(diff.source.clone()).or_default();
            totals.difference += diff.difference;
            totals.before_total += diff.before;
            totals.after_total += diff.after;

            if diff.difference == 0.0 {
                continue;
            }
            let candidate = Candidate {
                position: (position, source_pos),
                source: diff.source.clone(),
                amount: diff.difference,
                attribution: record.attribution.clone(),
            };
            if diff.difference > 0.0 {
                self.best_positive = pick(self.best_positive.take(), Some(candidate.clone()), identity);
            }
            self.most_notable = pick(self.most_notable.take(), Some(candidate), f64::abs);
        }
        self
    }

    fn merge(mut self, other: Self) -> Self {
        self.record_count += other.record_count;
        self.total_difference += other.total_difference;
        for (source, totals) in other.categories {
            let mine = self.categories.entry(source).or_default();
            mine.difference += totals.difference;
            mine.before_total += totals.before_total;
            mine.after_total += totals.after_total;
        }
        self.best_positive = pick(self.best_positive, other.best_positive, identity);
        self.most_notable = pick(self.most_notable, other.most_notable, f64::abs);
        self
    }

    fn finish(self, noise_threshold: f64) -> PeriodInsight {
        let categories: BTreeMap<_, _> = self
            .categories
            .into_iter()
            .filter(|(_, totals)| totals.difference.abs() > noise_threshold)
            .collect();

        let best_improvement = self.best_positive.or(self.most_notable).map(|c| BestImprovement {
            source: c.source,
            amount: c.amount,
            attribution: c.attribution,
        });

        PeriodInsight {
            summary: period_summary(self.record_count, self.total_difference),
            record_count: self.record_count,
            total_difference: self.total_difference,
            categories,
            best_improvement,
        }
    }
}

fn identity(amount: Amount) -> Amount {
    amount
}

// ── Aggregator ───────────────────────────────────────────────────────────────

/// Stateless period aggregator. Calling `aggregate` twice on the same
/// input returns identical results.
#[derive(Debug, Clone)]
pub struct PeriodAggregator {
    calculator: RecordInsightCalculator,
    noise_threshold: f64,
    parallel_threshold: usize,
}

impl PeriodAggregator {
    pub fn new(config: &InsightConfig) -> Self {
        Self {
            calculator: RecordInsightCalculator::new(config),
            noise_threshold: config.noise_threshold,
            parallel_threshold: config.parallel_threshold,
        }
    }

    /// Aggregate a caller-selected record set. Large sets are fanned out
    /// across worker threads once they reach the configured threshold.
    pub fn aggregate(&self, records: &[AttributedRecord<'_>]) -> PeriodInsight {
        if self.parallel_threshold > 0 && records.len() >= self.parallel_threshold {
            self.aggregate_parallel(records)
        } else {
            self.aggregate_sequential(records)
        }
    }

    pub fn aggregate_sequential(&self, records: &[AttributedRecord<'_>]) -> PeriodInsight {
        let acc = records
            .iter()
            .enumerate()
            .fold(PeriodAccumulator::default(), |acc, (pos, record)| {
                acc.add(&self.calculator, pos, record)
            });
        self.finish(acc)
    }

    pub fn aggregate_parallel(&self, records: &[AttributedRecord<'_>]) -> PeriodInsight {
        let acc = records
            .par_iter()
            .enumerate()
            .fold(PeriodAccumulator::default, |acc, (pos, record)| {
                acc.add(&self.calculator, pos, record)
            })
            .reduce(PeriodAccumulator::default, PeriodAccumulator::merge);
        self.finish(acc)
    }

    fn finish(&self, acc: PeriodAccumulator) -> PeriodInsight {
        let insight = acc.finish(self.noise_threshold);
        log::debug!(
            "Aggregated {} records: total={:.2}, {} categories",
            insight.record_count,
            insight.total_difference,
            insight.categories.len()
        );
        insight
    }
}
