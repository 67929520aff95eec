//! Reporting windows: record selections fed to the aggregator.
//!
//! The aggregator never sees these; a period only decides which
//! records are fetched.

use crate::query::DateRange;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    MonthToDate,
    YearToDate,
}

impl Period {
    pub fn label(&self) -> &'static str {
        match self {
            Period::MonthToDate => "MTD",
            Period::YearToDate => "YTD",
        }
    }

    /// First day of the window through `now`'s date, inclusive.
    pub fn range(&self, now: DateTime<Utc>) -> DateRange {
        let today = now.date_naive();
        let start = match self {
            Period::MonthToDate => today.with_day(1),
            Period::YearToDate => NaiveDate::from_ymd_opt(today.year(), 1, 1),
        }
        .unwrap_or(today);
        DateRange::ordered(start, today)
    }
}
