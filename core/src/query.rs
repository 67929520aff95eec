//! Scoped query filters handed to the record source.
//!
//! RULE: a non-super scope with no stores becomes `StoreFilter::MatchNothing`,
//! never "no filter". A misconfigured account sees an empty result, not
//! every store's data.

use crate::{
    access::StoreScope,
    error::{InsightError, InsightResult},
    record::VehicleValuationRecord,
    types::{RecordId, StoreId},
};
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Calendar-day range; both ends inclusive, the end through 23:59:59.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> InsightResult<Self> {
        if start > end {
            return Err(InsightError::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// For callers that derive `start` from `end` and so cannot invert them.
    pub(crate) fn ordered(start: NaiveDate, end: NaiveDate) -> Self {
        debug_assert!(start <= end, "ordered() called with start after end");
        Self { start, end }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// First instant inside the range.
    pub fn start_instant(&self) -> DateTime<Utc> {
        self.start.and_time(NaiveTime::MIN).and_utc()
    }

    /// First instant after the range (midnight following `end`).
    pub fn end_exclusive(&self) -> DateTime<Utc> {
        self.end
            .checked_add_days(Days::new(1))
            .map(|d| d.and_time(NaiveTime::MIN).and_utc())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start_instant() && at < self.end_exclusive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "stores", rename_all = "snake_case")]
pub enum StoreFilter {
    /// No store restriction (SuperAdmin without an explicit store).
    Any,
    In(BTreeSet<StoreId>),
    /// Explicit empty result.
    MatchNothing,
}

/// Largest page a listing may request.
pub const MAX_PER_PAGE: usize = 100;

/// One page of a most-recent-first listing. Page numbers start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub number: usize,
    pub per_page: usize,
}

impl Page {
    /// Out-of-range input is clamped: page 0 becomes 1 and `per_page`
    /// is kept within 1..=MAX_PER_PAGE.
    pub fn new(number: usize, per_page: usize) -> Self {
        Self {
            number: number.max(1),
            per_page: per_page.clamp(1, MAX_PER_PAGE),
        }
    }

    /// The first `limit` records.
    pub fn first(limit: usize) -> Self {
        Self::new(1, limit)
    }

    pub fn offset(&self) -> usize {
        self.number.saturating_sub(1).saturating_mul(self.per_page)
    }

    pub fn limit(&self) -> usize {
        self.per_page
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFilter {
    pub stores: StoreFilter,
    pub date_range: Option<DateRange>,
    /// Only processed records with book values captured on both sides.
    pub processed_only: bool,
    /// Case-insensitive substring of the stock number.
    pub stock_search: Option<String>,
    pub record_id: Option<RecordId>,
    /// Applied after ordering; `None` returns every match.
    pub page: Option<Page>,
}

impl QueryFilter {
    /// Combine a resolved scope with an optional date range.
    pub fn build(scope: &StoreScope, date_range: Option<DateRange>) -> Self {
        let stores = if !scope.stores.is_empty() {
            StoreFilter::In(scope.stores.clone())
        } else if scope.role.is_super_admin() {
            StoreFilter::Any
        } else {
            StoreFilter::MatchNothing
        };
        log::debug!("Built filter for {}: {stores:?}, range={date_range:?}", scope.role);
        Self {
            stores,
            date_range,
            processed_only: false,
            stock_search: None,
            record_id: None,
            page: None,
        }
    }

    pub fn processed_only(mut self) -> Self {
        self.processed_only = true;
        self
    }

    /// Blank search text leaves the filter unchanged.
    pub fn with_stock_search(mut self, search: &str) -> Self {
        let search = search.trim();
        self.stock_search = (!search.is_empty()).then(|| search.to_string());
        self
    }

    pub fn with_record_id(mut self, id: RecordId) -> Self {
        self.record_id = Some(id);
        self
    }

    pub fn with_page(mut self, page: Page) -> Self {
        self.page = Some(page);
        self
    }

    /// The same filter without paging, for counting every match.
    pub fn unpaged(&self) -> Self {
        Self {
            page: None,
            ..self.clone()
        }
    }

    pub fn matches_nothing(&self) -> bool {
        matches!(self.stores, StoreFilter::MatchNothing)
    }

    /// In-memory evaluation; record sources may use this directly.
    /// Paging is not part of matching.
    pub fn matches(&self, record: &VehicleValuationRecord) -> bool {
        let store_ok = match &self.stores {
            StoreFilter::Any => true,
            StoreFilter::In(stores) => stores.contains(&record.store_id),
            StoreFilter::MatchNothing => false,
        };
        let search_ok = self.stock_search.as_deref().map_or(true, |needle| {
            record
                .stock_number
                .to_lowercase()
                .contains(&needle.to_lowercase())
        });
        store_ok
            && search_ok
            && self.record_id.map_or(true, |id| record.id == Some(id))
            && self.date_range.map_or(true, |r| r.contains(record.processing_date))
            && (!self.processed_only || record.has_book_values())
    }
}
