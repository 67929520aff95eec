//! Vehicle valuation records and the record-source seam.

use crate::{
    error::InsightResult,
    period_aggregator::AttributedRecord,
    query::QueryFilter,
    types::{RecordId, StoreId},
    valuation::ValuationSnapshot,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One processed vehicle, with book values captured around the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleValuationRecord {
    /// `None` until persisted.
    pub id: Option<RecordId>,
    pub stock_number: String,
    pub vehicle_name: Option<String>,
    pub vin: Option<String>,
    pub store_id: StoreId,
    pub processing_date: DateTime<Utc>,
    pub processing_session_id: Option<String>,
    pub processing_successful: bool,
    pub description_updated: bool,
    pub marked_features_count: u32,
    pub no_fear_certificate: bool,
    /// Book values were captured for this record.
    pub processed: bool,
    pub before: ValuationSnapshot,
    pub after: ValuationSnapshot,
}

impl VehicleValuationRecord {
    pub fn new(stock_number: &str, store_id: &str, processing_date: DateTime<Utc>) -> Self {
        Self {
            id: None,
            stock_number: stock_number.to_string(),
            vehicle_name: None,
            vin: None,
            store_id: store_id.to_string(),
            processing_date,
            processing_session_id: None,
            processing_successful: true,
            description_updated: false,
            marked_features_count: 0,
            no_fear_certificate: false,
            processed: false,
            before: ValuationSnapshot::default(),
            after: ValuationSnapshot::default(),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.vehicle_name = Some(name.to_string());
        self
    }

    /// Attach book values and mark them processed.
    pub fn with_book_values(mut self, before: ValuationSnapshot, after: ValuationSnapshot) -> Self {
        self.before = before;
        self.after = after;
        self.processed = true;
        self
    }

    /// Processed, with a non-empty snapshot on both sides. Only these
    /// records feed period aggregates.
    pub fn has_book_values(&self) -> bool {
        self.processed && !self.before.is_empty() && !self.after.is_empty()
    }

    /// Label used when crediting a move to this vehicle.
    pub fn attribution_label(&self) -> String {
        match self.vehicle_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => format!("{name} ({})", self.stock_number),
            _ => format!("Stock #{}", self.stock_number),
        }
    }

    pub fn as_attributed(&self) -> AttributedRecord<'_> {
        AttributedRecord {
            attribution: self.attribution_label(),
            before: &self.before,
            after: &self.after,
        }
    }
}

/// The external record store. Implementations return matching records
/// most recent first and surface outages as errors; callers do not retry.
pub trait RecordSource {
    fn fetch(&self, filter: &QueryFilter) -> InsightResult<Vec<VehicleValuationRecord>>;

    /// Number of records matching `filter`, ignoring its page.
    fn count(&self, filter: &QueryFilter) -> InsightResult<usize> {
        Ok(self.fetch(&filter.unpaged())?.len())
    }
}

/// Plain in-memory source, handy for callers that already hold records.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    records: Vec<VehicleValuationRecord>,
}

impl InMemorySource {
    pub fn new(records: Vec<VehicleValuationRecord>) -> Self {
        Self { records }
    }
}

impl RecordSource for InMemorySource {
    fn fetch(&self, filter: &QueryFilter) -> InsightResult<Vec<VehicleValuationRecord>> {
        let mut matched: Vec<_> = self
            .records
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            b.processing_date
                .cmp(&a.processing_date)
                .then_with(|| b.id.cmp(&a.id))
        });
        if let Some(page) = filter.page {
            matched = matched
                .into_iter()
                .skip(page.offset())
                .take(page.limit())
                .collect();
        }
        Ok(matched)
    }
}
