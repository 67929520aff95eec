//! Dashboard statistics: one request, end to end.
//!
//! principal + optional store
//!   → AccessScopeResolver → StoreScope
//!   → QueryFilter (+ period range)
//!   → RecordSource::fetch
//!   → PeriodAggregator
//!
//! RULES:
//!   - The record source is an explicit dependency; there is no global store.
//!   - Only records with book values on both sides reach the aggregator.
//!   - Every read, including single-vehicle lookups, goes through the
//!     scoped filter.
//!   - Fetch failures propagate unchanged. No retry, no cache.

use crate::{
    access::{AccessPrincipal, AccessScopeResolver, StoreScope},
    config::InsightConfig,
    error::InsightResult,
    period::Period,
    period_aggregator::{AttributedRecord, PeriodAggregator, PeriodInsight},
    query::{DateRange, Page, QueryFilter},
    record::{RecordSource, VehicleValuationRecord},
    record_insight::{RecordInsight, RecordInsightCalculator},
    types::RecordId,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Largest recent-activity feed a caller may request.
pub const MAX_ACTIVITY_ITEMS: usize = 50;

/// An aggregate together with the scope and window that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopedInsight {
    pub period: Period,
    pub range: DateRange,
    pub scope: StoreScope,
    pub insight: PeriodInsight,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSaved {
    pub total_minutes: u64,
    pub formatted: String,
}

impl TimeSaved {
    /// Manual handling time avoided: `count` vehicles × `minutes_per_vehicle`.
    pub fn from_vehicle_count(count: u64, minutes_per_vehicle: u64) -> Self {
        let total_minutes = count.saturating_mul(minutes_per_vehicle);
        let hours = total_minutes / 60;
        let minutes = total_minutes % 60;
        let formatted = if hours > 0 {
            format!("{hours} {} {minutes} {}", plural(hours, "HOUR"), plural(minutes, "MINUTE"))
        } else {
            format!("{minutes} {}", plural(minutes, "MINUTE"))
        };
        Self { total_minutes, formatted }
    }
}

fn plural(n: u64, unit: &str) -> String {
    if n == 1 {
        unit.to_string()
    } else {
        format!("{unit}S")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStatistics {
    pub scope: StoreScope,
    pub total_vehicles: usize,
    pub successful_processing: usize,
    /// Percent, 0.0 when there are no vehicles.
    pub success_rate: f64,
    pub descriptions_updated: usize,
    pub total_features_marked: u64,
    pub avg_features_per_vehicle: f64,
    pub no_fear_certificates: usize,
    /// Records processed within the last `recent_activity_days`, counted
    /// back from `now` to the same time of day.
    pub recent_activity: usize,
    pub mtd: PeriodInsight,
    pub ytd: PeriodInsight,
    pub time_saved: TimeSaved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub pages: usize,
    pub has_prev: bool,
    pub has_next: bool,
}

impl Pagination {
    pub fn new(page: Page, total: usize) -> Self {
        Self {
            page: page.number,
            per_page: page.per_page,
            total,
            pages: total.div_ceil(page.per_page.max(1)),
            has_prev: page.number > 1,
            has_next: page.number.saturating_mul(page.per_page) < total,
        }
    }
}

/// One page of the scoped vehicle listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehiclePage {
    pub scope: StoreScope,
    pub vehicles: Vec<VehicleValuationRecord>,
    pub pagination: Pagination,
}

/// A single vehicle with what automation changed on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleInsight {
    pub record: VehicleValuationRecord,
    pub insight: RecordInsight,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityItem {
    pub id: Option<RecordId>,
    pub stock_number: String,
    pub store_id: String,
    pub processing_date: DateTime<Utc>,
    pub time_ago: String,
    pub description: String,
}

impl ActivityItem {
    fn from_record(record: &VehicleValuationRecord, now: DateTime<Utc>) -> Self {
        Self {
            id: record.id,
            stock_number: record.stock_number.clone(),
            store_id: record.store_id.clone(),
            processing_date: record.processing_date,
            time_ago: time_ago(record.processing_date, now),
            description: activity_description(record),
        }
    }
}

/// "3 days ago", "2 hours ago", "5 minutes ago", "Just now".
pub fn time_ago(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(at);
    let days = elapsed.num_days();
    if days > 0 {
        return format!("{days} day{} ago", if days == 1 { "" } else { "s" });
    }
    let seconds = elapsed.num_seconds();
    if seconds > 3600 {
        let hours = seconds / 3600;
        format!("{hours} hour{} ago", if hours == 1 { "" } else { "s" })
    } else if seconds > 60 {
        let minutes = seconds / 60;
        format!("{minutes} minute{} ago", if minutes == 1 { "" } else { "s" })
    } else {
        "Just now".to_string()
    }
}

/// "Vehicle #A0001 processed, updated description, marked 4 features".
fn activity_description(record: &VehicleValuationRecord) -> String {
    let mut parts = vec![if record.processing_successful {
        "processed".to_string()
    } else {
        "failed to process".to_string()
    }];
    if record.description_updated {
        parts.push("updated description".to_string());
    }
    if record.marked_features_count > 0 {
        parts.push(format!("marked {} features", record.marked_features_count));
    }
    if record.no_fear_certificate {
        parts.push("NO FEAR certified".to_string());
    }
    format!("Vehicle #{} {}", record.stock_number, parts.join(", "))
}

pub struct Dashboard<S: RecordSource> {
    source: S,
    config: InsightConfig,
    calculator: RecordInsightCalculator,
    aggregator: PeriodAggregator,
}

impl<S: RecordSource> Dashboard<S> {
    pub fn new(source: S, config: InsightConfig) -> Self {
        let calculator = RecordInsightCalculator::new(&config);
        let aggregator = PeriodAggregator::new(&config);
        Self {
            source,
            config,
            calculator,
            aggregator,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn scope_for(&self, principal: &AccessPrincipal, explicit_store: Option<&str>) -> StoreScope {
        let scope = AccessScopeResolver::resolve(principal, explicit_store);
        log::debug!(
            "Resolved scope for {}: {} (unrestricted={})",
            principal.role,
            scope.stores.iter().cloned().collect::<Vec<_>>().join(","),
            scope.is_unrestricted()
        );
        scope
    }

    /// Aggregate records the caller already holds. Records without book
    /// values on both sides are skipped.
    pub fn aggregate_records(&self, records: &[VehicleValuationRecord]) -> PeriodInsight {
        let eligible: Vec<AttributedRecord<'_>> = records
            .iter()
            .filter(|r| r.has_book_values())
            .map(VehicleValuationRecord::as_attributed)
            .collect();
        self.aggregator.aggregate(&eligible)
    }

    pub fn period_insight(
        &self,
        principal: &AccessPrincipal,
        explicit_store: Option<&str>,
        period: Period,
        now: DateTime<Utc>,
    ) -> InsightResult<ScopedInsight> {
        let scope = self.scope_for(principal, explicit_store);
        self.period_insight_in(scope, period, now)
    }

    fn period_insight_in(
        &self,
        scope: StoreScope,
        period: Period,
        now: DateTime<Utc>,
    ) -> InsightResult<ScopedInsight> {
        let range = period.range(now);
        let filter = QueryFilter::build(&scope, Some(range)).processed_only();
        let records = self.source.fetch(&filter)?;
        let insight = self.aggregate_records(&records);
        log::debug!("{} insight: {}", period.label(), insight.summary);
        Ok(ScopedInsight { period, range, scope, insight })
    }

    /// Scoped listing, most recent first. `search` matches part of the
    /// stock number, ignoring case; blank means no search.
    pub fn list_vehicles(
        &self,
        principal: &AccessPrincipal,
        explicit_store: Option<&str>,
        search: &str,
        page: Page,
    ) -> InsightResult<VehiclePage> {
        let scope = self.scope_for(principal, explicit_store);
        let filter = QueryFilter::build(&scope, None).with_stock_search(search);
        let total = self.source.count(&filter)?;
        let vehicles = self.source.fetch(&filter.with_page(page))?;
        Ok(VehiclePage {
            scope,
            vehicles,
            pagination: Pagination::new(page, total),
        })
    }

    /// One vehicle by id. `None` when it does not exist or belongs to a
    /// store outside the principal's scope; the two cases are not
    /// distinguished.
    pub fn vehicle_insight(
        &self,
        principal: &AccessPrincipal,
        explicit_store: Option<&str>,
        id: RecordId,
    ) -> InsightResult<Option<VehicleInsight>> {
        let scope = self.scope_for(principal, explicit_store);
        let filter = QueryFilter::build(&scope, None).with_record_id(id);
        let record = self.source.fetch(&filter)?.into_iter().next();
        Ok(record.map(|record| {
            let insight = self.calculator.compute(&record.before, &record.after);
            VehicleInsight { record, insight }
        }))
    }

    /// The `limit` most recent records in scope, capped at
    /// `MAX_ACTIVITY_ITEMS`.
    pub fn recent_activity(
        &self,
        principal: &AccessPrincipal,
        explicit_store: Option<&str>,
        limit: usize,
        now: DateTime<Utc>,
    ) -> InsightResult<Vec<ActivityItem>> {
        let scope = self.scope_for(principal, explicit_store);
        let page = Page::first(limit.clamp(1, MAX_ACTIVITY_ITEMS));
        let records = self.source.fetch(&QueryFilter::build(&scope, None).with_page(page))?;
        Ok(records.iter().map(|r| ActivityItem::from_record(r, now)).collect())
    }

    pub fn statistics(
        &self,
        principal: &AccessPrincipal,
        explicit_store: Option<&str>,
        now: DateTime<Utc>,
    ) -> InsightResult<DashboardStatistics> {
        let scope = self.scope_for(principal, explicit_store);
        let records = self.source.fetch(&QueryFilter::build(&scope, None))?;

        let total_vehicles = records.len();
        let successful_processing = records.iter().filter(|r| r.processing_successful).count();
        let descriptions_updated = records.iter().filter(|r| r.description_updated).count();
        let total_features_marked: u64 =
            records.iter().map(|r| u64::from(r.marked_features_count)).sum();
        let no_fear_certificates = records.iter().filter(|r| r.no_fear_certificate).count();

        let recent_since = now - Duration::days(self.config.recent_activity_days.max(0));
        let recent_activity = records
            .iter()
            .filter(|r| r.processing_date >= recent_since)
            .count();

        let (success_rate, avg_features_per_vehicle) = if total_vehicles > 0 {
            (
                successful_processing as f64 / total_vehicles as f64 * 100.0,
                total_features_marked as f64 / total_vehicles as f64,
            )
        } else {
            (0.0, 0.0)
        };

        let mtd = self.period_insight_in(scope.clone(), Period::MonthToDate, now)?.insight;
        let ytd = self.period_insight_in(scope.clone(), Period::YearToDate, now)?.insight;

        Ok(DashboardStatistics {
            scope,
            total_vehicles,
            successful_processing,
            success_rate,
            descriptions_updated,
            total_features_marked,
            avg_features_per_vehicle,
            no_fear_certificates,
            recent_activity,
            mtd,
            ytd,
            time_saved: TimeSaved::from_vehicle_count(
                successful_processing as u64,
                self.config.minutes_per_vehicle,
            ),
        })
    }
}
