//! Dashboard tests: scope resolution, period selection and statistics
//! wired together over both record sources.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::cell::Cell;
use valuation_core::{
    access::{AccessPrincipal, Role},
    config::InsightConfig,
    dashboard::Dashboard,
    demo,
    error::{InsightError, InsightResult},
    period::Period,
    query::{Page, QueryFilter, StoreFilter},
    record::{InMemorySource, RecordSource, VehicleValuationRecord},
    store::VehicleStore,
    valuation::ValuationSnapshot,
};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
}

fn on(month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, month, day, 9, 30, 0).unwrap()
}

fn kbb(stock: &str, store: &str, when: DateTime<Utc>, before: f64, after: f64) -> VehicleValuationRecord {
    VehicleValuationRecord::new(stock, store, when).with_book_values(
        ValuationSnapshot::new().with("KBB", before),
        ValuationSnapshot::new().with("KBB", after),
    )
}

/// North: one MTD move, one earlier-in-year move, one unprocessed and one
/// failed run. South: one MTD drop.
fn fixture_records() -> Vec<VehicleValuationRecord> {
    let mut failed = VehicleValuationRecord::new("F1", "north", on(10, 15));
    failed.processing_successful = false;

    let mut pilot = kbb("P1", "north", on(10, 10), 15_500.0, 16_800.0).with_name("2019 Honda Pilot");
    pilot.marked_features_count = 6;
    pilot.description_updated = true;
    pilot.no_fear_certificate = true;

    let mut unprocessed = VehicleValuationRecord::new("U1", "north", on(10, 14));
    unprocessed.marked_features_count = 2;

    vec![
        pilot,
        kbb("S1", "south", on(10, 12), 20_000.0, 19_500.0),
        kbb("Y1", "north", on(3, 4), 10_000.0, 12_000.0),
        unprocessed,
        failed,
    ]
}

fn in_memory_dashboard() -> Dashboard<InMemorySource> {
    Dashboard::new(InMemorySource::new(fixture_records()), InsightConfig::default_test())
}

fn sqlite_dashboard() -> Dashboard<VehicleStore> {
    let store = VehicleStore::in_memory().unwrap();
    store.migrate().unwrap();
    for record in fixture_records() {
        store.insert_record(&record).unwrap();
    }
    Dashboard::new(store, InsightConfig::default_test())
}

fn stock_numbers(records: &[VehicleValuationRecord]) -> Vec<&str> {
    records.iter().map(|r| r.stock_number.as_str()).collect()
}

fn north_user() -> AccessPrincipal {
    AccessPrincipal::new(Role::User, ["north"])
}

/// Record source whose backend is down.
struct OfflineSource {
    calls: Cell<usize>,
}

impl RecordSource for OfflineSource {
    fn fetch(&self, _filter: &QueryFilter) -> InsightResult<Vec<VehicleValuationRecord>> {
        self.calls.set(self.calls.get() + 1);
        Err(InsightError::Upstream {
            reason: "connection refused".into(),
        })
    }
}

/// Record source that remembers the filters it was handed.
struct RecordingSource {
    inner: InMemorySource,
    seen: std::cell::RefCell<Vec<QueryFilter>>,
}

impl RecordSource for RecordingSource {
    fn fetch(&self, filter: &QueryFilter) -> InsightResult<Vec<VehicleValuationRecord>> {
        self.seen.borrow_mut().push(filter.clone());
        self.inner.fetch(filter)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn user_month_to_date_sees_only_assigned_store() {
    let dashboard = in_memory_dashboard();
    let scoped = dashboard
        .period_insight(&north_user(), None, Period::MonthToDate, now())
        .unwrap();

    assert_eq!(scoped.scope.stores.len(), 1);
    assert!(scoped.scope.allows("north"));
    assert_eq!(scoped.insight.record_count, 1);
    assert_eq!(scoped.insight.total_difference, 1300.0);
    assert_eq!(scoped.insight.summary, "$1,300 total increase");

    let best = scoped.insight.best_improvement.unwrap();
    assert_eq!(best.source, "KBB");
    assert_eq!(best.amount, 1300.0);
    assert_eq!(best.attribution, "2019 Honda Pilot (P1)");
}

#[test]
fn year_to_date_includes_earlier_months() {
    let dashboard = in_memory_dashboard();
    let scoped = dashboard
        .period_insight(&north_user(), None, Period::YearToDate, now())
        .unwrap();

    assert_eq!(scoped.insight.record_count, 2);
    assert_eq!(scoped.insight.total_difference, 3300.0);
    let best = scoped.insight.best_improvement.unwrap();
    assert_eq!(best.amount, 2000.0);
    assert_eq!(best.attribution, "Stock #Y1");
}

#[test]
fn unassigned_override_falls_back_to_assigned_stores() {
    let dashboard = in_memory_dashboard();
    let scoped = dashboard
        .period_insight(&north_user(), Some("south"), Period::MonthToDate, now())
        .unwrap();
    assert!(!scoped.scope.allows("south"));
    assert_eq!(scoped.insight.total_difference, 1300.0);
}

#[test]
fn super_admin_without_store_sees_everything() {
    let dashboard = in_memory_dashboard();
    let scoped = dashboard
        .period_insight(&AccessPrincipal::super_admin(), None, Period::MonthToDate, now())
        .unwrap();

    assert!(scoped.scope.is_unrestricted());
    assert_eq!(scoped.insight.record_count, 2);
    assert_eq!(scoped.insight.total_difference, 800.0);
    assert_eq!(scoped.insight.best_improvement.unwrap().amount, 1300.0);
}

#[test]
fn super_admin_store_override_reports_a_decrease() {
    let dashboard = in_memory_dashboard();
    let scoped = dashboard
        .period_insight(&AccessPrincipal::super_admin(), Some("south"), Period::MonthToDate, now())
        .unwrap();

    assert_eq!(scoped.insight.summary, "$500 total decrease");
    let best = scoped.insight.best_improvement.unwrap();
    assert_eq!(best.amount, -500.0);
    assert_eq!(best.attribution, "Stock #S1");
}

#[test]
fn admin_without_stores_sees_nothing() {
    let source = RecordingSource {
        inner: InMemorySource::new(fixture_records()),
        seen: Default::default(),
    };
    let dashboard = Dashboard::new(source, InsightConfig::default_test());
    let admin = AccessPrincipal::new(Role::Admin, Vec::<String>::new());

    let stats = dashboard.statistics(&admin, None, now()).unwrap();
    assert!(stats.scope.sees_nothing());
    assert_eq!(stats.total_vehicles, 0);
    assert_eq!(stats.success_rate, 0.0);
    assert_eq!(stats.avg_features_per_vehicle, 0.0);
    assert_eq!(stats.mtd.summary, "No data available");
    assert_eq!(stats.ytd.summary, "No data available");
    assert_eq!(stats.time_saved.formatted, "0 MINUTES");

    let seen = dashboard.source().seen.borrow();
    assert!(!seen.is_empty());
    assert!(seen.iter().all(|f| f.stores == StoreFilter::MatchNothing));
}

#[test]
fn statistics_count_every_record_in_scope() {
    for stats in [
        in_memory_dashboard().statistics(&north_user(), None, now()).unwrap(),
        sqlite_dashboard().statistics(&north_user(), None, now()).unwrap(),
    ] {
        assert_eq!(stats.total_vehicles, 4);
        assert_eq!(stats.successful_processing, 3);
        assert_eq!(stats.success_rate, 75.0);
        assert_eq!(stats.descriptions_updated, 1);
        assert_eq!(stats.total_features_marked, 8);
        assert_eq!(stats.avg_features_per_vehicle, 2.0);
        assert_eq!(stats.no_fear_certificates, 1);
        // Oct 10, 14 and 15 fall inside the trailing week.
        assert_eq!(stats.recent_activity, 3);
        assert_eq!(stats.mtd.total_difference, 1300.0);
        assert_eq!(stats.ytd.total_difference, 3300.0);
        assert_eq!(stats.time_saved.total_minutes, 33);
        assert_eq!(stats.time_saved.formatted, "33 MINUTES");
    }
}

#[test]
fn unprocessed_records_never_reach_the_aggregator() {
    let dashboard = in_memory_dashboard();
    let insight = dashboard.aggregate_records(&fixture_records());
    assert_eq!(insight.record_count, 3);
    assert_eq!(insight.total_difference, 2800.0);
}

#[test]
fn upstream_failure_propagates_without_retry() {
    let dashboard = Dashboard::new(
        OfflineSource { calls: Cell::new(0) },
        InsightConfig::default_test(),
    );
    let err = dashboard
        .period_insight(&north_user(), None, Period::MonthToDate, now())
        .unwrap_err();
    assert!(matches!(err, InsightError::Upstream { .. }));
    assert_eq!(dashboard.source().calls.get(), 1);

    let err = dashboard.statistics(&north_user(), None, now()).unwrap_err();
    assert!(err.to_string().contains("connection refused"));
    assert_eq!(dashboard.source().calls.get(), 2);
}

#[test]
fn demo_data_agrees_across_record_sources() {
    let stores = vec!["north".to_string(), "south".to_string()];
    let records = demo::generate_records(42, 60, &stores, now());

    let store = VehicleStore::in_memory().unwrap();
    store.migrate().unwrap();
    for record in &records {
        store.insert_record(record).unwrap();
    }
    assert_eq!(store.record_count().unwrap(), 120);

    let sqlite = Dashboard::new(store, InsightConfig::default_test());
    let memory = Dashboard::new(InMemorySource::new(records.clone()), InsightConfig::default_test());
    let admin = AccessPrincipal::super_admin();

    let a = sqlite.statistics(&admin, None, now()).unwrap();
    let b = memory.statistics(&admin, None, now()).unwrap();
    assert_eq!(a.total_vehicles, 120);
    assert_eq!(a.total_vehicles, b.total_vehicles);
    assert_eq!(a.successful_processing, b.successful_processing);
    assert_eq!(a.recent_activity, b.recent_activity);
    assert_eq!(a.mtd.record_count, b.mtd.record_count);
    assert_eq!(a.ytd.record_count, b.ytd.record_count);
    assert_eq!(a.ytd.total_difference, b.ytd.total_difference);
    assert_eq!(a.ytd.categories, b.ytd.categories);

    let with_book_values = records.iter().filter(|r| r.has_book_values()).count();
    assert!(a.mtd.record_count <= a.ytd.record_count);
    assert_eq!(a.ytd.record_count, with_book_values);
    assert!(records.iter().all(|r| r.processing_date > now() - Duration::days(90)));
}

#[test]
fn recent_activity_window_rolls_back_from_now() {
    let at = |d: u32, h: u32| Utc.with_ymd_and_hms(2026, 10, d, h, 0, 0).unwrap();
    let records = vec![
        VehicleValuationRecord::new("IN1", "north", at(9, 13)),
        VehicleValuationRecord::new("OUT", "north", at(9, 11)),
        VehicleValuationRecord::new("IN2", "north", at(16, 11)),
    ];
    let dashboard = Dashboard::new(InMemorySource::new(records), InsightConfig::default_test());
    let stats = dashboard.statistics(&north_user(), None, now()).unwrap();
    assert_eq!(stats.total_vehicles, 3);
    assert_eq!(stats.recent_activity, 2);
}

#[test]
fn periods_skip_records_missing_a_snapshot() {
    let first_listing = VehicleValuationRecord::new("NEW", "north", on(10, 11))
        .with_book_values(ValuationSnapshot::new(), ValuationSnapshot::new().with("KBB", 9_000.0));
    let mut records = fixture_records();
    records.push(first_listing);

    let dashboard = Dashboard::new(InMemorySource::new(records), InsightConfig::default_test());
    let scoped = dashboard
        .period_insight(&north_user(), None, Period::MonthToDate, now())
        .unwrap();
    assert_eq!(scoped.insight.record_count, 1);
    assert_eq!(scoped.insight.total_difference, 1300.0);
}

#[test]
fn vehicle_listing_pages_and_searches_within_scope() {
    let in_memory = in_memory_dashboard();
    let sqlite = sqlite_dashboard();
    for listing in [
        in_memory.list_vehicles(&north_user(), None, "", Page::new(1, 2)).unwrap(),
        sqlite.list_vehicles(&north_user(), None, "", Page::new(1, 2)).unwrap(),
    ] {
        assert_eq!(stock_numbers(&listing.vehicles), vec!["F1", "U1"]);
        assert_eq!(listing.pagination.total, 4);
        assert_eq!(listing.pagination.pages, 2);
        assert!(listing.pagination.has_next);
        assert!(!listing.pagination.has_prev);
    }

    let second = sqlite.list_vehicles(&north_user(), None, "", Page::new(2, 2)).unwrap();
    assert_eq!(stock_numbers(&second.vehicles), vec!["P1", "Y1"]);
    assert!(!second.pagination.has_next);

    let search = sqlite.list_vehicles(&north_user(), None, "p1", Page::new(1, 20)).unwrap();
    assert_eq!(stock_numbers(&search.vehicles), vec!["P1"]);
    assert_eq!(search.pagination.total, 1);

    // South's stock is invisible to a north user even by exact search.
    let hidden = sqlite.list_vehicles(&north_user(), None, "S1", Page::new(1, 20)).unwrap();
    assert!(hidden.vehicles.is_empty());
    assert_eq!(hidden.pagination.total, 0);
}

#[test]
fn vehicle_insight_is_scoped_by_store() {
    let dashboard = sqlite_dashboard();
    // Fixture insertion order fixes the ids: P1 = 1, S1 = 2.
    let pilot = dashboard.vehicle_insight(&north_user(), None, 1).unwrap().unwrap();
    assert_eq!(pilot.record.stock_number, "P1");
    assert_eq!(pilot.insight.total_difference, 1300.0);
    assert_eq!(pilot.insight.primary_source.as_deref(), Some("KBB"));
    assert_eq!(pilot.insight.summary, "$1,300 increase found by automation");

    assert_eq!(dashboard.vehicle_insight(&north_user(), None, 2).unwrap(), None);
    assert_eq!(dashboard.vehicle_insight(&north_user(), None, 99).unwrap(), None);

    let south = dashboard
        .vehicle_insight(&AccessPrincipal::super_admin(), None, 2)
        .unwrap()
        .unwrap();
    assert_eq!(south.insight.summary, "$500 decrease found by automation");
}

#[test]
fn recent_activity_lists_latest_records_first() {
    let dashboard = sqlite_dashboard();
    let items = dashboard.recent_activity(&north_user(), None, 2, now()).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].stock_number, "F1");
    assert_eq!(items[0].description, "Vehicle #F1 failed to process");
    assert_eq!(items[0].time_ago, "1 day ago");
    assert_eq!(items[1].description, "Vehicle #U1 processed, marked 2 features");

    let all = dashboard.recent_activity(&north_user(), None, 500, now()).unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(
        all[2].description,
        "Vehicle #P1 processed, updated description, marked 6 features, NO FEAR certified"
    );
    assert_eq!(dashboard.recent_activity(&north_user(), None, 0, now()).unwrap().len(), 1);
}
