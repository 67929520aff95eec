//! Synthetic vehicle records for local runs and tests.
//!
//! Covers every shape the resolver and exclusion rule care about:
//!   - comparable KBB moves (both sides quoted)
//!   - initial merchandising (before is $0 or missing)
//!   - fallback-only records (no KBB at all)
//!   - nested valuation structures
//!   - records whose book values were never processed

use crate::{
    record::VehicleValuationRecord,
    record_insight::format_dollars,
    rng::DemoRng,
    valuation::{RawValuation, ValuationSnapshot},
};
use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;

const VEHICLES: &[&str] = &[
    "2019 Honda Pilot EX-L",
    "2021 Toyota RAV4 XLE",
    "2018 Ford F-150 Lariat",
    "2020 Chevrolet Corvette Stingray",
    "2017 Subaru Outback Premium",
    "2022 Hyundai Tucson SEL",
    "2016 Jeep Wrangler Unlimited",
    "2020 Mazda CX-5 Touring",
];

const FALLBACK_SOURCES: &[&str] = &["rBook", "J.D. Power", "MMR", "Black Book"];

/// Demo record shapes, drawn with fixed weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Comparable,
    InitialMerchandising,
    FallbackOnly,
    Nested,
    Unprocessed,
}

fn draw_shape(rng: &mut DemoRng) -> Shape {
    match rng.next_u64_below(100) {
        0..=49 => Shape::Comparable,
        50..=64 => Shape::InitialMerchandising,
        65..=79 => Shape::FallbackOnly,
        80..=89 => Shape::Nested,
        _ => Shape::Unprocessed,
    }
}

fn dollars(amount: f64) -> RawValuation {
    let sign = if amount < 0.0 { "-" } else { "" };
    RawValuation::Text(format!("{sign}${}", format_dollars(amount)))
}

/// Generate `count` records per store, spread over the 90 days before `now`.
/// The same (seed, stores, now) always yields the same records.
pub fn generate_records(
    seed: u64,
    count: usize,
    stores: &[String],
    now: DateTime<Utc>,
) -> Vec<VehicleValuationRecord> {
    let mut records = Vec::with_capacity(count * stores.len());

    for (store_index, store_id) in stores.iter().enumerate() {
        let mut rng = DemoRng::new(seed, store_index as u64);

        for n in 0..count {
            let age_minutes = rng.next_u64_below(90 * 24 * 60) as i64;
            let processing_date = now - Duration::minutes(age_minutes);
            let stock_number = format!("{}{:04}", store_prefix(store_id), n + 1);

            let mut record = VehicleValuationRecord::new(&stock_number, store_id, processing_date)
                .with_name(*rng.pick(VEHICLES));
            record.processing_session_id = Some(session_id(&mut rng));
            record.processing_successful = rng.chance(0.9);
            record.description_updated = rng.chance(0.7);
            record.marked_features_count = rng.next_u64_below(12) as u32;

            let base = rng.range_f64(12_000.0, 48_000.0);
            let delta = rng.range_f64(-600.0, 2_400.0);

            match draw_shape(&mut rng) {
                Shape::Comparable => {
                    let mut before = ValuationSnapshot::new().with("KBB", dollars(base));
                    let mut after = ValuationSnapshot::new().with("KBB", dollars(base + delta));
                    if rng.chance(0.5) {
                        let mmr = base * 0.93;
                        before = before.with("MMR", mmr.round());
                        after = after.with("MMR", (mmr + delta * 0.8).round());
                    }
                    record = record.with_book_values(before, after);
                }
                Shape::InitialMerchandising => {
                    let before = if rng.chance(0.5) {
                        ValuationSnapshot::new().with("KBB", "$0")
                    } else {
                        ValuationSnapshot::new()
                    };
                    let after = ValuationSnapshot::new().with("KBB", dollars(base));
                    record = record.with_book_values(before, after);
                }
                Shape::FallbackOnly => {
                    let source = *rng.pick(FALLBACK_SOURCES);
                    let before = ValuationSnapshot::new().with(source, dollars(base));
                    let after = ValuationSnapshot::new().with(source, dollars(base + delta));
                    record = record.with_book_values(before, after);
                }
                Shape::Nested => {
                    let nested = |total: f64| {
                        let mut inner = IndexMap::new();
                        inner.insert("clean_retail".to_string(), dollars(total));
                        inner.insert("difference".to_string(), dollars(delta));
                        RawValuation::Nested(inner)
                    };
                    let before = ValuationSnapshot::new().with("Black Book", nested(base));
                    let after = ValuationSnapshot::new().with("Black Book", nested(base + delta));
                    record = record.with_book_values(before, after);
                }
                Shape::Unprocessed => {}
            }

            records.push(record);
        }
    }

    log::debug!("Generated {} demo records for {} stores", records.len(), stores.len());
    records
}

fn store_prefix(store_id: &str) -> String {
    store_id
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(3)
        .collect::<String>()
        .to_uppercase()
}

/// v4-format session id drawn from the demo stream, so it is reproducible.
fn session_id(rng: &mut DemoRng) -> String {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    uuid::Builder::from_random_bytes(bytes).into_uuid().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
    }

    #[test]
    fn generation_is_deterministic() {
        let stores = vec!["north".to_string(), "south".to_string()];
        let a = generate_records(7, 25, &stores, now());
        let b = generate_records(7, 25, &stores, now());
        assert_eq!(a, b);
        assert_eq!(a.len(), 50);
    }

    #[test]
    fn records_stay_inside_the_window() {
        let stores = vec!["lot-a".to_string()];
        for record in generate_records(11, 40, &stores, now()) {
            assert!(record.processing_date <= now());
            assert!(record.processing_date > now() - Duration::days(90));
            assert!(record.stock_number.starts_with("LOT"));
            assert_eq!(
                uuid::Uuid::parse_str(record.processing_session_id.as_deref().unwrap())
                    .unwrap()
                    .get_version_num(),
                4
            );
        }
    }
}
