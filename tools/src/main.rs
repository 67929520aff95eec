//! insight-runner: headless dashboard statistics for a record store.
//!
//! Usage:
//!   insight-runner --db records.db --role user --stores north,south
//!   insight-runner --demo 50 --seed 7 --stores north,south --role super_admin --store north

use anyhow::Result;
use chrono::Utc;
use std::env;
use valuation_core::{
    access::AccessPrincipal, config::InsightConfig, dashboard::Dashboard, demo, store::VehicleStore,
};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let demo_count = parse_arg(&args, "--demo", 0usize);
    let db = flag_value(&args, "--db").unwrap_or(":memory:");
    let config_path = flag_value(&args, "--config");
    let role = flag_value(&args, "--role").unwrap_or("user");
    let explicit_store = flag_value(&args, "--store");
    let stores: Vec<String> = flag_value(&args, "--stores")
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let config = match config_path {
        Some(path) => InsightConfig::load(path)?,
        None => InsightConfig::default(),
    };

    let store = VehicleStore::open(db)?;
    store.migrate()?;

    let now = Utc::now();
    if demo_count > 0 {
        let demo_stores = if stores.is_empty() {
            vec!["demo".to_string()]
        } else {
            stores.clone()
        };
        for record in demo::generate_records(seed, demo_count, &demo_stores, now) {
            store.insert_record(&record)?;
        }
        log::info!(
            "Seeded {} demo records across {} stores (seed {seed})",
            demo_count * demo_stores.len(),
            demo_stores.len()
        );
    }

    // The one place a role string becomes a Role.
    let principal = AccessPrincipal::from_raw(role, stores)?;
    log::info!(
        "{} records in {db}, stores: {}",
        store.record_count()?,
        store.store_ids()?.join(", ")
    );

    let dashboard = Dashboard::new(store, config);
    let stats = dashboard.statistics(&principal, explicit_store, now)?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
