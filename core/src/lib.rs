//! Valuation insight engine.
//!
//! Answers two questions for a requester:
//!   1. Which records may this principal see?          (access, query)
//!   2. What did automation do to their book values?    (valuation,
//!      record_insight, period_aggregator)
//!
//! `dashboard` wires both together over a `RecordSource`.

pub mod access;
pub mod config;
pub mod dashboard;
pub mod demo;
pub mod error;
pub mod period;
pub mod period_aggregator;
pub mod query;
pub mod record;
pub mod record_insight;
pub mod rng;
pub mod store;
pub mod types;
pub mod valuation;
