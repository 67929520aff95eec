//! Shared primitive types used across the engine.

/// A store (dealership environment) identifier.
pub type StoreId = String;

/// The name of a third-party valuation source, e.g. "KBB".
pub type SourceName = String;

/// The database identifier of a vehicle record.
pub type RecordId = i64;

/// A monetary amount in dollars.
pub type Amount = f64;
