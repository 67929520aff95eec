//! SQLite persistence layer.
//!
//! RULE: Only store/ talks to the database.
//! The engine consumes records through `RecordSource` and never
//! executes SQL directly.

use crate::error::InsightResult;
use rusqlite::{params, Connection};

mod vehicle;

pub struct VehicleStore {
    conn: Connection,
}

impl VehicleStore {
    pub fn open(path: &str) -> InsightResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> InsightResult<Self> {
        let conn = Connection::open(":memory:")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> InsightResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    // ── Summary helpers ────────────────────────────────────────

    /// Total number of stored records, across all stores.
    pub fn record_count(&self) -> InsightResult<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM vehicle_record", params![], |row| row.get(0))?;
        Ok(count)
    }

    /// Distinct store identifiers that own at least one record.
    pub fn store_ids(&self) -> InsightResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT store_id FROM vehicle_record ORDER BY store_id ASC")?;
        let ids = stmt
            .query_map(params![], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }
}
