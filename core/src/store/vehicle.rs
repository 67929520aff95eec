//! Store methods for vehicle valuation records.

use super::VehicleStore;
use crate::{
    error::InsightResult,
    query::{QueryFilter, StoreFilter},
    record::{RecordSource, VehicleValuationRecord},
    types::RecordId,
    valuation::ValuationSnapshot,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, types::Value};

/// Row as stored; snapshots still JSON text.
struct StoredRow {
    id: RecordId,
    stock_number: String,
    vehicle_name: Option<String>,
    vin: Option<String>,
    store_id: String,
    processing_date: DateTime<Utc>,
    processing_session_id: Option<String>,
    processing_successful: bool,
    description_updated: bool,
    marked_features_count: u32,
    no_fear_certificate: bool,
    processed: bool,
    before_json: Option<String>,
    after_json: Option<String>,
}

impl StoredRow {
    fn into_record(self) -> VehicleValuationRecord {
        let before = parse_snapshot(self.id, "before", self.before_json.as_deref());
        let after = parse_snapshot(self.id, "after", self.after_json.as_deref());
        VehicleValuationRecord {
            id: Some(self.id),
            stock_number: self.stock_number,
            vehicle_name: self.vehicle_name,
            vin: self.vin,
            store_id: self.store_id,
            processing_date: self.processing_date,
            processing_session_id: self.processing_session_id,
            processing_successful: self.processing_successful,
            description_updated: self.description_updated,
            marked_features_count: self.marked_features_count,
            no_fear_certificate: self.no_fear_certificate,
            processed: self.processed,
            before,
            after,
        }
    }
}

/// Malformed snapshot JSON degrades to an empty snapshot; the record
/// still counts, it just has no comparable sources.
fn parse_snapshot(id: RecordId, side: &str, json: Option<&str>) -> ValuationSnapshot {
    match json.map(str::trim).filter(|j| !j.is_empty()) {
        None => ValuationSnapshot::default(),
        Some(text) => ValuationSnapshot::from_json_str(text).unwrap_or_else(|e| {
            log::warn!("Record {id}: unreadable {side} book values ({e}); treating as empty");
            ValuationSnapshot::default()
        }),
    }
}

const SELECT_COLUMNS: &str = "SELECT id, stock_number, vehicle_name, vin, store_id, processing_date,
        processing_session_id, processing_successful, description_updated,
        marked_features_count, no_fear_certificate, book_values_processed,
        book_values_before, book_values_after
 FROM vehicle_record";

/// `WHERE` clause and positional values for everything in `filter`
/// except its page.
fn where_clause(filter: &QueryFilter) -> (String, Vec<Value>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    match &filter.stores {
        StoreFilter::Any => {}
        StoreFilter::In(stores) => {
            let start = values.len() + 1;
            let placeholders: Vec<String> =
                (start..start + stores.len()).map(|i| format!("?{i}")).collect();
            clauses.push(format!("store_id IN ({})", placeholders.join(", ")));
            values.extend(stores.iter().cloned().map(Value::Text));
        }
        StoreFilter::MatchNothing => clauses.push("0 = 1".to_string()),
    }

    if let Some(id) = filter.record_id {
        clauses.push(format!("id = ?{}", values.len() + 1));
        values.push(Value::Integer(id));
    }

    if let Some(search) = &filter.stock_search {
        clauses.push(format!("LOWER(stock_number) LIKE ?{} ESCAPE '\\'", values.len() + 1));
        values.push(Value::Text(format!("%{}%", escape_like(&search.to_lowercase()))));
    }

    if let Some(range) = filter.date_range {
        clauses.push(format!(
            "processing_date >= ?{} AND processing_date < ?{}",
            values.len() + 1,
            values.len() + 2
        ));
        values.push(Value::Integer(range.start_instant().timestamp_millis()));
        values.push(Value::Integer(range.end_exclusive().timestamp_millis()));
    }

    if filter.processed_only {
        clauses.push(
            "book_values_processed = 1 AND book_values_before IS NOT NULL \
             AND book_values_after IS NOT NULL"
                .to_string(),
        );
    }

    let sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    (sql, values)
}

/// Search text is literal; `%` and `_` must not act as wildcards.
fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

impl VehicleStore {
    // ── Vehicle records ───────────────────────────────────────────

    pub fn insert_record(&self, record: &VehicleValuationRecord) -> InsightResult<RecordId> {
        let before = (!record.before.is_empty())
            .then(|| record.before.to_json_string())
            .transpose()?;
        let after = (!record.after.is_empty())
            .then(|| record.after.to_json_string())
            .transpose()?;

        self.conn.execute(
            "INSERT INTO vehicle_record (
                stock_number, vehicle_name, vin, store_id, processing_date,
                processing_session_id, processing_successful, description_updated,
                marked_features_count, no_fear_certificate, book_values_processed,
                book_values_before, book_values_after
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                &record.stock_number,
                &record.vehicle_name,
                &record.vin,
                &record.store_id,
                record.processing_date.timestamp_millis(),
                &record.processing_session_id,
                record.processing_successful,
                record.description_updated,
                record.marked_features_count as i64,
                record.no_fear_certificate,
                record.processed,
                before,
                after,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Store raw snapshot text as-is. Used to exercise malformed input.
    pub fn set_raw_book_values(
        &self,
        id: RecordId,
        before_json: Option<&str>,
        after_json: Option<&str>,
    ) -> InsightResult<()> {
        self.conn.execute(
            "UPDATE vehicle_record
             SET book_values_before = ?2, book_values_after = ?3, book_values_processed = 1
             WHERE id = ?1",
            params![id, before_json, after_json],
        )?;
        Ok(())
    }

    pub fn records_matching(&self, filter: &QueryFilter) -> InsightResult<Vec<VehicleValuationRecord>> {
        let (where_sql, mut values) = where_clause(filter);
        let mut sql = format!("{SELECT_COLUMNS}{where_sql} ORDER BY processing_date DESC, id DESC");
        if let Some(page) = filter.page {
            sql.push_str(&format!(" LIMIT ?{} OFFSET ?{}", values.len() + 1, values.len() + 2));
            values.push(Value::Integer(page.limit() as i64));
            values.push(Value::Integer(page.offset() as i64));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                let millis: i64 = row.get(5)?;
                let processing_date = DateTime::<Utc>::from_timestamp_millis(millis)
                    .ok_or(rusqlite::Error::IntegralValueOutOfRange(5, millis))?;
                Ok(StoredRow {
                    id: row.get(0)?,
                    stock_number: row.get(1)?,
                    vehicle_name: row.get(2)?,
                    vin: row.get(3)?,
                    store_id: row.get(4)?,
                    processing_date,
                    processing_session_id: row.get(6)?,
                    processing_successful: row.get(7)?,
                    description_updated: row.get(8)?,
                    marked_features_count: row.get::<_, i64>(9)?.max(0) as u32,
                    no_fear_certificate: row.get(10)?,
                    processed: row.get(11)?,
                    before_json: row.get(12)?,
                    after_json: row.get(13)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        log::debug!("Fetched {} records for {:?}", rows.len(), filter.stores);
        Ok(rows.into_iter().map(StoredRow::into_record).collect())
    }

    /// Matching records, ignoring the filter's page.
    pub fn count_matching(&self, filter: &QueryFilter) -> InsightResult<usize> {
        let (where_sql, values) = where_clause(filter);
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM vehicle_record{where_sql}"),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }
}

impl RecordSource for VehicleStore {
    fn fetch(&self, filter: &QueryFilter) -> InsightResult<Vec<VehicleValuationRecord>> {
        self.records_matching(filter)
    }

    fn count(&self, filter: &QueryFilter) -> InsightResult<usize> {
        self.count_matching(filter)
    }
}
