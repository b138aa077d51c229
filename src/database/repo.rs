use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Result, Context};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use uuid::Uuid;

use crate::database::schema::SCHEMA;
use crate::recognizer::FaceMatch;
use crate::sampler::{DEDUP_WINDOW_TICKS, TICKS_PER_SECOND};

/// One persisted face match. Append-only; never mutated after creation.
#[derive(Debug, Clone)]
pub struct RecognitionResult {
    pub id: Uuid,
    pub item_id: Uuid,
    pub timestamp_ticks: i64,
    pub label: String,
    pub confidence: f64,
    /// "left,top,width,height"
    pub bbox: String,
    pub created_at: DateTime<Utc>,
}

/// Keyed record store of recognition results. A single shared connection
/// behind a mutex serializes writers, and the check-and-insert in
/// `save_unless_recent` runs inside one transaction.
pub struct ResultStore {
    conn: Mutex<Connection>,
}

impl ResultStore {
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open database")?;
        conn.execute_batch(SCHEMA)
            .context("Failed to initialize schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        conn.execute_batch(SCHEMA)
            .context("Failed to initialize schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// True if any row for this item falls within the ±0.1s dedup window of
    /// `timestamp_ticks` (inclusive).
    pub fn has_recent_result(&self, item_id: Uuid, timestamp_ticks: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        Self::recent_exists(&conn, item_id, timestamp_ticks)
    }

    /// Appends one row per match, all at the same timestamp, atomically.
    pub fn save_results(
        &self,
        item_id: Uuid,
        timestamp_ticks: i64,
        matches: &[FaceMatch],
    ) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().context("Failed to begin transaction")?;
        Self::insert_matches(&tx, item_id, timestamp_ticks, matches)?;
        tx.commit().context("Failed to commit results")?;
        Ok(())
    }

    /// Dedup guard and write in one transaction: returns false (writing
    /// nothing) when a row already covers the window, so two near-simultaneous
    /// pause events on the same instant cannot both insert.
    pub fn save_unless_recent(
        &self,
        item_id: Uuid,
        timestamp_ticks: i64,
        matches: &[FaceMatch],
    ) -> Result<bool> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().context("Failed to begin transaction")?;

        if Self::recent_exists(&tx, item_id, timestamp_ticks)? {
            return Ok(false);
        }

        Self::insert_matches(&tx, item_id, timestamp_ticks, matches)?;
        tx.commit().context("Failed to commit results")?;
        Ok(true)
    }

    /// Rows for the item within ±`padding_seconds` of the query point,
    /// confidence-descending, reduced to the best row per label. Output order
    /// is each label's first appearance in the sorted sequence, not a second
    /// confidence sort.
    pub fn query(
        &self,
        item_id: Uuid,
        timestamp_ticks: i64,
        padding_seconds: i64,
    ) -> Result<Vec<RecognitionResult>> {
        // Padding arrives unvalidated from the query API; saturate instead
        // of overflowing on absurd values.
        let padding_ticks = padding_seconds.saturating_mul(TICKS_PER_SECOND);
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT id, item_id, timestamp_ticks, label, confidence, bbox, created_at
             FROM recognition_results
             WHERE item_id = ?1 AND timestamp_ticks BETWEEN ?2 AND ?3
             ORDER BY confidence DESC, rowid ASC",
        )?;

        let rows = stmt.query_map(
            params![
                item_id.to_string(),
                timestamp_ticks.saturating_sub(padding_ticks),
                timestamp_ticks.saturating_add(padding_ticks)
            ],
            Self::row_to_result,
        )?;

        let mut seen = HashSet::new();
        let mut results = Vec::new();
        for row in rows {
            let result = row.context("Failed to read result row")?;
            if seen.insert(result.label.clone()) {
                results.push(result);
            }
        }
        Ok(results)
    }

    fn recent_exists(conn: &Connection, item_id: Uuid, timestamp_ticks: i64) -> Result<bool> {
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM recognition_results
                    WHERE item_id = ?1 AND timestamp_ticks BETWEEN ?2 AND ?3
                )",
                params![
                    item_id.to_string(),
                    timestamp_ticks.saturating_sub(DEDUP_WINDOW_TICKS),
                    timestamp_ticks.saturating_add(DEDUP_WINDOW_TICKS)
                ],
                |row| row.get(0),
            )
            .context("Failed to check for recent results")?;
        Ok(exists)
    }

    fn insert_matches(
        conn: &Connection,
        item_id: Uuid,
        timestamp_ticks: i64,
        matches: &[FaceMatch],
    ) -> Result<()> {
        let mut stmt = conn.prepare(
            "INSERT INTO recognition_results
                (id, item_id, timestamp_ticks, label, confidence, bbox, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;

        let created_at = Utc::now().to_rfc3339();
        for m in matches {
            let bbox = m
                .bbox
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(",");
            stmt.execute(params![
                Uuid::new_v4().to_string(),
                item_id.to_string(),
                timestamp_ticks,
                m.label,
                m.score,
                bbox,
                created_at
            ])
            .context("Failed to insert result row")?;
        }
        Ok(())
    }

    fn row_to_result(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecognitionResult> {
        let id: String = row.get(0)?;
        let item_id: String = row.get(1)?;
        let created_at: String = row.get(6)?;

        Ok(RecognitionResult {
            id: Uuid::parse_str(&id).map_err(|e| text_error(0, e))?,
            item_id: Uuid::parse_str(&item_id).map_err(|e| text_error(1, e))?,
            timestamp_ticks: row.get(2)?,
            label: row.get(3)?,
            confidence: row.get(4)?,
            bbox: row.get(5)?,
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| text_error(6, e))?,
        })
    }
}

fn text_error(
    index: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(err))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(label: &str, score: f64) -> FaceMatch {
        FaceMatch {
            bbox: vec![10, 20, 100, 120],
            label: label.to_string(),
            score,
        }
    }

    fn row_count(store: &ResultStore) -> i64 {
        let conn = store.conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM recognition_results", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_write_visibility() -> Result<()> {
        let store = ResultStore::open_in_memory()?;
        let item = Uuid::new_v4();

        assert!(!store.has_recent_result(item, 50_000_000)?);
        store.save_results(item, 50_000_000, &[face("A", 0.9)])?;
        assert!(store.has_recent_result(item, 50_000_000)?);
        Ok(())
    }

    #[test]
    fn test_dedup_window_is_inclusive() -> Result<()> {
        let store = ResultStore::open_in_memory()?;
        let item = Uuid::new_v4();
        store.save_results(item, 50_000_000, &[face("A", 0.9)])?;

        // ±0.1s = ±1,000,000 ticks, boundary included.
        assert!(store.has_recent_result(item, 51_000_000)?);
        assert!(store.has_recent_result(item, 49_000_000)?);
        assert!(!store.has_recent_result(item, 51_000_001)?);
        assert!(!store.has_recent_result(item, 48_999_999)?);
        Ok(())
    }

    #[test]
    fn test_dedup_is_per_item() -> Result<()> {
        let store = ResultStore::open_in_memory()?;
        let item = Uuid::new_v4();
        store.save_results(item, 50_000_000, &[face("A", 0.9)])?;

        assert!(!store.has_recent_result(Uuid::new_v4(), 50_000_000)?);
        Ok(())
    }

    #[test]
    fn test_save_unless_recent_writes_once() -> Result<()> {
        let store = ResultStore::open_in_memory()?;
        let item = Uuid::new_v4();
        let matches = [face("A", 0.9), face("B", 0.7)];

        assert!(store.save_unless_recent(item, 50_000_000, &matches)?);
        assert_eq!(row_count(&store), 2);

        // Pause jitter 0.05s later: within the window, nothing new written.
        assert!(!store.save_unless_recent(item, 50_500_000, &matches)?);
        assert_eq!(row_count(&store), 2);
        Ok(())
    }

    #[test]
    fn test_query_keeps_best_row_per_label() -> Result<()> {
        let store = ResultStore::open_in_memory()?;
        let item = Uuid::new_v4();
        store.save_results(
            item,
            50_000_000,
            &[face("A", 0.9), face("A", 0.4), face("B", 0.7)],
        )?;

        let results = store.query(item, 50_000_000, 5)?;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].label, "A");
        assert_eq!(results[0].confidence, 0.9);
        assert_eq!(results[1].label, "B");
        assert_eq!(results[1].confidence, 0.7);
        Ok(())
    }

    #[test]
    fn test_query_order_follows_sorted_first_appearance() -> Result<()> {
        let store = ResultStore::open_in_memory()?;
        let item = Uuid::new_v4();
        store.save_results(
            item,
            50_000_000,
            &[face("A", 0.9), face("B", 0.95), face("A", 0.85)],
        )?;

        // Confidence-descending: B 0.95, A 0.9, A 0.85. B appears first.
        let results = store.query(item, 50_000_000, 5)?;
        let labels: Vec<&str> = results.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["B", "A"]);
        Ok(())
    }

    #[test]
    fn test_query_never_repeats_a_label() -> Result<()> {
        let store = ResultStore::open_in_memory()?;
        let item = Uuid::new_v4();
        store.save_results(item, 50_000_000, &[face("A", 0.9), face("B", 0.8)])?;
        store.save_results(item, 60_000_000, &[face("A", 0.7), face("C", 0.6)])?;

        let results = store.query(item, 55_000_000, 5)?;
        let mut labels: Vec<&str> = results.iter().map(|r| r.label.as_str()).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), results.len());
        Ok(())
    }

    #[test]
    fn test_query_respects_padding() -> Result<()> {
        let store = ResultStore::open_in_memory()?;
        let item = Uuid::new_v4();
        store.save_results(item, 50_000_000, &[face("A", 0.9)])?;
        store.save_results(item, 200_000_000, &[face("B", 0.8)])?;

        // 5s padding around t=5s only reaches the first row.
        let results = store.query(item, 50_000_000, 5)?;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].label, "A");

        let results = store.query(item, 50_000_000, 15)?;
        assert_eq!(results.len(), 2);
        Ok(())
    }

    #[test]
    fn test_query_huge_padding_saturates() -> Result<()> {
        let store = ResultStore::open_in_memory()?;
        let item = Uuid::new_v4();
        store.save_results(item, 50_000_000, &[face("A", 0.9)])?;

        // padding * TICKS_PER_SECOND would overflow i64; the window must
        // saturate to the full range instead of panicking or wrapping.
        let results = store.query(item, 50_000_000, i64::MAX / 1_000)?;
        assert_eq!(results.len(), 1);

        let results = store.query(item, i64::MAX, i64::MAX)?;
        assert_eq!(results.len(), 1);
        Ok(())
    }

    #[test]
    fn test_bbox_serialized_comma_joined() -> Result<()> {
        let store = ResultStore::open_in_memory()?;
        let item = Uuid::new_v4();
        store.save_results(item, 50_000_000, &[face("A", 0.9)])?;

        let results = store.query(item, 50_000_000, 5)?;
        assert_eq!(results[0].bbox, "10,20,100,120");
        assert_eq!(results[0].item_id, item);
        assert_eq!(results[0].timestamp_ticks, 50_000_000);
        Ok(())
    }
}
