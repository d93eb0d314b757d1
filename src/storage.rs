//! Inspection history persistence.
//!
//! The core hands completed verdicts to a `HistoryStore` together with metadata
//! the host collected (timestamp, duration, thumbnail). Statistics are derived
//! from the stored history, so clearing the history also resets them.

use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::aggregate::{AggregatedVerdict, VerdictStatus};
use crate::frame::Thumbnail;

/// One completed inspection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InspectionRecord {
    /// Assigned by the store on append.
    pub id: Option<i64>,
    /// Completion time, seconds since the Unix epoch.
    pub recorded_at_s: u64,
    pub duration_ms: u64,
    /// Classifier samples the inspection received.
    pub samples: u64,
    pub verdict: AggregatedVerdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Thumbnail>,
}

/// Running totals over the stored history.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionStats {
    pub total: u64,
    pub ok: u64,
    pub defective: u64,
    pub by_defect: BTreeMap<String, u64>,
}

impl InspectionStats {
    fn count(&mut self, verdict: &AggregatedVerdict) {
        self.total += 1;
        match (verdict.status, &verdict.defect_type) {
            (VerdictStatus::Defective, Some(defect)) => {
                self.defective += 1;
                *self.by_defect.entry(defect.clone()).or_default() += 1;
            }
            (VerdictStatus::Defective, None) => self.defective += 1,
            (VerdictStatus::Ok, _) => self.ok += 1,
        }
    }

    /// Share of defective inspections, 0 when empty.
    pub fn defect_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.defective as f64 / self.total as f64
        }
    }
}

/// Persistence port for completed inspections.
pub trait HistoryStore {
    /// Append a record and return its id.
    fn append(&mut self, record: &InspectionRecord) -> Result<i64>;

    /// Newest records first.
    fn recent(&mut self, limit: usize) -> Result<Vec<InspectionRecord>>;

    fn stats(&mut self) -> Result<InspectionStats>;

    /// Delete all history. Returns the number of removed records.
    fn clear(&mut self) -> Result<usize>;

    /// Keep only the newest `max_records`. Returns the number of removed records.
    fn prune_to(&mut self, max_records: usize) -> Result<usize>;
}

fn status_from_str(value: &str) -> Result<VerdictStatus> {
    match value {
        "ok" => Ok(VerdictStatus::Ok),
        "defective" => Ok(VerdictStatus::Defective),
        other => Err(anyhow!("corrupt history: unknown status '{}'", other)),
    }
}

// ----------------------------------------------------------------------------
// SQLite
// ----------------------------------------------------------------------------

pub struct SqliteHistoryStore {
    conn: Connection,
}

impl SqliteHistoryStore {
    /// Open (and create) the history database. `file:` URIs are accepted, which
    /// allows shared in-memory databases in tests.
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = crate::open_db_connection(db_path)?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS inspections (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              recorded_at INTEGER NOT NULL,
              duration_ms INTEGER NOT NULL,
              samples INTEGER NOT NULL,
              label TEXT NOT NULL,
              confidence REAL NOT NULL,
              status TEXT NOT NULL,
              defect_type TEXT,
              thumb_width INTEGER,
              thumb_height INTEGER,
              thumb_rgb BLOB
            );

            CREATE INDEX IF NOT EXISTS idx_inspections_recorded ON inspections(recorded_at);
            "#,
        )?;
        Ok(())
    }
}

impl HistoryStore for SqliteHistoryStore {
    fn append(&mut self, record: &InspectionRecord) -> Result<i64> {
        let recorded_at = i64::try_from(record.recorded_at_s)
            .map_err(|_| anyhow!("record timestamp exceeds i64 range"))?;
        let duration_ms = i64::try_from(record.duration_ms)
            .map_err(|_| anyhow!("record duration exceeds i64 range"))?;
        let samples = i64::try_from(record.samples)
            .map_err(|_| anyhow!("record sample count exceeds i64 range"))?;
        let verdict = &record.verdict;
        let thumb = record.thumbnail.as_ref();

        self.conn.execute(
            r#"
            INSERT INTO inspections(recorded_at, duration_ms, samples, label, confidence,
                                    status, defect_type, thumb_width, thumb_height, thumb_rgb)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                recorded_at,
                duration_ms,
                samples,
                verdict.label,
                verdict.confidence as f64,
                verdict.status.as_str(),
                verdict.defect_type,
                thumb.map(|t| t.width),
                thumb.map(|t| t.height),
                thumb.map(|t| t.rgb.as_slice()),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn recent(&mut self, limit: usize) -> Result<Vec<InspectionRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, recorded_at, duration_ms, samples, label, confidence, status,
                   defect_type, thumb_width, thumb_height, thumb_rgb
            FROM inspections ORDER BY id DESC LIMIT ?1
            "#,
        )?;
        let mut rows = stmt.query(params![limit])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let status: String = row.get(6)?;
            let status = status_from_str(&status)?;
            let thumb_width: Option<u32> = row.get(8)?;
            let thumb_height: Option<u32> = row.get(9)?;
            let thumb_rgb: Option<Vec<u8>> = row.get(10)?;
            let thumbnail = match (thumb_width, thumb_height, thumb_rgb) {
                (Some(width), Some(height), Some(rgb)) => Some(Thumbnail { width, height, rgb }),
                _ => None,
            };
            let recorded_at: i64 = row.get(1)?;
            let duration_ms: i64 = row.get(2)?;
            let samples: i64 = row.get(3)?;
            let confidence: f64 = row.get(5)?;

            out.push(InspectionRecord {
                id: Some(row.get(0)?),
                recorded_at_s: recorded_at.max(0) as u64,
                duration_ms: duration_ms.max(0) as u64,
                samples: samples.max(0) as u64,
                verdict: AggregatedVerdict {
                    label: row.get(4)?,
                    confidence: confidence as f32,
                    is_defective: status == VerdictStatus::Defective,
                    defect_type: row.get(7)?,
                    status,
                },
                thumbnail,
            });
        }
        Ok(out)
    }

    fn stats(&mut self) -> Result<InspectionStats> {
        let mut stats = InspectionStats::default();
        let mut stmt = self.conn.prepare(
            "SELECT status, defect_type, COUNT(*) FROM inspections GROUP BY status, defect_type",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let status: String = row.get(0)?;
            let defect: Option<String> = row.get(1)?;
            let count: i64 = row.get(2)?;
            let count = count.max(0) as u64;
            stats.total += count;
            match (status_from_str(&status)?, defect) {
                (VerdictStatus::Defective, Some(defect)) => {
                    stats.defective += count;
                    *stats.by_defect.entry(defect).or_default() += count;
                }
                (VerdictStatus::Defective, None) => stats.defective += count,
                (VerdictStatus::Ok, _) => stats.ok += count,
            }
        }
        Ok(stats)
    }

    fn clear(&mut self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM inspections", [])?)
    }

    fn prune_to(&mut self, max_records: usize) -> Result<usize> {
        let keep = i64::try_from(max_records).unwrap_or(i64::MAX);
        let newest_dropped: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM inspections ORDER BY id DESC LIMIT 1 OFFSET ?1",
                params![keep],
                |row| row.get(0),
            )
            .optional()?;
        let Some(cutoff) = newest_dropped else {
            return Ok(0);
        };
        Ok(self
            .conn
            .execute("DELETE FROM inspections WHERE id <= ?1", params![cutoff])?)
    }
}

// ----------------------------------------------------------------------------
// In-memory
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct InMemoryHistoryStore {
    records: Vec<InspectionRecord>,
    next_id: i64,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn append(&mut self, record: &InspectionRecord) -> Result<i64> {
        self.next_id += 1;
        let mut stored = record.clone();
        stored.id = Some(self.next_id);
        self.records.push(stored);
        Ok(self.next_id)
    }

    fn recent(&mut self, limit: usize) -> Result<Vec<InspectionRecord>> {
        Ok(self.records.iter().rev().take(limit).cloned().collect())
    }

    fn stats(&mut self) -> Result<InspectionStats> {
        let mut stats = InspectionStats::default();
        for record in &self.records {
            stats.count(&record.verdict);
        }
        Ok(stats)
    }

    fn clear(&mut self) -> Result<usize> {
        let removed = self.records.len();
        self.records.clear();
        Ok(removed)
    }

    fn prune_to(&mut self, max_records: usize) -> Result<usize> {
        let removed = self.records.len().saturating_sub(max_records);
        self.records.drain(..removed);
        Ok(removed)
    }
}
