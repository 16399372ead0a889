use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::classify::{Category, ClassificationOutcome};
use crate::monitor::TriggerReport;
use crate::report::ResultSink;

/// One persisted trigger, classified or not.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DropEvent {
    /// Unix seconds, local wall clock at the trigger.
    pub created_at: i64,
    pub sequence: u64,
    pub change_pixels: u32,
    pub snapshot: Option<String>,
    pub category: Option<Category>,
    pub confidence: Option<f32>,
    /// Failure cause when no category is available.
    pub failure: Option<String>,
    pub detail: Option<String>,
}

impl DropEvent {
    pub fn from_report(report: &TriggerReport) -> Self {
        let (category, confidence, failure, detail) = match &report.outcome {
            ClassificationOutcome::Classified(p) => {
                (Some(p.category), Some(p.confidence), None, None)
            }
            ClassificationOutcome::Unavailable(u) => (
                None,
                None,
                Some(u.cause.as_str().to_string()),
                Some(u.detail.clone()),
            ),
        };
        Self {
            created_at: report.triggered_at.timestamp(),
            sequence: report.sequence,
            change_pixels: report.change_pixels,
            snapshot: report
                .snapshot
                .as_ref()
                .map(|p| p.display().to_string()),
            category,
            confidence,
            failure,
            detail,
        }
    }
}

/// Per-category count plus the number of unavailable results.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CategoryTotals {
    pub by_category: BTreeMap<String, u64>,
    pub unavailable: u64,
}

pub trait EventLogStore {
    fn append(&mut self, event: &DropEvent) -> Result<()>;

    /// Most recent events first.
    fn recent(&self, limit: usize) -> Result<Vec<DropEvent>>;

    fn category_totals(&self) -> Result<CategoryTotals>;

    /// Delete events older than `retention`, measured from `now_s`.
    fn enforce_retention(&mut self, retention: Duration, now_s: i64) -> Result<usize>;
}

pub struct SqliteEventLog {
    conn: Connection,
}

impl SqliteEventLog {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS drop_events (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              created_at INTEGER NOT NULL,
              sequence INTEGER NOT NULL,
              change_pixels INTEGER NOT NULL,
              snapshot TEXT,
              category TEXT,
              confidence REAL,
              failure TEXT,
              detail TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_drop_events_created ON drop_events(created_at);
            "#,
        )?;
        Ok(())
    }

    pub fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM drop_events", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Timestamp of the newest event, if any.
    pub fn last_event_at(&self) -> Result<Option<i64>> {
        let ts = self
            .conn
            .query_row(
                "SELECT created_at FROM drop_events ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(ts)
    }
}

impl EventLogStore for SqliteEventLog {
    fn append(&mut self, event: &DropEvent) -> Result<()> {
        let sequence = i64::try_from(event.sequence)
            .map_err(|_| anyhow!("event sequence exceeds i64 range"))?;
        self.conn.execute(
            r#"
            INSERT INTO drop_events(created_at, sequence, change_pixels, snapshot, category, confidence, failure, detail)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                event.created_at,
                sequence,
                event.change_pixels,
                event.snapshot,
                event.category.map(|c| c.as_str()),
                event.confidence.map(f64::from),
                event.failure,
                event.detail
            ],
        )?;
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<DropEvent>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT created_at, sequence, change_pixels, snapshot, category, confidence, failure, detail
            FROM drop_events ORDER BY id DESC LIMIT ?1
            "#,
        )?;
        let mut rows = stmt.query(params![limit as i64])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let category: Option<String> = row.get(4)?;
            let category = category.map(|c| c.parse::<Category>()).transpose()?;
            let confidence: Option<f64> = row.get(5)?;
            let sequence: i64 = row.get(1)?;
            out.push(DropEvent {
                created_at: row.get(0)?,
                sequence: sequence as u64,
                change_pixels: row.get(2)?,
                snapshot: row.get(3)?,
                category,
                confidence: confidence.map(|c| c as f32),
                failure: row.get(6)?,
                detail: row.get(7)?,
            });
        }
        Ok(out)
    }

    fn category_totals(&self) -> Result<CategoryTotals> {
        let mut totals = CategoryTotals::default();
        for category in Category::ALL {
            totals.by_category.insert(category.as_str().to_string(), 0);
        }
        let mut stmt = self
            .conn
            .prepare("SELECT category, COUNT(*) FROM drop_events GROUP BY category")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let category: Option<String> = row.get(0)?;
            let count: i64 = row.get(1)?;
            match category {
                Some(name) => {
                    *totals.by_category.entry(name).or_insert(0) += count as u64;
                }
                None => totals.unavailable += count as u64,
            }
        }
        Ok(totals)
    }

    fn enforce_retention(&mut self, retention: Duration, now_s: i64) -> Result<usize> {
        let cutoff = retention_cutoff(retention, now_s);
        let deleted = self.conn.execute(
            "DELETE FROM drop_events WHERE created_at < ?1",
            params![cutoff],
        )?;
        Ok(deleted)
    }
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryEventLog {
    events: Vec<DropEvent>,
}

impl EventLogStore for InMemoryEventLog {
    fn append(&mut self, event: &DropEvent) -> Result<()> {
        self.events.push(event.clone());
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<DropEvent>> {
        Ok(self.events.iter().rev().take(limit).cloned().collect())
    }

    fn category_totals(&self) -> Result<CategoryTotals> {
        let mut totals = CategoryTotals::default();
        for category in Category::ALL {
            totals.by_category.insert(category.as_str().to_string(), 0);
        }
        for event in &self.events {
            match event.category {
                Some(category) => {
                    *totals
                        .by_category
                        .entry(category.as_str().to_string())
                        .or_insert(0) += 1;
                }
                None => totals.unavailable += 1,
            }
        }
        Ok(totals)
    }

    fn enforce_retention(&mut self, retention: Duration, now_s: i64) -> Result<usize> {
        let cutoff = retention_cutoff(retention, now_s);
        let before = self.events.len();
        self.events.retain(|event| event.created_at >= cutoff);
        Ok(before - self.events.len())
    }
}

/// Oldest `created_at` kept by a retention window ending at `now_s`.
fn retention_cutoff(retention: Duration, now_s: i64) -> i64 {
    i64::try_from(retention.as_secs())
        .map(|secs| now_s.saturating_sub(secs))
        .unwrap_or(i64::MIN)
}

/// Adapts any `EventLogStore` into a monitor result sink.
pub struct EventLogSink<L: EventLogStore + Send> {
    log: L,
}

impl<L: EventLogStore + Send> EventLogSink<L> {
    pub fn new(log: L) -> Self {
        Self { log }
    }

    pub fn into_inner(self) -> L {
        self.log
    }
}

impl<L: EventLogStore + Send> ResultSink for EventLogSink<L> {
    fn name(&self) -> &'static str {
        "event-log"
    }

    fn record(&mut self, report: &TriggerReport) -> Result<()> {
        self.log.append(&DropEvent::from_report(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classified(created_at: i64, sequence: u64, category: Category, confidence: f32) -> DropEvent {
        DropEvent {
            created_at,
            sequence,
            change_pixels: 900,
            snapshot: Some(format!("snapshot_{}.jpg", sequence)),
            category: Some(category),
            confidence: Some(confidence),
            failure: None,
            detail: None,
        }
    }

    fn unavailable(created_at: i64, sequence: u64) -> DropEvent {
        DropEvent {
            created_at,
            sequence,
            change_pixels: 1200,
            snapshot: None,
            category: None,
            confidence: None,
            failure: Some("capture".to_string()),
            detail: Some("no frame available after settle delay".to_string()),
        }
    }

    fn exercise(store: &mut dyn EventLogStore) {
        store.append(&classified(100, 1, Category::Paper, 0.75)).unwrap();
        store.append(&classified(200, 2, Category::Paper, 0.5)).unwrap();
        store.append(&unavailable(300, 3)).unwrap();
        store.append(&classified(400, 4, Category::Organic, 0.25)).unwrap();

        let recent = store.recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0], classified(400, 4, Category::Organic, 0.25));
        assert_eq!(recent[1], unavailable(300, 3));

        let totals = store.category_totals().unwrap();
        assert_eq!(totals.by_category["paper"], 2);
        assert_eq!(totals.by_category["organic"], 1);
        assert_eq!(totals.by_category["plastic"], 0);
        assert_eq!(totals.unavailable, 1);

        let deleted = store
            .enforce_retention(Duration::from_secs(150), 400)
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.recent(10).unwrap().len(), 2);
    }

    #[test]
    fn sqlite_event_log_round_trip() {
        let mut store = SqliteEventLog::open_in_memory().unwrap();
        exercise(&mut store);
        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(store.last_event_at().unwrap(), Some(400));
    }

    #[test]
    fn in_memory_event_log_matches_sqlite() {
        let mut store = InMemoryEventLog::default();
        exercise(&mut store);
    }

    #[test]
    fn oversized_retention_keeps_every_event() {
        let huge = Duration::from_secs(u64::MAX);
        let mut sqlite = SqliteEventLog::open_in_memory().unwrap();
        let mut memory = InMemoryEventLog::default();
        let stores: [&mut dyn EventLogStore; 2] = [&mut sqlite, &mut memory];
        for store in stores {
            store
                .append(&classified(1_700_000_000, 1, Category::Paper, 0.8))
                .unwrap();
            assert_eq!(store.enforce_retention(huge, 1_700_000_100).unwrap(), 0);
            assert_eq!(
                store
                    .enforce_retention(Duration::from_secs(i64::MAX as u64), i64::MIN + 5)
                    .unwrap(),
                0
            );
            assert_eq!(store.recent(10).unwrap().len(), 1);
        }
        assert_eq!(retention_cutoff(Duration::from_secs(100), 1_000), 900);
    }

    #[test]
    fn sqlite_event_log_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.db");
        let path = path.to_str().unwrap();
        {
            let mut store = SqliteEventLog::open(path).unwrap();
            store.append(&classified(10, 1, Category::Plastic, 0.9)).unwrap();
        }
        let store = SqliteEventLog::open(path).unwrap();
        assert_eq!(store.recent(5).unwrap()[0].category, Some(Category::Plastic));
    }
}
