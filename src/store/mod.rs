//! # Snapshot Archive
//!
//! SQLite-backed archive of resolved snapshots, unique on
//! `(lat, lon, timestamp)`. It doubles as the offline source: with no provider
//! credential the resolver serves the most recently inserted row for a
//! location.
//!
//! Inserts are idempotent: a row that already exists for the key is left
//! alone and the insert reports `false`. Several processes may share the file;
//! WAL mode and a busy timeout let SQLite serialise their writes.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, Connection, OptionalExtension, Row};
use thiserror::Error;
use tracing::{debug, info};

use crate::{EnvironmentalSnapshot, TidePhase};

mod migrations;

pub use migrations::CURRENT_SCHEMA_VERSION;

const COLUMNS: &str = "lat, lon, timestamp, wind_speed, wind_dir, wave_height, wave_period, \
                       tide_height, tide_phase, chlorophyll";

const BUSY_TIMEOUT: StdDuration = StdDuration::from_secs(5);

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("schema migration: {0}")]
    Migration(String),

    #[error("store connection lock poisoned")]
    Poisoned,
}

/// A single-column point update, for values resolved after the first write.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldUpdate {
    WindSpeed(Option<f64>),
    WindDir(Option<f64>),
    WaveHeight(Option<f64>),
    WavePeriod(Option<f64>),
    TideHeight(Option<f64>),
    TidePhase(Option<TidePhase>),
    Chlorophyll(Option<f64>),
}

impl FieldUpdate {
    fn column(&self) -> &'static str {
        match self {
            FieldUpdate::WindSpeed(_) => "wind_speed",
            FieldUpdate::WindDir(_) => "wind_dir",
            FieldUpdate::WaveHeight(_) => "wave_height",
            FieldUpdate::WavePeriod(_) => "wave_period",
            FieldUpdate::TideHeight(_) => "tide_height",
            FieldUpdate::TidePhase(_) => "tide_phase",
            FieldUpdate::Chlorophyll(_) => "chlorophyll",
        }
    }

    fn value(&self) -> Value {
        match self {
            FieldUpdate::WindSpeed(v)
            | FieldUpdate::WindDir(v)
            | FieldUpdate::WaveHeight(v)
            | FieldUpdate::WavePeriod(v)
            | FieldUpdate::TideHeight(v)
            | FieldUpdate::Chlorophyll(v) => v.map_or(Value::Null, Value::Real),
            FieldUpdate::TidePhase(p) => {
                p.map_or(Value::Null, |p| Value::Text(p.as_str().to_string()))
            }
        }
    }
}

pub struct SnapshotStore {
    conn: Mutex<Connection>,
}

impl SnapshotStore {
    /// Open (creating if needed) the archive at `path` and bring its schema up to date.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(journal_mode = %mode, "opened snapshot store");
        conn.busy_timeout(BUSY_TIMEOUT)?;
        migrations::run_migrations(&mut conn)?;

        info!(path = %path.display(), "snapshot store ready");
        Ok(SnapshotStore {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let mut conn = Connection::open_in_memory()?;
        migrations::run_migrations(&mut conn)?;
        Ok(SnapshotStore {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn schema_version(&self) -> Result<i32, StoreError> {
        let conn = self.lock()?;
        migrations::schema_version(&conn)
    }

    /// Insert a snapshot. Returns `false` when a row for the key already exists.
    pub fn insert(&self, snapshot: &EnvironmentalSnapshot) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let written = conn.execute(
            "INSERT OR IGNORE INTO snapshots (
                lat, lon, timestamp, wind_speed, wind_dir, wave_height, wave_period,
                tide_height, tide_phase, chlorophyll, recorded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                snapshot.lat,
                snapshot.lon,
                format_timestamp(snapshot.timestamp),
                snapshot.wind_speed,
                snapshot.wind_dir,
                snapshot.wave_height,
                snapshot.wave_period,
                snapshot.tide_height,
                snapshot.tide_phase.map(|p| p.as_str()),
                snapshot.chlorophyll,
                format_timestamp(Utc::now()),
            ],
        )?;

        if written == 0 {
            debug!(
                lat = snapshot.lat,
                lon = snapshot.lon,
                timestamp = %snapshot.timestamp,
                "snapshot already archived"
            );
        }
        Ok(written > 0)
    }

    /// The most recently inserted snapshot for a location, whatever its own timestamp.
    pub fn latest_for(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<Option<EnvironmentalSnapshot>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {COLUMNS} FROM snapshots WHERE lat = ?1 AND lon = ?2 ORDER BY id DESC LIMIT 1"
        );
        Ok(conn
            .query_row(&sql, params![lat, lon], row_to_snapshot)
            .optional()?)
    }

    pub fn get(
        &self,
        lat: f64,
        lon: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<EnvironmentalSnapshot>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {COLUMNS} FROM snapshots WHERE lat = ?1 AND lon = ?2 AND timestamp = ?3"
        );
        Ok(conn
            .query_row(&sql, params![lat, lon, format_timestamp(timestamp)], row_to_snapshot)
            .optional()?)
    }

    /// The snapshot nearest in time to `at` within `±window`, earliest on ties.
    ///
    /// Used to pair dive log entries with archived conditions; the binary
    /// exposes it as `--near-hours`.
    pub fn closest_to(
        &self,
        lat: f64,
        lon: f64,
        at: DateTime<Utc>,
        window: Duration,
    ) -> Result<Option<EnvironmentalSnapshot>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {COLUMNS} FROM snapshots
             WHERE lat = ?1 AND lon = ?2 AND timestamp BETWEEN ?3 AND ?4
             ORDER BY ABS(julianday(timestamp) - julianday(?5)), timestamp ASC
             LIMIT 1"
        );
        Ok(conn
            .query_row(
                &sql,
                params![
                    lat,
                    lon,
                    format_timestamp(at - window),
                    format_timestamp(at + window),
                    format_timestamp(at),
                ],
                row_to_snapshot,
            )
            .optional()?)
    }

    /// Set one column of an existing row. Returns `false` when no row matches the key.
    pub fn update_field(
        &self,
        lat: f64,
        lon: f64,
        timestamp: DateTime<Utc>,
        update: FieldUpdate,
    ) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "UPDATE snapshots SET {} = ?1 WHERE lat = ?2 AND lon = ?3 AND timestamp = ?4",
            update.column()
        );
        let changed = conn.execute(
            &sql,
            params![update.value(), lat, lon, format_timestamp(timestamp)],
        )?;
        Ok(changed > 0)
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM snapshots", [], |row| row.get(0))?;
        Ok(n.max(0) as u64)
    }
}

fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn row_to_snapshot(row: &Row<'_>) -> rusqlite::Result<EnvironmentalSnapshot> {
    let timestamp: String = row.get(2)?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

    let tide_phase: Option<String> = row.get(8)?;
    let tide_phase = tide_phase
        .map(|p| p.parse::<TidePhase>())
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                8,
                Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            )
        })?;

    Ok(EnvironmentalSnapshot {
        lat: row.get(0)?,
        lon: row.get(1)?,
        timestamp,
        wind_speed: row.get(3)?,
        wind_dir: row.get(4)?,
        wave_height: row.get(5)?,
        wave_period: row.get(6)?,
        tide_height: row.get(7)?,
        tide_phase,
        chlorophyll: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 16, hour, 0, 0).unwrap()
    }

    #[test]
    fn fresh_store_is_at_current_schema() {
        let store = SnapshotStore::open_in_memory().unwrap();
        assert_eq!(store.schema_version().unwrap(), CURRENT_SCHEMA_VERSION);
    }

    fn snapshot(hour: u32) -> EnvironmentalSnapshot {
        EnvironmentalSnapshot {
            wind_speed: Some(11.7),
            wind_dir: Some(210.0),
            wave_height: Some(3.6),
            wave_period: Some(7.8),
            tide_height: Some(-0.4),
            tide_phase: Some(TidePhase::Falling),
            ..EnvironmentalSnapshot::empty(49.22, -2.13, at(hour))
        }
    }

    #[test]
    fn insert_is_idempotent_on_key() {
        let store = SnapshotStore::open_in_memory().unwrap();
        assert!(store.insert(&snapshot(13)).unwrap());

        let mut conflicting = snapshot(13);
        conflicting.wind_speed = Some(99.0);
        assert!(!store.insert(&conflicting).unwrap());

        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.get(49.22, -2.13, at(13)).unwrap(), Some(snapshot(13)));
    }

    #[test]
    fn latest_is_by_insertion_not_timestamp() {
        let store = SnapshotStore::open_in_memory().unwrap();
        store.insert(&snapshot(18)).unwrap();
        store.insert(&snapshot(6)).unwrap();

        let latest = store.latest_for(49.22, -2.13).unwrap().unwrap();
        assert_eq!(latest.timestamp, at(6));
        assert!(store.latest_for(50.0, -2.13).unwrap().is_none());
    }

    #[test]
    fn nulls_round_trip_as_none() {
        let store = SnapshotStore::open_in_memory().unwrap();
        let bare = EnvironmentalSnapshot::empty(49.22, -2.13, at(9));
        store.insert(&bare).unwrap();
        assert_eq!(store.get(49.22, -2.13, at(9)).unwrap(), Some(bare));
    }

    #[test]
    fn update_field_enriches_existing_row() {
        let store = SnapshotStore::open_in_memory().unwrap();
        store.insert(&snapshot(13)).unwrap();

        assert!(store
            .update_field(49.22, -2.13, at(13), FieldUpdate::Chlorophyll(Some(0.31)))
            .unwrap());
        assert!(store
            .update_field(49.22, -2.13, at(13), FieldUpdate::TidePhase(Some(TidePhase::Slack)))
            .unwrap());

        let row = store.get(49.22, -2.13, at(13)).unwrap().unwrap();
        assert_eq!(row.chlorophyll, Some(0.31));
        assert_eq!(row.tide_phase, Some(TidePhase::Slack));

        assert!(!store
            .update_field(49.22, -2.13, at(14), FieldUpdate::Chlorophyll(Some(0.5)))
            .unwrap());
    }

    #[test]
    fn closest_to_respects_window() {
        let store = SnapshotStore::open_in_memory().unwrap();
        store.insert(&snapshot(6)).unwrap();
        store.insert(&snapshot(10)).unwrap();

        let found = store
            .closest_to(49.22, -2.13, at(9), Duration::hours(6))
            .unwrap()
            .unwrap();
        assert_eq!(found.timestamp, at(10));

        assert!(store
            .closest_to(49.22, -2.13, at(20), Duration::hours(6))
            .unwrap()
            .is_none());
    }

    #[test]
    fn migrations_add_columns_without_touching_old_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("visibility.db");

        {
            let mut conn = Connection::open(&path).unwrap();
            migrations::migrate_to(&mut conn, 1).unwrap();
            conn.execute(
                "INSERT INTO snapshots (lat, lon, timestamp, wind_speed) VALUES (?1, ?2, ?3, ?4)",
                params![49.22, -2.13, "2023-09-01T08:00:00Z", 9.5],
            )
            .unwrap();
        }

        let store = SnapshotStore::open(&path).unwrap();
        assert_eq!(store.schema_version().unwrap(), CURRENT_SCHEMA_VERSION);

        let old = store.latest_for(49.22, -2.13).unwrap().unwrap();
        assert_eq!(old.wind_speed, Some(9.5));
        assert_eq!(old.tide_height, None);
        assert_eq!(old.tide_phase, None);
        assert_eq!(old.chlorophyll, None);

        // Reopening is a no-op.
        drop(store);
        let store = SnapshotStore::open(&path).unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn newer_schema_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("future.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION + 1)
                .unwrap();
        }
        assert!(matches!(
            SnapshotStore::open(&path),
            Err(StoreError::Migration(_))
        ));
    }
}
