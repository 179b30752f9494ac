use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, params};

use crate::{error::SinkError, model::WeatherRecord};

pub const TABLE_NAME: &str = "weather_observations";

const CREATE_TABLE_SQL: &str = "
    CREATE TABLE IF NOT EXISTS weather_observations (
        id                  INTEGER PRIMARY KEY AUTOINCREMENT,
        location_name       TEXT    NOT NULL,
        latitude            REAL    NOT NULL,
        longitude           REAL    NOT NULL,
        observation_time    TEXT    NOT NULL,
        retrieval_timestamp TEXT    NOT NULL,
        temperature_c       REAL    NOT NULL,
        wind_speed_kmh      REAL    NOT NULL,
        wind_direction_deg  REAL,
        weather_code        INTEGER NOT NULL,
        is_day              INTEGER,
        raw_payload_hash    TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_weather_observations_location
        ON weather_observations(location_name, observation_time);
";

const INSERT_SQL: &str = "
    INSERT INTO weather_observations (
        location_name, latitude, longitude, observation_time, retrieval_timestamp,
        temperature_c, wind_speed_kmh, wind_direction_deg, weather_code, is_day, raw_payload_hash
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
";

/// Append-only SQLite history of every recorded observation.
#[derive(Debug, Clone)]
pub struct RelationalStore {
    path: PathBuf,
}

impl RelationalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the database, creating parent directories and the table if absent.
    pub fn open(&self) -> Result<Connection, SinkError> {
        let parent = self.path.parent();
        if let Some(dir) = parent.filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        init_schema(&conn)?;
        Ok(conn)
    }

    /// Insert the whole batch in one transaction. Either every row becomes
    /// visible or none does. Rows are never deduplicated.
    pub fn write(&self, records: &[WeatherRecord]) -> Result<usize, SinkError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut conn = self.open()?;
        insert_batch(&mut conn, records)
    }

    pub fn row_count(&self) -> Result<u64, SinkError> {
        let conn = self.open()?;
        let sql = "SELECT COUNT(*) FROM weather_observations";
        let count: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

pub fn init_schema(conn: &Connection) -> Result<(), SinkError> {
    conn.execute_batch(CREATE_TABLE_SQL)?;
    Ok(())
}

fn insert_batch(conn: &mut Connection, records: &[WeatherRecord]) -> Result<usize, SinkError> {
    // Dropping the transaction without commit rolls it back.
    let tx = conn.transaction()?;
    let mut inserted = 0;
    {
        let mut stmt = tx.prepare_cached(INSERT_SQL)?;
        for r in records {
            inserted += stmt.execute(params![
                r.location_name,
                r.latitude,
                r.longitude,
                timestamp(r.observation_time, SecondsFormat::Secs),
                timestamp(r.retrieval_timestamp, SecondsFormat::Millis),
                r.temperature_c,
                r.wind_speed_kmh,
                r.wind_direction_deg,
                r.weather_code,
                r.is_day,
                r.raw_payload_hash,
            ])?;
        }
    }
    tx.commit()?;

    Ok(inserted)
}

fn timestamp(ts: DateTime<Utc>, precision: SecondsFormat) -> String {
    ts.to_rfc3339_opts(precision, true)
}
