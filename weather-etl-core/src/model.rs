use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FailureKind, NormalizationError};

/// A configured point to observe. Identity is `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
        }
    }
}

/// Unparsed API payload for one location, stamped when it was retrieved.
#[derive(Debug, Clone)]
pub struct RawObservation {
    pub location_name: String,
    pub payload: serde_json::Value,
    pub retrieved_at: DateTime<Utc>,
    /// SHA-256 of the response body, hex encoded.
    pub payload_hash: Option<String>,
    pub attempts: u32,
}

/// One normalized row: one per location per run.
///
/// Field names double as the table-file header and the relational column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub location_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub observation_time: DateTime<Utc>,
    pub retrieval_timestamp: DateTime<Utc>,
    pub temperature_c: f64,
    pub wind_speed_kmh: f64,
    pub wind_direction_deg: Option<f64>,
    pub weather_code: i64,
    pub is_day: Option<bool>,
    pub raw_payload_hash: Option<String>,
}

impl WeatherRecord {
    pub const COLUMNS: [&'static str; 11] = [
        "location_name",
        "latitude",
        "longitude",
        "observation_time",
        "retrieval_timestamp",
        "temperature_c",
        "wind_speed_kmh",
        "wind_direction_deg",
        "weather_code",
        "is_day",
        "raw_payload_hash",
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionFailure {
    pub location_name: String,
    pub error_kind: FailureKind,
    pub attempts_made: u32,
    pub last_error_message: String,
}

impl ExtractionFailure {
    pub fn cancelled(location: &Location, attempts_made: u32) -> Self {
        Self {
            location_name: location.name.clone(),
            error_kind: FailureKind::Cancelled,
            attempts_made,
            last_error_message: "run cancelled before location settled".to_string(),
        }
    }

    pub fn from_normalization(
        location: &Location,
        attempts_made: u32,
        err: &NormalizationError,
    ) -> Self {
        Self {
            location_name: location.name.clone(),
            error_kind: err.kind(),
            attempts_made,
            last_error_message: err.to_string(),
        }
    }
}

/// What happened when a batch was handed to a sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum SinkOutcome<T> {
    Written(T),
    /// Empty batch: the sink was not touched.
    Skipped,
    Failed(String),
}

impl<T> SinkOutcome<T> {
    pub fn is_failed(&self) -> bool {
        matches!(self, SinkOutcome::Failed(_))
    }

    pub fn written(&self) -> Option<&T> {
        match self {
            SinkOutcome::Written(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_timestamp: DateTime<Utc>,
    pub succeeded: Vec<WeatherRecord>,
    pub failed: Vec<ExtractionFailure>,
    pub table_file: SinkOutcome<PathBuf>,
    pub relational: SinkOutcome<usize>,
}

impl RunReport {
    pub fn table_file_path(&self) -> Option<&Path> {
        self.table_file.written().map(PathBuf::as_path)
    }

    pub fn relational_rows_written(&self) -> usize {
        self.relational.written().copied().unwrap_or(0)
    }

    pub fn has_sink_failure(&self) -> bool {
        self.table_file.is_failed() || self.relational.is_failed()
    }

    pub fn location_count(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}
