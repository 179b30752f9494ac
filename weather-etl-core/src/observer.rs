//! Event hooks the pipeline reports to.
//!
//! The core never installs a logger. Callers pass a [`PipelineObserver`];
//! [`TracingObserver`] forwards everything as structured `tracing` events.

use std::{fmt::Debug, path::Path, time::Duration};

use tracing::{debug, error, info, warn};

use crate::{
    error::AttemptError,
    model::{ExtractionFailure, Location, RunReport, WeatherRecord},
};

/// Result of a single HTTP attempt for one location.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Succeeded,
    /// Transient failure; the next attempt starts after `delay`.
    Retrying {
        error: AttemptError,
        delay: Duration,
    },
    /// No further attempts will be made.
    GaveUp { error: AttemptError },
}

#[derive(Debug, Clone, Copy)]
pub enum LocationResult<'a> {
    Success(&'a WeatherRecord),
    Failure(&'a ExtractionFailure),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkName {
    TableFile,
    RelationalStore,
}

impl SinkName {
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkName::TableFile => "table_file",
            SinkName::RelationalStore => "relational_store",
        }
    }
}

impl std::fmt::Display for SinkName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum SinkEvent<'a> {
    FileWritten(&'a Path),
    RowsWritten(usize),
    Skipped,
    Failed(&'a str),
}

/// All methods default to doing nothing.
pub trait PipelineObserver: Send + Sync + Debug {
    fn on_attempt(&self, _location: &Location, _attempt: u32, _outcome: &AttemptOutcome) {}

    fn on_location_result(&self, _location: &Location, _result: LocationResult<'_>) {}

    fn on_sink_result(&self, _sink: SinkName, _event: SinkEvent<'_>) {}

    fn on_run_complete(&self, _report: &RunReport) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_attempt(&self, location: &Location, attempt: u32, outcome: &AttemptOutcome) {
        match outcome {
            AttemptOutcome::Succeeded => {
                debug!(location = %location.name, attempt, "fetched current weather");
            }
            AttemptOutcome::Retrying { error, delay } => {
                warn!(
                    location = %location.name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "attempt failed, retrying"
                );
            }
            AttemptOutcome::GaveUp { error } => {
                error!(location = %location.name, attempt, error = %error, "giving up on location");
            }
        }
    }

    fn on_location_result(&self, location: &Location, result: LocationResult<'_>) {
        match result {
            LocationResult::Success(record) => info!(
                location = %location.name,
                temperature_c = record.temperature_c,
                weather_code = record.weather_code,
                "location recorded"
            ),
            LocationResult::Failure(failure) => warn!(
                location = %location.name,
                kind = %failure.error_kind,
                attempts = failure.attempts_made,
                error = %failure.last_error_message,
                "location failed"
            ),
        }
    }

    fn on_sink_result(&self, sink: SinkName, event: SinkEvent<'_>) {
        match event {
            SinkEvent::FileWritten(path) => {
                info!(%sink, path = %path.display(), "table file written")
            }
            SinkEvent::RowsWritten(rows) => info!(%sink, rows, "rows inserted"),
            SinkEvent::Skipped => info!(%sink, "empty batch, sink skipped"),
            SinkEvent::Failed(err) => error!(%sink, error = err, "sink write failed"),
        }
    }

    fn on_run_complete(&self, report: &RunReport) {
        info!(
            run = %report.run_timestamp.to_rfc3339(),
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            rows = report.relational_rows_written(),
            "run complete"
        );
    }
}
