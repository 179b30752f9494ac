use std::{path::PathBuf, sync::Arc};

use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use tokio::task::{self, JoinError};
use tokio_util::sync::CancellationToken;

use crate::{
    config::ResolvedConfig,
    error::{ConfigError, SinkError},
    extract::{Extractor, RetryPolicy},
    model::{ExtractionFailure, Location, RunReport, SinkOutcome, WeatherRecord},
    observer::{LocationResult, PipelineObserver, SinkEvent, SinkName},
    sink::{RelationalStore, TableFileSink},
    source::{OpenMeteoSource, WeatherSource},
    transform::normalize,
};

/// Runs extract -> normalize for every location, then loads the successes.
#[derive(Debug)]
pub struct Pipeline {
    locations: Vec<Location>,
    extractor: Extractor,
    table: TableFileSink,
    store: RelationalStore,
    observer: Arc<dyn PipelineObserver>,
    concurrency: usize,
}

impl Pipeline {
    pub fn from_config(
        config: &ResolvedConfig,
        observer: Arc<dyn PipelineObserver>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let source = OpenMeteoSource::from_config(config)?;
        Self::with_source(config, Arc::new(source), observer)
    }

    pub fn with_source(
        config: &ResolvedConfig,
        source: Arc<dyn WeatherSource>,
        observer: Arc<dyn PipelineObserver>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let policy = RetryPolicy::from_config(config);

        Ok(Self {
            locations: config.locations.clone(),
            extractor: Extractor::new(source, policy, observer.clone()),
            table: TableFileSink::new(&config.table_dir),
            store: RelationalStore::new(&config.database_path),
            observer,
            concurrency: config.concurrency,
        })
    }

    /// Never fails: every per-location and per-sink problem ends up in the report.
    ///
    /// Locations that have not settled when `cancel` fires are reported as
    /// `Cancelled`; whatever did succeed is still loaded.
    pub async fn run(&self, run_timestamp: DateTime<Utc>, cancel: &CancellationToken) -> RunReport {
        let outcomes: Vec<_> = stream::iter(&self.locations)
            .map(|location| self.settle(location, cancel))
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut succeeded = Vec::with_capacity(outcomes.len());
        let mut failed = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(record) => succeeded.push(record),
                Err(failure) => failed.push(failure),
            }
        }

        let (table_file, relational) = self.load(&succeeded, run_timestamp).await;

        let report = RunReport {
            run_timestamp,
            succeeded,
            failed,
            table_file,
            relational,
        };
        self.observer.on_run_complete(&report);
        report
    }

    async fn settle(
        &self,
        location: &Location,
        cancel: &CancellationToken,
    ) -> Result<WeatherRecord, ExtractionFailure> {
        let result = self.process(location, cancel).await;

        let event = match &result {
            Ok(record) => LocationResult::Success(record),
            Err(failure) => LocationResult::Failure(failure),
        };
        self.observer.on_location_result(location, event);

        result
    }

    async fn process(
        &self,
        location: &Location,
        cancel: &CancellationToken,
    ) -> Result<WeatherRecord, ExtractionFailure> {
        let raw = self.extractor.fetch(location, cancel).await?;

        normalize(&raw, location, raw.retrieved_at).map_err(|err| {
            ExtractionFailure::from_normalization(location, raw.attempts, &err)
        })
    }

    async fn load(
        &self,
        records: &[WeatherRecord],
        run_timestamp: DateTime<Utc>,
    ) -> (SinkOutcome<PathBuf>, SinkOutcome<usize>) {
        if records.is_empty() {
            self.emit(SinkName::TableFile, SinkEvent::Skipped);
            self.emit(SinkName::RelationalStore, SinkEvent::Skipped);
            return (SinkOutcome::Skipped, SinkOutcome::Skipped);
        }

        let batch: Arc<[WeatherRecord]> = records.into();

        let table = self.table.clone();
        let rows = batch.clone();
        let table_task = task::spawn_blocking(move || table.write(&rows, run_timestamp));

        let store = self.store.clone();
        let store_task = task::spawn_blocking(move || store.write(&batch));

        let (table_result, store_result) = tokio::join!(table_task, store_task);

        let table_outcome = match joined(table_result) {
            Ok(Some(path)) => {
                self.emit(SinkName::TableFile, SinkEvent::FileWritten(&path));
                SinkOutcome::Written(path)
            }
            Ok(None) => {
                self.emit(SinkName::TableFile, SinkEvent::Skipped);
                SinkOutcome::Skipped
            }
            Err(err) => self.sink_failed(SinkName::TableFile, err),
        };

        let store_outcome = match joined(store_result) {
            Ok(rows) => {
                self.emit(SinkName::RelationalStore, SinkEvent::RowsWritten(rows));
                SinkOutcome::Written(rows)
            }
            Err(err) => self.sink_failed(SinkName::RelationalStore, err),
        };

        (table_outcome, store_outcome)
    }

    fn emit(&self, sink: SinkName, event: SinkEvent<'_>) {
        self.observer.on_sink_result(sink, event);
    }

    fn sink_failed<T>(&self, sink: SinkName, err: SinkError) -> SinkOutcome<T> {
        let message = err.to_string();
        self.emit(sink, SinkEvent::Failed(&message));
        SinkOutcome::Failed(message)
    }
}

fn joined<T>(result: Result<Result<T, SinkError>, JoinError>) -> Result<T, SinkError> {
    result.map_err(|e| SinkError::Task(e.to_string()))?
}

/// One complete run against the configured API, stamped with the current time.
pub async fn run_once(
    config: &ResolvedConfig,
    observer: Arc<dyn PipelineObserver>,
) -> Result<RunReport, ConfigError> {
    run_once_at(config, observer, Utc::now(), &CancellationToken::new()).await
}

/// Like [`run_once`], with an explicit run timestamp and cancellation token.
///
/// Only configuration problems fail the call.
pub async fn run_once_at(
    config: &ResolvedConfig,
    observer: Arc<dyn PipelineObserver>,
    run_timestamp: DateTime<Utc>,
    cancel: &CancellationToken,
) -> Result<RunReport, ConfigError> {
    let pipeline = Pipeline::from_config(config, observer)?;
    Ok(pipeline.run(run_timestamp, cancel).await)
}
