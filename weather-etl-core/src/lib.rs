//! Core library for the weather ETL pipeline.
//!
//! This crate defines:
//! - Retrying extraction of current conditions from an HTTP weather API
//! - Normalization of raw payloads into flat [`WeatherRecord`] rows
//! - Two independent sinks: a per-run CSV file and an append-only SQLite table
//! - The run orchestrator, [`run_once`], which isolates per-location failures
//!
//! Configuration loading, log setup and scheduling live with the caller
//! (see `weather-etl-cli`). Events are reported through a [`PipelineObserver`].

pub mod config;
pub mod error;
pub mod extract;
pub mod model;
pub mod observer;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod transform;

pub use config::ResolvedConfig;
pub use error::{AttemptError, ConfigError, FailureKind, NormalizationError, SinkError};
pub use extract::{Extractor, RetryPolicy};
pub use model::{ExtractionFailure, Location, RawObservation, RunReport, SinkOutcome, WeatherRecord};
pub use observer::{AttemptOutcome, NoopObserver, PipelineObserver, TracingObserver};
pub use pipeline::{Pipeline, run_once, run_once_at};
pub use sink::{RelationalStore, TableFileSink};
pub use source::{ApiPayload, OpenMeteoSource, WeatherSource};
pub use transform::normalize;

pub use tokio_util::sync::CancellationToken;
