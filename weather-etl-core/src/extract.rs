use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::{
    config::ResolvedConfig,
    model::{ExtractionFailure, Location, RawObservation},
    observer::{AttemptOutcome, PipelineObserver},
    source::WeatherSource,
};

/// Bounded retry with pure exponential backoff, no jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Seconds.
    pub backoff_factor: f64,
    pub max_backoff: Option<Duration>,
}

impl RetryPolicy {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_factor: config.backoff_factor,
            max_backoff: config.max_backoff,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Wait before retry `k` (1-based): `backoff_factor * 2^(k-1)` seconds.
    pub fn delay_before_retry(&self, k: u32) -> Duration {
        let exponent = k.saturating_sub(1).min(1023) as i32;
        let secs = self.backoff_factor * 2f64.powi(exponent);
        let delay = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);

        match self.max_backoff {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}

/// Fetches one location's payload, retrying transient failures.
#[derive(Debug, Clone)]
pub struct Extractor {
    source: Arc<dyn WeatherSource>,
    policy: RetryPolicy,
    observer: Arc<dyn PipelineObserver>,
}

impl Extractor {
    pub fn new(
        source: Arc<dyn WeatherSource>,
        policy: RetryPolicy,
        observer: Arc<dyn PipelineObserver>,
    ) -> Self {
        Self {
            source,
            policy,
            observer,
        }
    }

    /// Every attempt is reported to the observer. Cancellation stops the
    /// in-flight attempt and any pending backoff.
    pub async fn fetch(
        &self,
        location: &Location,
        cancel: &CancellationToken,
    ) -> Result<RawObservation, ExtractionFailure> {
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(ExtractionFailure::cancelled(location, attempt));
            }
            attempt += 1;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(ExtractionFailure::cancelled(location, attempt));
                }
                result = self.source.fetch_current(location) => result,
            };

            let error = match result {
                Ok(payload) => {
                    self.observer
                        .on_attempt(location, attempt, &AttemptOutcome::Succeeded);
                    return Ok(RawObservation {
                        location_name: location.name.clone(),
                        payload: payload.body,
                        retrieved_at: Utc::now(),
                        payload_hash: Some(payload.sha256),
                        attempts: attempt,
                    });
                }
                Err(error) => error,
            };

            if !error.is_transient() || attempt >= max_attempts {
                let outcome = AttemptOutcome::GaveUp {
                    error: error.clone(),
                };
                self.observer.on_attempt(location, attempt, &outcome);
                return Err(ExtractionFailure {
                    location_name: location.name.clone(),
                    error_kind: error.kind,
                    attempts_made: attempt,
                    last_error_message: error.message,
                });
            }

            let delay = self.policy.delay_before_retry(attempt);
            let outcome = AttemptOutcome::Retrying { error, delay };
            self.observer.on_attempt(location, attempt, &outcome);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(ExtractionFailure::cancelled(location, attempt));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
