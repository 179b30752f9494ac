use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use weather_etl_core::{
    CancellationToken, PipelineObserver, ResolvedConfig, RunReport, TracingObserver, run_once_at,
};

use crate::{logging, settings::Settings};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(
    name = "weather-etl",
    version,
    about = "Weather ETL pipeline for the Open-Meteo API"
)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum Command {
    /// Run the pipeline once (default).
    Run,

    /// Run now, then again on a fixed interval until interrupted.
    Schedule {
        /// Overrides `schedule.interval_minutes` from the config file.
        #[arg(long)]
        interval_minutes: Option<u64>,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let (mut settings, path) = Settings::load(self.config.as_deref())?;
        let _guard = logging::init(&settings.paths.log_dir, self.verbose)?;
        info!(config = %path.display(), "configuration loaded");

        let config = settings.to_resolved()?;
        let observer: Arc<dyn PipelineObserver> = Arc::new(TracingObserver);

        let cancel = CancellationToken::new();
        cancel_on_interrupt(cancel.clone());

        match self.command.unwrap_or(Command::Run) {
            Command::Run => {
                let report = run_once_at(&config, observer, Utc::now(), &cancel)
                    .await
                    .context("Pipeline run aborted")?;
                check_report(&report)
            }
            Command::Schedule { interval_minutes } => {
                if let Some(minutes) = interval_minutes {
                    settings.schedule.interval_minutes = minutes;
                }
                schedule(&config, observer, settings.interval()?, &cancel).await
            }
        }
    }
}

/// First run fires immediately; later ticks that fall behind are skipped.
async fn schedule(
    config: &ResolvedConfig,
    observer: Arc<dyn PipelineObserver>,
    every: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(interval_secs = every.as_secs(), "scheduler started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let report = run_once_at(config, observer.clone(), Utc::now(), cancel)
                    .await
                    .context("Pipeline run aborted")?;
                if let Err(err) = check_report(&report) {
                    warn!(error = %err, "run finished with failures");
                }
            }
        }
    }

    info!("scheduler stopped");
    Ok(())
}

fn cancel_on_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            cancel.cancel();
        }
    });
}

/// A run is unhealthy when every location failed or a sink could not write.
fn check_report(report: &RunReport) -> Result<()> {
    info!(
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        table_file = ?report.table_file_path(),
        rows = report.relational_rows_written(),
        "run summary"
    );

    if report.succeeded.is_empty() && !report.failed.is_empty() {
        bail!("All {} locations failed", report.failed.len());
    }
    if report.has_sink_failure() {
        bail!(
            "Sink failure (table file: {:?}, relational store: {:?})",
            report.table_file,
            report.relational
        );
    }

    Ok(())
}
