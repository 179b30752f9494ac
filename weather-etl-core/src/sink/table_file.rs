use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};

use crate::{error::SinkError, model::WeatherRecord};

const FILE_PREFIX: &str = "weather_data_";
const MAX_NAME_COLLISIONS: u32 = 10_000;

/// Writes each run's batch to its own CSV file for audit.
#[derive(Debug, Clone)]
pub struct TableFileSink {
    dir: PathBuf,
}

impl TableFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Base file name for a run, e.g. `weather_data_20240101T120000Z.csv`.
    pub fn file_name_for(run_timestamp: DateTime<Utc>) -> String {
        let stamp = run_timestamp.format("%Y%m%dT%H%M%SZ");
        format!("{FILE_PREFIX}{stamp}.csv")
    }

    /// Header plus one row per record, in input order.
    ///
    /// Returns `Ok(None)` without touching the disk when `records` is empty.
    /// Existing files are never overwritten; a numeric suffix is added instead.
    pub fn write(
        &self,
        records: &[WeatherRecord],
        run_timestamp: DateTime<Utc>,
    ) -> Result<Option<PathBuf>, SinkError> {
        if records.is_empty() {
            return Ok(None);
        }

        fs::create_dir_all(&self.dir)?;
        let (path, file) = self.create_unique(run_timestamp)?;

        if let Err(err) = write_rows(file, records) {
            let _ = fs::remove_file(&path);
            return Err(err);
        }

        Ok(Some(path))
    }

    fn create_unique(&self, run_timestamp: DateTime<Utc>) -> Result<(PathBuf, File), SinkError> {
        let base = Self::file_name_for(run_timestamp);
        let stem = base.trim_end_matches(".csv");

        for n in 0..MAX_NAME_COLLISIONS {
            let name = if n == 0 {
                base.clone()
            } else {
                format!("{stem}_{n}.csv")
            };
            let path = self.dir.join(name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(SinkError::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free file name for {base} in {}", self.dir.display()),
        )))
    }
}

fn write_rows(file: File, records: &[WeatherRecord]) -> Result<(), SinkError> {
    let mut wtr = csv::Writer::from_writer(file);
    for record in records {
        wtr.serialize(record)?;
    }

    let file = wtr.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}
