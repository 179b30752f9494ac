use anyhow::{Context, Result, anyhow, ensure};
use directories::ProjectDirs;
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use weather_etl_core::{Location, ResolvedConfig, config};

pub const CONFIG_ENV_VAR: &str = "WEATHER_ETL_CONFIG";

/// API and retry settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub timeout_seconds: f64,
    pub max_retries: u32,
    pub backoff_factor: f64,
    /// Unset keeps the backoff uncapped.
    pub max_backoff_seconds: Option<f64>,
    pub concurrency: usize,
    pub max_body_bytes: usize,
    /// Extra query parameters, e.g. `current_weather = "true"`.
    pub query: BTreeMap<String, String>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: config::DEFAULT_BASE_URL.to_string(),
            timeout_seconds: config::DEFAULT_TIMEOUT.as_secs_f64(),
            max_retries: config::DEFAULT_MAX_RETRIES,
            backoff_factor: config::DEFAULT_BACKOFF_FACTOR,
            max_backoff_seconds: None,
            concurrency: 1,
            max_body_bytes: config::DEFAULT_MAX_BODY_BYTES,
            query: BTreeMap::from([("current_weather".to_string(), "true".to_string())]),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub data_dir: PathBuf,
    pub database: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            database: PathBuf::from("data/weather.db"),
            log_dir: PathBuf::from("logs"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    pub interval_minutes: u64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            interval_minutes: 60,
        }
    }
}

/// Top-level configuration file.
///
/// Example TOML:
/// [api]
/// max_retries = 3
///
/// [[locations]]
/// name = "Paris"
/// latitude = 48.8566
/// longitude = 2.3522
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api: ApiSettings,
    pub paths: PathSettings,
    pub schedule: ScheduleSettings,
    pub locations: Vec<Location>,
}

impl Settings {
    /// Load settings from the resolved path. A missing file is an error.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, PathBuf)> {
        let path = resolve_config_path(explicit, std::env::var_os(CONFIG_ENV_VAR))?;
        let display = path.display();

        let contents = fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read config file: {}\n\
                 Hint: pass --config <file> or set {CONFIG_ENV_VAR}.",
                display
            )
        })?;

        let settings = Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {display}"))?;

        Ok((settings, path))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Convert into the typed configuration the pipeline consumes.
    pub fn to_resolved(&self) -> Result<ResolvedConfig> {
        let api = &self.api;

        let paths = &self.paths;
        let locations = self.locations.clone();
        let mut cfg = ResolvedConfig::new(locations, &paths.data_dir, &paths.database);
        cfg.base_url = api.base_url.clone();
        cfg.request_timeout = seconds("api.timeout_seconds", api.timeout_seconds)?;
        cfg.max_retries = api.max_retries;
        cfg.backoff_factor = api.backoff_factor;
        cfg.max_backoff = api
            .max_backoff_seconds
            .map(|s| seconds("api.max_backoff_seconds", s))
            .transpose()?;
        cfg.concurrency = api.concurrency;
        cfg.max_body_bytes = api.max_body_bytes;
        cfg.query_params = api
            .query
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        cfg.validate().context("Invalid pipeline configuration")?;
        Ok(cfg)
    }

    pub fn interval(&self) -> Result<Duration> {
        ensure!(
            self.schedule.interval_minutes > 0,
            "schedule.interval_minutes must be at least 1"
        );
        Ok(Duration::from_secs(self.schedule.interval_minutes * 60))
    }
}

fn seconds(field: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value).map_err(|e| anyhow!("invalid {field} = {value}: {e}"))
}

/// Explicit flag, then the environment variable, then the platform config dir.
pub fn resolve_config_path(
    explicit: Option<&Path>,
    env_value: Option<OsString>,
) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(value) = env_value.filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(value));
    }

    let dirs = ProjectDirs::from("dev", "weather-etl", "weather-etl")
        .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

    Ok(dirs.config_dir().join("config.toml"))
}
