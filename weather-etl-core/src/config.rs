use std::{collections::HashSet, path::PathBuf, time::Duration};

use reqwest::Url;

use crate::{error::ConfigError, model::Location};

pub const DEFAULT_BASE_URL: &str = "https://api.open-meteo.com/v1/forecast";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Fully resolved settings for one run.
///
/// The core never reads configuration files; a loader builds this value and
/// hands it to [`crate::run_once`].
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub base_url: String,
    /// Applied to each HTTP attempt separately.
    pub request_timeout: Duration,
    pub max_retries: u32,
    /// Seconds. The wait before retry `k` is `backoff_factor * 2^(k-1)`.
    pub backoff_factor: f64,
    /// Optional ceiling on a single backoff delay. Unset means uncapped.
    pub max_backoff: Option<Duration>,
    /// Extra query parameters sent with every request, after the coordinates.
    pub query_params: Vec<(String, String)>,
    pub max_body_bytes: usize,
    /// How many locations may be in flight at once.
    pub concurrency: usize,
    pub locations: Vec<Location>,
    pub table_dir: PathBuf,
    pub database_path: PathBuf,
}

impl ResolvedConfig {
    /// Defaults for everything except what must come from the caller.
    pub fn new(
        locations: Vec<Location>,
        table_dir: impl Into<PathBuf>,
        database_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            max_backoff: None,
            query_params: vec![("current_weather".to_string(), "true".to_string())],
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            concurrency: 1,
            locations,
            table_dir: table_dir.into(),
            database_path: database_path.into(),
        }
    }

    /// Reject settings that would make every attempt pointless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.locations.is_empty() {
            return Err(ConfigError::NoLocations);
        }

        let mut seen = HashSet::new();
        for loc in &self.locations {
            if loc.name.trim().is_empty() {
                return Err(ConfigError::BlankLocationName);
            }
            if !seen.insert(loc.name.as_str()) {
                return Err(ConfigError::DuplicateLocation(loc.name.clone()));
            }
            let lat_ok = loc.latitude.is_finite() && (-90.0..=90.0).contains(&loc.latitude);
            let lon_ok = loc.longitude.is_finite() && (-180.0..=180.0).contains(&loc.longitude);
            if !lat_ok || !lon_ok {
                return Err(ConfigError::InvalidCoordinates {
                    name: loc.name.clone(),
                    latitude: loc.latitude,
                    longitude: loc.longitude,
                });
            }
        }

        self.parsed_base_url()?;

        if !self.backoff_factor.is_finite() || self.backoff_factor < 0.0 {
            return Err(ConfigError::InvalidBackoff(self.backoff_factor));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }

        Ok(())
    }

    pub fn parsed_base_url(&self) -> Result<Url, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason,
        };

        let url = Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(invalid(format!("unsupported scheme '{other}'"))),
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(invalid("missing host".to_string()));
        }

        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(locations: Vec<Location>) -> ResolvedConfig {
        ResolvedConfig::new(locations, "data", "data/weather.db")
    }

    fn paris() -> Location {
        Location::new("Paris", 48.85, 2.35)
    }

    #[test]
    fn defaults_validate() {
        let cfg = config_with(vec![paris()]);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.concurrency, 1);
        let expected = vec![("current_weather".to_string(), "true".to_string())];
        assert_eq!(cfg.query_params, expected);
    }

    #[test]
    fn empty_location_list_is_fatal() {
        let cfg = config_with(vec![]);
        assert_eq!(cfg.validate().unwrap_err(), ConfigError::NoLocations);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let cfg = config_with(vec![paris(), Location::new("Paris", 1.0, 1.0)]);
        let err = cfg.validate().unwrap_err();
        assert_eq!(err, ConfigError::DuplicateLocation("Paris".into()));
    }

    #[test]
    fn out_of_range_coordinates_are_rejected() {
        let cfg = config_with(vec![Location::new("Nowhere", 91.0, 0.0)]);
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCoordinates { .. }));
    }

    #[test]
    fn base_url_must_be_http() {
        let mut cfg = config_with(vec![paris()]);
        cfg.base_url = "ftp://example.com/forecast".into();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("unsupported scheme"));

        cfg.base_url = "not a url".into();
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBaseUrl { .. }));
    }

    #[test]
    fn negative_backoff_and_zero_concurrency_are_rejected() {
        let mut cfg = config_with(vec![paris()]);
        cfg.backoff_factor = -1.0;
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidBackoff(-1.0)));

        cfg.backoff_factor = 0.0;
        cfg.concurrency = 0;
        assert_eq!(cfg.validate().unwrap_err(), ConfigError::ZeroConcurrency);
    }
}
