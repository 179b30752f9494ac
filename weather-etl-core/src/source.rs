use async_trait::async_trait;
use std::fmt::Debug;

use crate::{error::AttemptError, model::Location};

pub mod open_meteo;

pub use open_meteo::OpenMeteoSource;

/// Decoded body of one successful API response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiPayload {
    pub body: serde_json::Value,
    /// SHA-256 of the raw body bytes, hex encoded.
    pub sha256: String,
}

/// A remote API that reports current conditions for a coordinate.
///
/// Implementations make exactly one request per call; retrying is the
/// extractor's job.
#[async_trait]
pub trait WeatherSource: Send + Sync + Debug {
    async fn fetch_current(&self, location: &Location) -> Result<ApiPayload, AttemptError>;
}
