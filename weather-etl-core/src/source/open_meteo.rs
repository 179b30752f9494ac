use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use sha2::{Digest, Sha256};

use crate::{
    config::ResolvedConfig,
    error::{AttemptError, ConfigError, FailureKind},
    model::Location,
};

use super::{ApiPayload, WeatherSource};

/// Open-Meteo forecast endpoint, or anything that speaks its query format.
#[derive(Debug, Clone)]
pub struct OpenMeteoSource {
    base_url: Url,
    query: Vec<(String, String)>,
    max_body_bytes: usize,
    http: Client,
}

impl OpenMeteoSource {
    pub fn from_config(config: &ResolvedConfig) -> Result<Self, ConfigError> {
        let base_url = config.parsed_base_url()?;
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url,
            query: config.query_params.clone(),
            max_body_bytes: config.max_body_bytes,
            http,
        })
    }

    fn payload_too_large(&self, seen: u64) -> AttemptError {
        AttemptError::new(
            FailureKind::PayloadTooLarge,
            format!(
                "response body exceeds limit of {} bytes (got at least {seen})",
                self.max_body_bytes
            ),
        )
    }
}

#[async_trait]
impl WeatherSource for OpenMeteoSource {
    async fn fetch_current(&self, location: &Location) -> Result<ApiPayload, AttemptError> {
        let mut res = self
            .http
            .get(self.base_url.clone())
            .query(&[
                ("latitude", location.latitude),
                ("longitude", location.longitude),
            ])
            .query(&self.query)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = res.status();
        if !status.is_success() {
            // First chunk only; the status decides the kind.
            let head = res.chunk().await.ok().flatten().unwrap_or_default();
            return Err(AttemptError::new(
                classify_status(status),
                format!(
                    "request for {} failed with status {}: {}",
                    location.name,
                    status,
                    truncate_body(&String::from_utf8_lossy(&head)),
                ),
            ));
        }

        let limit = self.max_body_bytes as u64;
        if let Some(len) = res.content_length().filter(|len| *len > limit) {
            return Err(self.payload_too_large(len));
        }

        // Chunked bodies carry no length up front, so the cap is enforced while reading.
        let mut body = Vec::new();
        while let Some(chunk) = res.chunk().await.map_err(classify_transport_error)? {
            let seen = body.len() + chunk.len();
            if seen > self.max_body_bytes {
                return Err(self.payload_too_large(seen as u64));
            }
            body.extend_from_slice(&chunk);
        }

        let parsed: serde_json::Value = serde_json::from_slice(&body).map_err(|e| {
            AttemptError::new(
                FailureKind::MalformedResponse,
                format!("invalid JSON body: {e}"),
            )
        })?;

        Ok(ApiPayload {
            body: parsed,
            sha256: hex::encode(Sha256::digest(&body)),
        })
    }
}

fn classify_status(status: StatusCode) -> FailureKind {
    if status == StatusCode::TOO_MANY_REQUESTS {
        FailureKind::RateLimited
    } else if status == StatusCode::PAYLOAD_TOO_LARGE {
        FailureKind::PayloadTooLarge
    } else if status.is_server_error() {
        FailureKind::ServerError
    } else {
        FailureKind::ClientError
    }
}

fn classify_transport_error(err: reqwest::Error) -> AttemptError {
    let kind = if err.is_timeout() {
        FailureKind::Timeout
    } else if err.is_builder() {
        // Bad URL or request construction; retrying will not help.
        FailureKind::ClientError
    } else {
        FailureKind::Connection
    };

    AttemptError::new(kind, err.to_string())
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
