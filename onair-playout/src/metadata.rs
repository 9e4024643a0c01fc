//! Track metadata API client
//!
//! Track and cue point metadata is owned by an external service. The engine
//! only reads it: `GET {base_url}/tracks/{id}` returns the track record with
//! `cuePoints` as a JSON-encoded string (or an object, or null).

use crate::config::MetadataConfig;
use crate::error::{Error, Result};
use onair_common::Track;
use std::time::Duration;

const USER_AGENT: &str = concat!("onair-playout/", env!("CARGO_PKG_VERSION"));

/// Client for the external metadata API
pub struct MetadataClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl MetadataClient {
    pub fn new(config: &MetadataConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Metadata(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch one track by id
    pub async fn fetch_track(&self, track_id: &str) -> Result<Track> {
        let url = format!("{}/tracks/{}", self.base_url, track_id);
        tracing::debug!(track_id = %track_id, url = %url, "Querying metadata API");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Metadata(format!("request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::Metadata(format!("track {} not found", track_id)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Metadata(format!(
                "metadata API returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Metadata(format!("reading response: {}", e)))?;
        let track = parse_track(&body)?;

        tracing::info!(
            track_id = %track.id,
            title = %track.title,
            has_cues = track.cue_points.is_some(),
            "Retrieved track metadata"
        );
        Ok(track)
    }
}

/// Parse a metadata API track record
pub fn parse_track(body: &str) -> Result<Track> {
    serde_json::from_str(body).map_err(|e| Error::Metadata(format!("invalid track record: {}", e)))
}
