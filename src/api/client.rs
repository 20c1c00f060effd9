use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::api::error::FetchError;
use crate::api::types::{PageRequest, RawKeyword, SearchRequest};
use crate::cli::config::FetchSettings;

/// Source of keyword pages. Implementations must be safe to call concurrently.
#[async_trait]
pub trait KeywordApiClient: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<RawKeyword>, FetchError>;
}

/// Client for the SpyFu phrase-matched keywords endpoint
pub struct SpyfuClient {
    client: Client,
    endpoint: String,
    country_code: String,
    adult_filter: bool,
}

impl SpyfuClient {
    pub fn new(settings: &FetchSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .user_agent(settings.user_agent.as_str())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            country_code: settings.country_code.clone(),
            adult_filter: settings.adult_filter,
        })
    }
}

#[async_trait]
impl KeywordApiClient for SpyfuClient {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<RawKeyword>, FetchError> {
        let body = SearchRequest::new(request, &self.country_code, self.adult_filter);

        debug!(
            query = %request.query,
            difficulty = request.difficulty,
            starting_row = request.starting_row,
            "Requesting keyword page"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let document: Value =
            serde_json::from_slice(&bytes).map_err(|e| FetchError::Malformed(e.to_string()))?;

        let keywords = match document.get("keywords") {
            Some(keywords @ Value::Array(_)) => keywords.clone(),
            _ => return Err(FetchError::MissingRecords),
        };

        serde_json::from_value(keywords).map_err(|e| FetchError::Malformed(e.to_string()))
    }
}
