//! Inline autocomplete suggestions

use crate::{ParrotError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Shorter queries never reach the endpoint
pub const MIN_QUERY_LEN: usize = 2;

#[derive(Debug, Serialize)]
struct SuggestionRequest<'a> {
    query: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct SuggestionResponse {
    #[serde(default)]
    suggestions: Vec<String>,
}

/// Whether a query is long enough to ask for completions
pub fn is_suggestible(query: &str) -> bool {
    query.trim().chars().count() >= MIN_QUERY_LEN
}

#[derive(Clone)]
pub struct SuggestionsClient {
    http: Client,
    endpoint: String,
}

impl SuggestionsClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ParrotError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    /// Fetch completions for `query`. Failures yield an empty list.
    pub async fn fetch(&self, query: &str) -> Vec<String> {
        if !is_suggestible(query) {
            return Vec::new();
        }

        match self.try_fetch(query).await {
            Ok(suggestions) => {
                debug!("{} suggestions for {:?}", suggestions.len(), query);
                suggestions
            }
            Err(e) => {
                warn!("Error fetching suggestions: {}", e);
                Vec::new()
            }
        }
    }

    async fn try_fetch(&self, query: &str) -> Result<Vec<String>> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&SuggestionRequest { query })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ParrotError::Http {
                status: response.status().as_u16(),
                message: "Failed to fetch suggestions".into(),
            });
        }

        let body: SuggestionResponse = response.json().await?;
        Ok(body.suggestions)
    }
}
