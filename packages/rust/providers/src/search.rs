//! SerpAPI-backed web search.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, instrument};

use deepresearch_shared::{ProviderError, ResearchError, Result, SearchConfig, SearchHit, read_api_key};

use crate::rate_limit::RateLimiter;
use crate::{SearchProvider, USER_AGENT, send_error};

/// Shape of the fields we read from a SerpAPI response.
#[derive(Debug, Deserialize)]
struct SerpResponse {
    #[serde(default)]
    organic_results: Vec<SearchHit>,
    #[serde(default)]
    error: Option<String>,
}

/// Google results via SerpAPI.
pub struct SerpApiSearch {
    client: Client,
    config: SearchConfig,
    api_key: Option<String>,
    limiter: RateLimiter,
}

impl SerpApiSearch {
    /// Build the adapter, reading the key from `config.api_key_env`.
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ResearchError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: read_api_key(&config.api_key_env),
            limiter: RateLimiter::from_millis(config.min_interval_ms),
            config: config.clone(),
        })
    }

    /// Override the key resolved from the environment.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl SearchProvider for SerpApiSearch {
    #[instrument(skip(self), fields(engine = %self.config.engine))]
    async fn search(&self, query: &str) -> std::result::Result<Vec<SearchHit>, ProviderError> {
        let Some(api_key) = self.api_key.as_deref() else {
            error!(env_var = %self.config.api_key_env, "search API key not set, returning no results");
            return Ok(Vec::new());
        };

        self.limiter.acquire().await;

        let num = self.config.num_results.to_string();
        let response = self
            .client
            .get(&self.config.endpoint)
            .query(&[
                ("engine", self.config.engine.as_str()),
                ("q", query),
                ("api_key", api_key),
                ("num", num.as_str()),
                ("hl", self.config.language.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.without_url().to_string()))?;

        let response = send_error(response).await?;

        let body: SerpResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::malformed(format!("search response: {e}")))?;

        if body.organic_results.is_empty() {
            if let Some(message) = body.error {
                return Err(ProviderError::malformed(message));
            }
        }

        let mut hits = body.organic_results;
        hits.truncate(self.config.num_results as usize);
        debug!(hits = hits.len(), "search complete");
        Ok(hits)
    }

    fn name(&self) -> &str {
        "serpapi"
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config_for(server: &MockServer) -> SearchConfig {
        SearchConfig {
            endpoint: format!("{}/search.json", server.uri()),
            min_interval_ms: 0,
            timeout_secs: 5,
            ..SearchConfig::default()
        }
    }

    #[tokio::test]
    async fn parses_organic_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search.json"))
            .and(query_param("q", "AI ethics"))
            .and(query_param("api_key", "test-key"))
            .and(query_param("engine", "google"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "organic_results": [
                    { "title": "Ethics", "link": "https://a.test", "snippet": "first" },
                    { "title": "Bias", "link": "https://b.test" }
                ]
            })))
            .mount(&server)
            .await;

        let search = SerpApiSearch::new(&config_for(&server))
            .unwrap()
            .with_api_key(Some("test-key".into()));
        let hits = search.search("AI ethics").await.expect("search");

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0], SearchHit::new("Ethics", "https://a.test", "first"));
        assert_eq!(hits[1].snippet, "");
    }

    #[tokio::test]
    async fn missing_key_returns_empty_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let search = SerpApiSearch::new(&config_for(&server)).unwrap().with_api_key(None);
        assert!(!search.has_credential());
        let hits = search.search("anything").await.expect("no error");
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn http_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid API key"))
            .mount(&server)
            .await;

        let search = SerpApiSearch::new(&config_for(&server))
            .unwrap()
            .with_api_key(Some("bad".into()));
        let err = search.search("q").await.unwrap_err();
        assert!(matches!(err, ProviderError::Http { status: 401, .. }));
    }

    #[tokio::test]
    async fn provider_error_field_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "error": "Your account has run out of searches." })),
            )
            .mount(&server)
            .await;

        let search = SerpApiSearch::new(&config_for(&server))
            .unwrap()
            .with_api_key(Some("k".into()));
        let err = search.search("q").await.unwrap_err();
        assert!(err.to_string().contains("run out of searches"));
    }

    #[tokio::test]
    async fn results_are_capped_at_num_results() {
        let server = MockServer::start().await;
        let many: Vec<_> = (0..8)
            .map(|i| serde_json::json!({ "title": format!("t{i}"), "link": "u", "snippet": "s" }))
            .collect();
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "organic_results": many })),
            )
            .mount(&server)
            .await;

        let search = SerpApiSearch::new(&config_for(&server))
            .unwrap()
            .with_api_key(Some("k".into()));
        assert_eq!(search.search("q").await.unwrap().len(), 5);
    }
}
