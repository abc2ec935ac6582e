//! OpenAI-compatible chat (condensation) and embedding adapters.
//!
//! Both talk to `{base_url}/chat/completions` and `{base_url}/embeddings`
//! with bearer auth, so any compatible gateway works.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use deepresearch_shared::{OpenAiConfig, ProviderError, ResearchError, Result, read_api_key};

use crate::rate_limit::RateLimiter;
use crate::{Condenser, EmbeddingProvider, USER_AGENT, send_error};

/// System prompt for result condensation.
const CONDENSE_PROMPT: &str =
    "You are a helpful research assistant. Summarize this search result in 1-2 clear sentences.";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

// ---------------------------------------------------------------------------
// Shared client
// ---------------------------------------------------------------------------

/// Connection details shared by the chat and embedding adapters.
struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    api_key_env: String,
}

impl OpenAiClient {
    fn new(config: &OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ResearchError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: read_api_key(&config.api_key_env),
            api_key_env: config.api_key_env.clone(),
        })
    }

    fn key(&self) -> std::result::Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ProviderError::MissingCredential {
                env_var: self.api_key_env.clone(),
            })
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> std::result::Result<R, ProviderError> {
        let key = self.key()?;
        let response = self
            .client
            .post(format!("{}/{endpoint}", self.base_url))
            .bearer_auth(key)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        send_error(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::malformed(format!("{endpoint} response: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Condenser
// ---------------------------------------------------------------------------

/// Chat-completion condenser producing a 1–2 sentence synopsis.
pub struct OpenAiCondenser {
    inner: OpenAiClient,
    model: String,
    temperature: f32,
    max_tokens: u32,
    limiter: RateLimiter,
}

impl OpenAiCondenser {
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        Ok(Self {
            inner: OpenAiClient::new(config)?,
            model: config.chat_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            limiter: RateLimiter::from_millis(config.min_interval_ms),
        })
    }

    /// Override the key resolved from the environment.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.inner.api_key = api_key;
        self
    }

    pub fn has_credential(&self) -> bool {
        self.inner.api_key.is_some()
    }
}

#[async_trait]
impl Condenser for OpenAiCondenser {
    #[instrument(skip_all, fields(model = %self.model, chars = text.len()))]
    async fn condense(&self, text: &str) -> std::result::Result<String, ProviderError> {
        // Fail before queueing on the limiter.
        self.inner.key()?;
        self.limiter.acquire().await;

        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: CONDENSE_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response: ChatResponse = self.inner.post("chat/completions", &request).await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ProviderError::malformed("chat response has no content"))?;

        debug!(synopsis_chars = content.len(), "condensed");
        Ok(content)
    }

    fn name(&self) -> &str {
        "openai-chat"
    }
}

// ---------------------------------------------------------------------------
// Embeddings
// ---------------------------------------------------------------------------

/// Embedding adapter with a declared, fixed dimensionality.
pub struct OpenAiEmbeddings {
    inner: OpenAiClient,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbeddings {
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        if config.embedding_dimensions == 0 {
            return Err(ResearchError::config("embedding_dimensions must be positive"));
        }
        Ok(Self {
            inner: OpenAiClient::new(config)?,
            model: config.embedding_model.clone(),
            dimensions: config.embedding_dimensions,
        })
    }

    /// Override the key resolved from the environment.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.inner.api_key = api_key;
        self
    }

    pub fn has_credential(&self) -> bool {
        self.inner.api_key.is_some()
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: text,
        };
        let response: EmbeddingResponse = self.inner.post("embeddings", &request).await?;

        let vector = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ProviderError::malformed("embedding response is missing data"))?;

        if vector.len() != self.dimensions {
            return Err(ProviderError::malformed(format!(
                "expected {} dimensions, got {}",
                self.dimensions,
                vector.len()
            )));
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config_for(server: &MockServer) -> OpenAiConfig {
        OpenAiConfig {
            base_url: format!("{}/v1/", server.uri()),
            embedding_dimensions: 3,
            min_interval_ms: 0,
            timeout_secs: 5,
            ..OpenAiConfig::default()
        }
    }

    #[tokio::test]
    async fn condense_returns_trimmed_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-3.5-turbo",
                "max_tokens": 100
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": "  Short synopsis.  " } }]
            })))
            .mount(&server)
            .await;

        let condenser = OpenAiCondenser::new(&config_for(&server))
            .unwrap()
            .with_api_key(Some("sk-test".into()));
        let out = condenser.condense("Ethics: long snippet").await.expect("condense");
        assert_eq!(out, "Short synopsis.");
    }

    #[tokio::test]
    async fn condense_without_key_fails_fast() {
        let server = MockServer::start().await;
        let condenser = OpenAiCondenser::new(&config_for(&server))
            .unwrap()
            .with_api_key(None);
        let err = condenser.condense("text").await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingCredential { .. }));
    }

    #[tokio::test]
    async fn condense_empty_choices_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })))
            .mount(&server)
            .await;

        let condenser = OpenAiCondenser::new(&config_for(&server))
            .unwrap()
            .with_api_key(Some("k".into()));
        let err = condenser.condense("text").await.unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn embed_reads_first_vector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "index": 0, "embedding": [0.1, 0.2, 0.3] }]
            })))
            .mount(&server)
            .await;

        let embedder = OpenAiEmbeddings::new(&config_for(&server))
            .unwrap()
            .with_api_key(Some("k".into()));
        assert_eq!(embedder.dimensions(), 3);
        let v = embedder.embed("hello").await.expect("embed");
        assert_eq!(v, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn embed_rejects_wrong_dimensions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "embedding": [0.1, 0.2] }]
            })))
            .mount(&server)
            .await;

        let embedder = OpenAiEmbeddings::new(&config_for(&server))
            .unwrap()
            .with_api_key(Some("k".into()));
        let err = embedder.embed("hello").await.unwrap_err();
        assert!(err.to_string().contains("expected 3 dimensions"));
    }

    #[tokio::test]
    async fn server_error_maps_to_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let embedder = OpenAiEmbeddings::new(&config_for(&server))
            .unwrap()
            .with_api_key(Some("k".into()));
        let err = embedder.embed("hello").await.unwrap_err();
        assert_eq!(
            err,
            ProviderError::Http {
                status: 503,
                body: "overloaded".into()
            }
        );
    }

    #[test]
    fn zero_dimensions_is_config_error() {
        let config = OpenAiConfig {
            embedding_dimensions: 0,
            ..OpenAiConfig::default()
        };
        assert!(OpenAiEmbeddings::new(&config).is_err());
    }
}
