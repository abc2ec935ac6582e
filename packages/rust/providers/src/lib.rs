//! External collaborators of the research loop.
//!
//! Each collaborator is a narrow async trait so the loop can be driven by
//! real HTTP adapters or by the in-process fakes in `fakes` (`test-util`):
//! - [`SearchProvider`]: query → ordered hits ([`SerpApiSearch`])
//! - [`Condenser`]: raw text → short synopsis ([`OpenAiCondenser`], or
//!   [`IdentityCondenser`] without a chat model)
//! - [`EmbeddingProvider`]: text → fixed-length vector ([`OpenAiEmbeddings`])
//! - [`PageFetcher`]: URL → visible page text ([`HttpPageFetcher`])
//!
//! Adapters report every failure as a [`ProviderError`]. The `*_or_*` helpers
//! turn those failures into the documented degraded value so callers never
//! abort on a single bad call.

#[cfg(any(test, feature = "test-util"))]
pub mod fakes;
mod fetch;
mod openai;
mod passthrough;
mod rate_limit;
mod search;

use async_trait::async_trait;
use tracing::warn;

use deepresearch_shared::{ProviderError, SearchHit};

pub use fetch::{HttpPageFetcher, extract_text};
pub use openai::{OpenAiCondenser, OpenAiEmbeddings};
pub use passthrough::IdentityCondenser;
pub use rate_limit::RateLimiter;
pub use search::SerpApiSearch;

/// User-Agent sent by every HTTP adapter.
pub const USER_AGENT: &str = concat!("DeepResearch/", env!("CARGO_PKG_VERSION"));

/// Longest error body kept in [`ProviderError::Http`].
const MAX_ERROR_BODY: usize = 512;

// ---------------------------------------------------------------------------
// Collaborator contracts
// ---------------------------------------------------------------------------

/// Web search.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Ordered hits for `query`. An unconfigured provider returns `Ok(vec![])`.
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ProviderError>;

    fn name(&self) -> &str;
}

/// Reduces raw text to a short synopsis.
#[async_trait]
pub trait Condenser: Send + Sync {
    async fn condense(&self, text: &str) -> Result<String, ProviderError>;

    fn name(&self) -> &str;
}

/// Maps text to a vector of fixed, declared length.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Length of every vector this provider returns.
    fn dimensions(&self) -> usize;
}

/// Retrieves the readable text behind a search hit.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String, ProviderError>;
}

// ---------------------------------------------------------------------------
// Fallbacks
// ---------------------------------------------------------------------------

/// Search, treating any failure as zero results.
pub async fn search_or_empty(provider: &dyn SearchProvider, query: &str) -> Vec<SearchHit> {
    match provider.search(query).await {
        Ok(hits) => hits,
        Err(e) => {
            warn!(provider = provider.name(), query, error = %e, "search failed, treating as no results");
            Vec::new()
        }
    }
}

/// Condense, falling back to the input text unchanged.
pub async fn condense_or_identity(condenser: &dyn Condenser, text: &str) -> String {
    match condenser.condense(text).await {
        Ok(synopsis) => synopsis,
        Err(e) => {
            warn!(condenser = condenser.name(), error = %e, "condense failed, keeping raw text");
            text.to_string()
        }
    }
}

/// Embed, falling back to an all-zero vector of the declared dimensionality.
pub async fn embed_or_zero(embedder: &dyn EmbeddingProvider, text: &str) -> Vec<f32> {
    match embedder.embed(text).await {
        Ok(vector) => vector,
        Err(e) => {
            warn!(error = %e, "embedding failed, using zero vector");
            vec![0.0; embedder.dimensions()]
        }
    }
}

/// Fetch page text, or `None` when the page cannot be read.
pub async fn fetch_or_none(fetcher: &dyn PageFetcher, url: &str) -> Option<String> {
    if url.is_empty() {
        return None;
    }
    match fetcher.fetch_text(url).await {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(url, error = %e, "page fetch failed, using snippet");
            None
        }
    }
}

/// Pass through a success response, or convert it into [`ProviderError::Http`].
pub(crate) async fn send_error(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let mut body = response.text().await.unwrap_or_default();
    if let Some((idx, _)) = body.char_indices().nth(MAX_ERROR_BODY) {
        body.truncate(idx);
    }
    Err(ProviderError::Http {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::fakes::{FailingCondenser, FailingEmbeddings, StaticSearch};
    use super::*;

    #[tokio::test]
    async fn search_failure_becomes_empty() {
        let search = StaticSearch::new().failing_on("broken");
        assert!(search_or_empty(&search, "broken").await.is_empty());
    }

    #[tokio::test]
    async fn condense_failure_is_identity() {
        let out = condense_or_identity(&FailingCondenser, "Ethics: s").await;
        assert_eq!(out, "Ethics: s");
    }

    #[tokio::test]
    async fn embed_failure_is_zero_vector_of_declared_length() {
        let out = embed_or_zero(&FailingEmbeddings::new(4), "anything").await;
        assert_eq!(out, vec![0.0; 4]);
    }

    #[test]
    fn user_agent_is_versioned() {
        assert!(USER_AGENT.starts_with("DeepResearch/"));
    }
}
