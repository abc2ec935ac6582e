//! Deterministic in-process providers.
//!
//! Used by the test suites across the workspace to drive the research loop
//! without network access. Compiled for this crate's tests and for
//! dependents that enable the `test-util` feature.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use deepresearch_shared::{ProviderError, SearchHit};

use crate::{Condenser, EmbeddingProvider, PageFetcher, SearchProvider};

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Search provider answering from a fixed table.
///
/// Lookup order: per-query hits, then the fallback list (empty by default).
/// Every query seen is recorded in call order.
#[derive(Debug, Default)]
pub struct StaticSearch {
    by_query: HashMap<String, Vec<SearchHit>>,
    fallback: Vec<SearchHit>,
    failing: HashSet<String>,
    seen: Mutex<Vec<String>>,
}

impl StaticSearch {
    /// A provider that returns no hits for any query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `hits` for every query without a specific entry.
    pub fn always(hits: Vec<SearchHit>) -> Self {
        Self {
            fallback: hits,
            ..Self::default()
        }
    }

    /// Return `hits` for exactly `query`.
    pub fn with_hits(mut self, query: impl Into<String>, hits: Vec<SearchHit>) -> Self {
        self.by_query.insert(query.into(), hits);
        self
    }

    /// Fail with a network error for exactly `query`.
    pub fn failing_on(mut self, query: impl Into<String>) -> Self {
        self.failing.insert(query.into());
        self
    }

    /// Queries received so far, in call order.
    pub fn queries(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl SearchProvider for StaticSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ProviderError> {
        self.seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(query.to_string());

        if self.failing.contains(query) {
            return Err(ProviderError::Network(format!("scripted failure for {query:?}")));
        }
        Ok(self
            .by_query
            .get(query)
            .unwrap_or(&self.fallback)
            .clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}

// ---------------------------------------------------------------------------
// Condensers
// ---------------------------------------------------------------------------

/// Always fails, as an unconfigured condenser would.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingCondenser;

#[async_trait]
impl Condenser for FailingCondenser {
    async fn condense(&self, _text: &str) -> Result<String, ProviderError> {
        Err(ProviderError::MissingCredential {
            env_var: "OPENAI_API_KEY".into(),
        })
    }

    fn name(&self) -> &str {
        "failing"
    }
}

// ---------------------------------------------------------------------------
// Embeddings
// ---------------------------------------------------------------------------

/// Embeds everything as the zero vector.
#[derive(Debug, Clone, Copy)]
pub struct ZeroEmbeddings {
    dims: usize,
}

impl ZeroEmbeddings {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait]
impl EmbeddingProvider for ZeroEmbeddings {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(vec![0.0; self.dims])
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

/// Always fails; callers see the zero-vector fallback.
#[derive(Debug, Clone, Copy)]
pub struct FailingEmbeddings {
    dims: usize,
}

impl FailingEmbeddings {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait]
impl EmbeddingProvider for FailingEmbeddings {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        Err(ProviderError::Network("scripted embedding failure".into()))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

/// Hashed bag-of-words embedding.
///
/// Each lowercase alphanumeric word adds 1.0 to bucket `fnv1a(word) % dims`,
/// so texts sharing words have positive cosine similarity and texts with
/// disjoint vocabularies (barring collisions) are orthogonal.
#[derive(Debug)]
pub struct KeywordEmbeddings {
    dims: usize,
    calls: AtomicUsize,
}

impl KeywordEmbeddings {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut vector = vec![0.0f32; self.dims];
        if self.dims == 0 {
            return Ok(vector);
        }
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = fnv1a(&word.to_lowercase()) % self.dims as u64;
            vector[bucket as usize] += 1.0;
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
    })
}

// ---------------------------------------------------------------------------
// Pages
// ---------------------------------------------------------------------------

/// Page fetcher answering from a URL → text table; unknown URLs fail.
#[derive(Debug, Default)]
pub struct StaticPages {
    pages: HashMap<String, String>,
}

impl StaticPages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, text: impl Into<String>) -> Self {
        self.pages.insert(url.into(), text.into());
        self
    }
}

#[async_trait]
impl PageFetcher for StaticPages {
    async fn fetch_text(&self, url: &str) -> Result<String, ProviderError> {
        self.pages.get(url).cloned().ok_or_else(|| ProviderError::Http {
            status: 404,
            body: format!("no page for {url}"),
        })
    }
}
