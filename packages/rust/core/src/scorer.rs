//! Novelty scoring of candidate queries against accumulated knowledge.

use std::sync::Arc;

use tracing::debug;

use deepresearch_providers::{EmbeddingProvider, embed_or_zero};

/// Cosine similarity between two vectors.
/// Returns 0.0 for empty, mismatched, or zero-magnitude vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut mag_a, mut mag_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }
    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom < f64::EPSILON {
        0.0
    } else {
        (dot / denom).clamp(-1.0, 1.0)
    }
}

/// `1 - mean(cosine)` between `query` and every knowledge vector, clamped to `[0, 1]`.
///
/// No knowledge vectors means maximal novelty.
pub fn novelty(query: &[f32], knowledge: &[Vec<f32>]) -> f64 {
    if knowledge.is_empty() {
        return 1.0;
    }
    let total: f64 = knowledge.iter().map(|k| cosine_similarity(query, k)).sum();
    let mean = total / knowledge.len() as f64;
    (1.0 - mean).clamp(0.0, 1.0)
}

/// Embedding-backed novelty scorer.
///
/// Embedding failures become zero vectors, which count as maximally
/// dissimilar; scoring never fails.
#[derive(Clone)]
pub struct SimilarityScorer {
    embedder: Arc<dyn EmbeddingProvider>,
}

impl SimilarityScorer {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embedder }
    }

    /// Embed one text; failures become a zero vector.
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        embed_or_zero(self.embedder.as_ref(), text).await
    }

    /// Embed each text in order.
    pub async fn embed_all(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await);
        }
        out
    }

    /// Novelty of `query` against `knowledge_texts`, in `[0, 1]`.
    pub async fn score(&self, query: &str, knowledge_texts: &[String]) -> f64 {
        if knowledge_texts.is_empty() {
            return 1.0;
        }
        let knowledge = self.embed_all(knowledge_texts).await;
        let query = self.embed(query).await;
        novelty(&query, &knowledge)
    }

    /// Score several queries, embedding the knowledge texts once.
    pub async fn score_batch(&self, queries: &[String], knowledge_texts: &[String]) -> Vec<f64> {
        if knowledge_texts.is_empty() {
            return vec![1.0; queries.len()];
        }
        let knowledge = self.embed_all(knowledge_texts).await;
        self.score_against(queries, &knowledge).await
    }

    /// Score several queries against already-embedded knowledge.
    ///
    /// Only the queries are embedded.
    pub async fn score_against(&self, queries: &[String], knowledge: &[Vec<f32>]) -> Vec<f64> {
        if knowledge.is_empty() {
            return vec![1.0; queries.len()];
        }
        let mut scores = Vec::with_capacity(queries.len());
        for query in queries {
            let vector = self.embed(query).await;
            scores.push(novelty(&vector, knowledge));
        }
        debug!(candidates = queries.len(), knowledge = knowledge.len(), "scored candidates");
        scores
    }
}

#[cfg(test)]
mod tests {
    use deepresearch_providers::fakes::{FailingEmbeddings, KeywordEmbeddings, ZeroEmbeddings};

    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn identical_vectors_have_similarity_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn orthogonal_and_degenerate_vectors() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn opposite_vectors_clamp_novelty_to_one() {
        let n = novelty(&[1.0, 0.0], &[vec![-1.0, 0.0]]);
        assert_eq!(n, 1.0);
    }

    #[tokio::test]
    async fn empty_knowledge_is_maximally_novel() {
        let scorer = SimilarityScorer::new(Arc::new(KeywordEmbeddings::new(16)));
        assert_eq!(scorer.score("anything", &[]).await, 1.0);
        assert_eq!(scorer.score_batch(&texts(&["a", "b"]), &[]).await, vec![1.0, 1.0]);
    }

    #[tokio::test]
    async fn repeated_text_scores_zero() {
        let scorer = SimilarityScorer::new(Arc::new(KeywordEmbeddings::new(64)));
        let score = scorer.score("ai ethics", &texts(&["AI ethics"])).await;
        assert!(score.abs() < 1e-9, "got {score}");
    }

    #[tokio::test]
    async fn scores_stay_in_unit_interval() {
        let scorer = SimilarityScorer::new(Arc::new(KeywordEmbeddings::new(32)));
        let knowledge = texts(&["machine learning bias", "privacy law", "robot ethics"]);
        for query in ["bias in hiring", "privacy", "quantum chemistry", ""] {
            let s = scorer.score(query, &knowledge).await;
            assert!((0.0..=1.0).contains(&s), "{query}: {s}");
        }
    }

    #[tokio::test]
    async fn failing_embedder_degrades_to_full_novelty() {
        let scorer = SimilarityScorer::new(Arc::new(FailingEmbeddings::new(8)));
        assert_eq!(scorer.score("q", &texts(&["k"])).await, 1.0);

        let scorer = SimilarityScorer::new(Arc::new(ZeroEmbeddings::new(8)));
        assert_eq!(scorer.score("q", &texts(&["k"])).await, 1.0);
    }

    #[tokio::test]
    async fn precomputed_knowledge_matches_text_scoring() {
        let embedder = Arc::new(KeywordEmbeddings::new(64));
        let scorer = SimilarityScorer::new(embedder.clone());
        let knowledge = texts(&["solar power subsidies", "deep sea mining"]);
        let queries = texts(&["solar power", "tax reform"]);

        let expected = scorer.score_batch(&queries, &knowledge).await;
        let vectors = scorer.embed_all(&knowledge).await;
        let before = embedder.calls();
        let scores = scorer.score_against(&queries, &vectors).await;

        assert_eq!(scores, expected);
        assert_eq!(embedder.calls() - before, queries.len());
    }

    #[tokio::test]
    async fn batch_embeds_knowledge_once() {
        let embedder = Arc::new(KeywordEmbeddings::new(16));
        let scorer = SimilarityScorer::new(embedder.clone());
        let scores = scorer
            .score_batch(&texts(&["a", "b", "c"]), &texts(&["x", "y"]))
            .await;
        assert_eq!(scores.len(), 3);
        assert_eq!(embedder.calls(), 5);
    }
}
