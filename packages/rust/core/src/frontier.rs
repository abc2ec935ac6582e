//! The query frontier: selection, deduplication, and novelty-ranked insertion.

use std::collections::HashSet;

use tracing::debug;

use crate::scorer::SimilarityScorer;

/// Ordered, deduplicated list of queries.
///
/// Executed queries stay in the list; a text that has ever been queued is
/// filtered on re-insertion by exact match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frontier {
    queries: Vec<String>,
}

impl Frontier {
    /// Build a frontier from seed queries, dropping blanks and repeats.
    pub fn new<I, S>(seeds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut frontier = Self {
            queries: seeds
                .into_iter()
                .map(Into::into)
                .filter(|q: &String| !q.trim().is_empty())
                .collect(),
        };
        frontier.dedup();
        frontier
    }

    /// The first `min(k, len)` queries. No side effects.
    pub fn select(&self, k: usize) -> &[String] {
        &self.queries[..k.min(self.queries.len())]
    }

    /// Append a query at the end. Call [`Frontier::dedup`] to collapse repeats.
    pub fn push(&mut self, query: impl Into<String>) {
        self.queries.push(query.into());
    }

    /// Remove repeated strings, keeping each first occurrence in place.
    pub fn dedup(&mut self) {
        let mut seen = HashSet::with_capacity(self.queries.len());
        self.queries.retain(|q| seen.insert(q.clone()));
    }

    /// Append `candidates` ordered by descending novelty, then dedup the whole frontier.
    ///
    /// Ties keep candidate order. Without a scorer, or with no knowledge yet,
    /// candidates are appended as given.
    pub async fn insert_ranked(
        &mut self,
        candidates: Vec<String>,
        knowledge_texts: &[String],
        scorer: Option<&SimilarityScorer>,
    ) {
        let knowledge = match scorer {
            Some(scorer) if !candidates.is_empty() && !knowledge_texts.is_empty() => {
                scorer.embed_all(knowledge_texts).await
            }
            _ => Vec::new(),
        };
        self.insert_scored(candidates, &knowledge, scorer).await;
    }

    /// [`Frontier::insert_ranked`] against knowledge that is already embedded.
    pub async fn insert_scored(
        &mut self,
        candidates: Vec<String>,
        knowledge: &[Vec<f32>],
        scorer: Option<&SimilarityScorer>,
    ) {
        if candidates.is_empty() {
            return;
        }

        let ordered = match scorer {
            Some(scorer) if !knowledge.is_empty() => {
                let scores = scorer.score_against(&candidates, knowledge).await;
                rank_by_score(candidates, &scores)
            }
            _ => candidates,
        };

        let before = self.queries.len();
        self.queries.extend(ordered);
        self.dedup();
        debug!(added = self.queries.len() - before, total = self.queries.len(), "frontier updated");
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn contains(&self, query: &str) -> bool {
        self.queries.iter().any(|q| q == query)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.queries
    }

    pub fn into_vec(self) -> Vec<String> {
        self.queries
    }
}

/// Stable sort of `candidates` by descending score.
fn rank_by_score(candidates: Vec<String>, scores: &[f64]) -> Vec<String> {
    let mut paired: Vec<(String, f64)> = candidates
        .into_iter()
        .zip(scores.iter().copied().chain(std::iter::repeat(0.0)))
        .collect();
    paired.sort_by(|a, b| b.1.total_cmp(&a.1));
    paired.into_iter().map(|(q, _)| q).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use deepresearch_providers::fakes::{KeywordEmbeddings, ZeroEmbeddings};

    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn seeds_are_deduplicated_and_blank_free() {
        let f = Frontier::new(["a", " ", "b", "a", ""]);
        assert_eq!(f.as_slice(), strings(&["a", "b"]).as_slice());
    }

    #[test]
    fn select_takes_prefix_and_is_idempotent() {
        let f = Frontier::new(["q1", "q2", "q3", "q4", "q5", "q6", "q7"]);
        let first = f.select(5).to_vec();
        let second = f.select(5).to_vec();
        assert_eq!(first, strings(&["q1", "q2", "q3", "q4", "q5"]));
        assert_eq!(first, second);
        assert_eq!(f.select(10).len(), 7);
        assert!(Frontier::default().select(5).is_empty());
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let mut f = Frontier::new(["a", "b"]);
        f.push("c");
        f.push("a");
        f.push("c");
        f.dedup();
        assert_eq!(f.as_slice(), strings(&["a", "b", "c"]).as_slice());
    }

    #[tokio::test]
    async fn insert_without_scorer_appends_in_order() {
        let mut f = Frontier::new(["seed"]);
        f.insert_ranked(strings(&["x", "seed", "y", "x"]), &strings(&["k"]), None)
            .await;
        assert_eq!(f.as_slice(), strings(&["seed", "x", "y"]).as_slice());
    }

    #[tokio::test]
    async fn identical_candidates_collapse_to_one() {
        let scorer = SimilarityScorer::new(Arc::new(ZeroEmbeddings::new(4)));
        let mut f = Frontier::new(["AI ethics"]);
        f.insert_ranked(
            strings(&["More on Ethics", "More on Ethics"]),
            &strings(&["Ethics: s"]),
            Some(&scorer),
        )
        .await;
        assert_eq!(
            f.as_slice().iter().filter(|q| *q == "More on Ethics").count(),
            1
        );
        assert_eq!(f.len(), 2);
    }

    #[tokio::test]
    async fn ties_preserve_candidate_order() {
        let scorer = SimilarityScorer::new(Arc::new(ZeroEmbeddings::new(4)));
        let mut f = Frontier::default();
        f.insert_ranked(strings(&["c", "a", "b"]), &strings(&["k"]), Some(&scorer))
            .await;
        assert_eq!(f.as_slice(), strings(&["c", "a", "b"]).as_slice());
    }

    #[tokio::test]
    async fn novel_candidates_rank_first() {
        let scorer = SimilarityScorer::new(Arc::new(KeywordEmbeddings::new(256)));
        let knowledge = strings(&["solar power subsidies"]);
        let mut f = Frontier::new(["seed"]);
        f.insert_ranked(
            strings(&["solar power subsidies", "deep sea mining"]),
            &knowledge,
            Some(&scorer),
        )
        .await;
        assert_eq!(
            f.as_slice(),
            strings(&["seed", "deep sea mining", "solar power subsidies"]).as_slice()
        );
    }

    #[tokio::test]
    async fn distinct_count_never_exceeds_union() {
        let mut f = Frontier::new(["a", "b", "c"]);
        let candidates = strings(&["b", "d", "d", "a", "e"]);
        f.insert_ranked(candidates, &[], None).await;
        assert_eq!(f.as_slice(), strings(&["a", "b", "c", "d", "e"]).as_slice());
    }
}
