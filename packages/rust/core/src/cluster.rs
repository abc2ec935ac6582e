//! Post-run topic grouping of synopses with k-means over embeddings.

use std::collections::BTreeMap;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, instrument};

use deepresearch_providers::{EmbeddingProvider, embed_or_zero};
use deepresearch_shared::{KnowledgeId, Result};
use deepresearch_storage::KnowledgeStore;

use crate::report::write_json;

/// Label → synopses in that group, in input order.
pub type Clusters = BTreeMap<usize, Vec<String>>;

const SEED: u64 = 42;
const MAX_ITER: usize = 100;

/// Deterministic k-means with k-means++ seeding.
#[derive(Debug, Clone)]
pub struct KMeans {
    k: usize,
    max_iter: usize,
    centroids: Vec<Vec<f64>>,
    labels: Vec<usize>,
}

impl KMeans {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            max_iter: MAX_ITER,
            centroids: Vec::new(),
            labels: Vec::new(),
        }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Fit to `data` and return one label per row. `k` is clamped to `1..=len`.
    pub fn fit(&mut self, data: &[Vec<f64>]) -> &[usize] {
        self.labels.clear();
        self.centroids.clear();
        if data.is_empty() {
            return &self.labels;
        }

        let k = self.k.clamp(1, data.len());
        let dims = data[0].len();
        self.centroids = init_centroids(data, k);
        self.labels = data.iter().map(|row| self.nearest(row)).collect();

        for _ in 0..self.max_iter {
            let mut sums = vec![vec![0.0; dims]; k];
            let mut counts = vec![0usize; k];
            for (row, &label) in data.iter().zip(&self.labels) {
                counts[label] += 1;
                for (acc, value) in sums[label].iter_mut().zip(row) {
                    *acc += value;
                }
            }
            // Empty clusters keep their previous centroid.
            for (c, count) in counts.into_iter().enumerate() {
                if count > 0 {
                    self.centroids[c] = sums[c].iter().map(|s| s / count as f64).collect();
                }
            }

            let assigned: Vec<usize> = data.iter().map(|row| self.nearest(row)).collect();
            if assigned == self.labels {
                break;
            }
            self.labels = assigned;
        }

        &self.labels
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn centroids(&self) -> &[Vec<f64>] {
        &self.centroids
    }

    fn nearest(&self, row: &[f64]) -> usize {
        self.centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (i, distance_squared(row, c)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map_or(0, |(i, _)| i)
    }
}

fn init_centroids(data: &[Vec<f64>], k: usize) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(SEED);
    let mut centroids = Vec::with_capacity(k);
    centroids.push(data[rng.gen_range(0..data.len())].clone());

    while centroids.len() < k {
        let distances: Vec<f64> = data
            .iter()
            .map(|row| {
                centroids
                    .iter()
                    .map(|c| distance_squared(row, c))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();

        let total: f64 = distances.iter().sum();
        let target = rng.gen_range(0.0..1.0) * total;

        let mut cumsum = 0.0;
        let mut chosen = data.len() - 1;
        for (i, d) in distances.iter().enumerate() {
            cumsum += d;
            if cumsum >= target {
                chosen = i;
                break;
            }
        }
        centroids.push(data[chosen].clone());
    }

    centroids
}

fn distance_squared(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

// ---------------------------------------------------------------------------
// Grouping entry points
// ---------------------------------------------------------------------------

/// Embed `texts` and split them into at most `k` groups.
#[instrument(skip_all, fields(texts = texts.len(), k))]
pub async fn cluster_summaries(
    texts: &[String],
    k: usize,
    embedder: &dyn EmbeddingProvider,
) -> Clusters {
    let labels = label_texts(texts, k, embedder).await;
    let mut clusters = Clusters::new();
    for (text, label) in texts.iter().zip(labels) {
        clusters.entry(label).or_default().push(text.clone());
    }
    info!(groups = clusters.len(), "clustering complete");
    clusters
}

/// Cluster every stored synopsis and record each item's label in the store.
#[instrument(skip_all, fields(k))]
pub async fn cluster_store(
    store: &dyn KnowledgeStore,
    k: usize,
    embedder: &dyn EmbeddingProvider,
) -> Result<Clusters> {
    let items = store.scan().await?;
    let ids: Vec<KnowledgeId> = items.iter().map(|(id, _)| *id).collect();
    let texts: Vec<String> = items.into_iter().map(|(_, item)| item.summary).collect();

    let labels = label_texts(&texts, k, embedder).await;
    let mut clusters = Clusters::new();
    for ((id, text), label) in ids.into_iter().zip(texts).zip(labels) {
        store.set_cluster_label(id, label as i64).await?;
        clusters.entry(label).or_default().push(text);
    }

    info!(items = clusters.values().map(Vec::len).sum::<usize>(), groups = clusters.len(), "stored cluster labels");
    Ok(clusters)
}

/// Write clusters as pretty JSON, replacing any existing file.
pub fn save_clusters(clusters: &Clusters, path: &Path) -> Result<()> {
    write_json(path, clusters)?;
    info!(path = %path.display(), groups = clusters.len(), "clusters saved");
    Ok(())
}

async fn label_texts(texts: &[String], k: usize, embedder: &dyn EmbeddingProvider) -> Vec<usize> {
    if texts.is_empty() || k == 0 {
        return Vec::new();
    }

    let mut data = Vec::with_capacity(texts.len());
    for text in texts {
        let vector = embed_or_zero(embedder, text).await;
        data.push(vector.into_iter().map(f64::from).collect::<Vec<f64>>());
    }

    KMeans::new(k).fit(&data).to_vec()
}

#[cfg(test)]
mod tests {
    use deepresearch_providers::fakes::{FailingEmbeddings, KeywordEmbeddings};
    use deepresearch_shared::KnowledgeItem;
    use deepresearch_storage::MemoryStore;

    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn separates_obvious_groups() {
        let data = vec![
            vec![0.0, 0.0],
            vec![0.1, 0.0],
            vec![10.0, 10.0],
            vec![10.1, 10.0],
        ];
        let mut km = KMeans::new(2);
        let labels = km.fit(&data).to_vec();
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[2], labels[3]);
        assert_ne!(labels[0], labels[2]);
    }

    #[test]
    fn fit_is_deterministic() {
        let data: Vec<Vec<f64>> = (0..20).map(|i| vec![(i % 7) as f64, (i % 3) as f64]).collect();
        let a = KMeans::new(3).fit(&data).to_vec();
        let b = KMeans::new(3).fit(&data).to_vec();
        assert_eq!(a, b);
    }

    #[test]
    fn k_is_clamped_to_row_count() {
        let data = vec![vec![1.0], vec![2.0]];
        let mut km = KMeans::new(5);
        assert_eq!(km.fit(&data).len(), 2);
        assert_eq!(km.centroids().len(), 2);
        assert!(km.labels().iter().all(|&l| l < 2));
    }

    #[test]
    fn seeding_spreads_centroids_across_groups() {
        let data = vec![vec![0.0, 0.0], vec![0.2, 0.1], vec![50.0, 50.0], vec![50.1, 49.9]];
        let centroids = init_centroids(&data, 2);
        let near_origin = centroids.iter().filter(|c| c[0] < 1.0).count();
        assert_eq!(near_origin, 1);
    }

    #[tokio::test]
    async fn empty_input_gives_empty_map() {
        let clusters = cluster_summaries(&[], 3, &KeywordEmbeddings::new(8)).await;
        assert!(clusters.is_empty());
    }

    #[tokio::test]
    async fn every_text_lands_in_exactly_one_group() {
        let texts = strings(&[
            "solar panels efficiency",
            "solar panels cost",
            "deep sea mining",
            "deep sea ecosystems",
            "tax policy reform",
        ]);
        let clusters = cluster_summaries(&texts, 3, &KeywordEmbeddings::new(128)).await;
        assert!(clusters.len() <= 3);
        let mut all: Vec<String> = clusters.values().flatten().cloned().collect();
        all.sort();
        let mut expected = texts.clone();
        expected.sort();
        assert_eq!(all, expected);
    }

    #[tokio::test]
    async fn failing_embedder_puts_everything_together() {
        let texts = strings(&["a", "b", "c"]);
        let clusters = cluster_summaries(&texts, 3, &FailingEmbeddings::new(4)).await;
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters.values().next().unwrap(), &texts);
    }

    #[tokio::test]
    async fn cluster_store_labels_items() {
        let store = MemoryStore::new();
        for summary in ["solar power", "solar cells", "ocean mining"] {
            store
                .insert(&KnowledgeItem {
                    title: String::new(),
                    url: String::new(),
                    raw_text: summary.into(),
                    summary: summary.into(),
                    cluster_label: None,
                    depth: 1,
                })
                .await
                .unwrap();
        }

        let clusters = cluster_store(&store, 2, &KeywordEmbeddings::new(64)).await.unwrap();
        let items = store.scan().await.unwrap();
        assert!(items.iter().all(|(_, item)| item.cluster_label.is_some()));
        for (_, item) in &items {
            let label = item.cluster_label.unwrap() as usize;
            assert!(clusters[&label].contains(&item.summary));
        }
    }

    #[test]
    fn save_clusters_writes_json() {
        let dir = std::env::temp_dir().join(format!("dr-cluster-test-{}", uuid::Uuid::now_v7()));
        let path = dir.join("clusters.json");
        let mut clusters = Clusters::new();
        clusters.insert(0, strings(&["a"]));
        clusters.insert(2, strings(&["b", "c"]));

        save_clusters(&clusters, &path).unwrap();
        let parsed: BTreeMap<String, Vec<String>> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["2"], strings(&["b", "c"]));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
