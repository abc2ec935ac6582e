//! In-process knowledge store.

use async_trait::async_trait;
use tokio::sync::Mutex;

use deepresearch_shared::{KnowledgeId, KnowledgeItem, ResearchError, Result};

use crate::KnowledgeStore;

/// Vector-backed [`KnowledgeStore`].
///
/// Id assignment and the push happen under one lock, so concurrent writers
/// still get gap-free, strictly increasing ids.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<Vec<(KnowledgeId, KnowledgeItem)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KnowledgeStore for MemoryStore {
    async fn insert(&self, item: &KnowledgeItem) -> Result<KnowledgeId> {
        let mut items = self.items.lock().await;
        let id = KnowledgeId(items.last().map_or(1, |(last, _)| last.0 + 1));
        items.push((id, item.clone()));
        Ok(id)
    }

    async fn scan(&self) -> Result<Vec<(KnowledgeId, KnowledgeItem)>> {
        Ok(self.items.lock().await.clone())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.items.lock().await.len())
    }

    async fn set_cluster_label(&self, id: KnowledgeId, label: i64) -> Result<()> {
        let mut items = self.items.lock().await;
        match items.iter_mut().find(|(existing, _)| *existing == id) {
            Some((_, item)) => {
                item.cluster_label = Some(label);
                Ok(())
            }
            None => Err(ResearchError::Storage(format!("no knowledge item with id {id}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn item(summary: &str) -> KnowledgeItem {
        KnowledgeItem {
            title: String::new(),
            url: String::new(),
            raw_text: summary.into(),
            summary: summary.into(),
            cluster_label: None,
            depth: 1,
        }
    }

    #[tokio::test]
    async fn assigns_sequential_ids() {
        let store = MemoryStore::new();
        assert_eq!(store.insert(&item("a")).await.unwrap(), KnowledgeId(1));
        assert_eq!(store.insert(&item("b")).await.unwrap(), KnowledgeId(2));
        assert_eq!(store.summaries().await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn concurrent_inserts_get_unique_ids() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.insert(&item(&format!("item {i}"))).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let ids: Vec<i64> = store.scan().await.unwrap().iter().map(|(id, _)| id.0).collect();
        assert_eq!(ids, (1..=16).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn labels_existing_items_only() {
        let store = MemoryStore::new();
        let id = store.insert(&item("a")).await.unwrap();
        store.set_cluster_label(id, 1).await.unwrap();
        assert_eq!(store.scan().await.unwrap()[0].1.cluster_label, Some(1));
        assert!(store.set_cluster_label(KnowledgeId(5), 1).await.is_err());
    }
}
