use std::collections::HashSet;
use async_trait::async_trait;
use nm_core::{Article, ArticleStorage, RecordFilter, Result, StoredRecord};
use tokio::sync::RwLock;
use crate::{StorageBackend, StorageConfig};

#[derive(Default)]
struct MemoryStore {
    records: Vec<StoredRecord>,
    keys: HashSet<(String, String)>,
}

impl MemoryStore {
    fn insert(&mut self, article: &Article) -> bool {
        let key = (article.source.clone(), article.link.clone());
        if self.keys.contains(&key) {
            return false;
        }
        self.keys.insert(key);
        self.records.push(StoredRecord::new(article.clone()));
        true
    }
}

/// Process-local store. Useful for tests and one-shot runs.
#[derive(Default)]
pub struct MemoryStorage {
    store: RwLock<MemoryStore>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn open(_config: &StorageConfig) -> Result<Self> {
        Ok(Self::new())
    }
}

#[async_trait]
impl ArticleStorage for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    async fn save(&self, articles: &[Article]) -> Result<usize> {
        let mut store = self.store.write().await;
        Ok(articles.iter().filter(|article| store.insert(article)).count())
    }

    async fn list(&self, filter: &RecordFilter) -> Result<Vec<StoredRecord>> {
        let store = self.store.read().await;
        // Insertion order is chronological, so walking backwards is newest first.
        let matching = store.records.iter().rev().filter(|record| filter.matches(record)).cloned();
        Ok(match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }
}
