use async_trait::async_trait;
use crate::types::{Article, RecordFilter, StoredRecord};
use crate::Result;

#[async_trait]
pub trait ArticleStorage: Send + Sync {
    fn name(&self) -> &str;

    /// Insert articles not yet stored under their `(source, link)` key.
    /// Existing records are left untouched. Returns how many were inserted.
    async fn save(&self, articles: &[Article]) -> Result<usize>;

    /// Stored records matching `filter`, newest first.
    async fn list(&self, filter: &RecordFilter) -> Result<Vec<StoredRecord>>;
}
