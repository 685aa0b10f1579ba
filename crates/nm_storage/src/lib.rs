use std::sync::Arc;
use async_trait::async_trait;
use nm_core::{ArticleStorage, Error, Result};
use url::Url;

pub mod backends;

pub use backends::*;

pub const DEFAULT_DATABASE: &str = "newsmood";
pub const DEFAULT_COLLECTION: &str = "articles";

/// Where records live. The URL scheme picks the backend:
/// `memory://` or `sqlite://<directory>`.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub url: String,
    pub database: String,
    pub collection: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url: "memory://".to_string(),
            database: DEFAULT_DATABASE.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
        }
    }
}

impl StorageConfig {
    pub fn scheme(&self) -> Result<String> {
        let url = Url::parse(&self.url)
            .map_err(|e| Error::Config(format!("Invalid storage URL '{}': {}", self.url, e)))?;
        Ok(url.scheme().to_string())
    }
}

#[async_trait]
pub trait StorageBackend: ArticleStorage {
    async fn open(config: &StorageConfig) -> Result<Self>
    where
        Self: Sized;
}

pub async fn create_storage(config: &StorageConfig) -> Result<Arc<dyn ArticleStorage>> {
    let scheme = config.scheme()?;
    let storage: Arc<dyn ArticleStorage> = match scheme.as_str() {
        "memory" => Arc::new(MemoryStorage::open(config).await?),
        #[cfg(feature = "sqlite")]
        "sqlite" => Arc::new(SqliteStorage::open(config).await?),
        other => {
            return Err(Error::Config(format!(
                "Unsupported storage backend '{}'. Available backends: {}",
                other,
                available_backends().join(", ")
            )))
        }
    };
    tracing::info!(backend = storage.name(), collection = %config.collection, "💾 Storage opened");
    Ok(storage)
}

pub fn available_backends() -> Vec<&'static str> {
    let mut backends = vec!["memory"];
    if cfg!(feature = "sqlite") {
        backends.push("sqlite");
    }
    backends
}

pub mod prelude {
    pub use super::{create_storage, StorageBackend, StorageConfig};
    pub use super::backends::*;
}
