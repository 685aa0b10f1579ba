use std::sync::Arc;
use nm_core::ArticleStorage;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn ArticleStorage>,
}

impl AppState {
    pub fn new(storage: Arc<dyn ArticleStorage>) -> Self {
        Self { storage }
    }
}
