pub mod error;
pub mod models;
pub mod storage;
pub mod text;
pub mod types;

pub use error::{Error, Result};
pub use models::{SentimentModel, Summarizer};
pub use storage::ArticleStorage;
pub use types::{Article, RecordFilter, Sentiment, SentimentScore, StoredRecord};
