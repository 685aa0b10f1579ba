//! Sentiment classification and summarization models.
//!
//! Models are built once from a [`ModelConfig`] and handed to the pipeline as
//! trait objects, so callers never reach for a global instance.

pub mod models;

pub use models::{create_models, ModelConfig, ModelKind, Models};

pub mod prelude {
    pub use super::models::{create_models, ModelConfig, ModelKind, Models};
    pub use nm_core::{Error, Result, Sentiment, SentimentModel, SentimentScore, Summarizer};
}
