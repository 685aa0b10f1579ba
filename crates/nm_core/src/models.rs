use async_trait::async_trait;
use crate::types::SentimentScore;
use crate::Result;

#[async_trait]
pub trait SentimentModel: Send + Sync {
    fn name(&self) -> &str;

    /// Classify a piece of text. The returned score is a confidence in `[0, 1]`.
    async fn classify(&self, text: &str) -> Result<SentimentScore>;
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    fn name(&self) -> &str;

    /// Produce a short summary of an article body
    async fn summarize(&self, text: &str) -> Result<String>;
}
