use std::sync::Arc;
use std::time::Duration;
use futures::stream::{self, StreamExt};
use nm_core::text::truncate_chars;
use nm_core::{Article, SentimentModel, Summarizer};
use tokio::time::timeout;
use crate::article::fetch_body;
use crate::fetch::PageFetcher;

/// Upper bound on the text handed to the sentiment model.
const MAX_CLASSIFY_CHARS: usize = 4096;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Articles enriched at the same time.
    pub concurrency: usize,
    pub model_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            model_timeout: Duration::from_secs(60),
        }
    }
}

/// Fetches article bodies and runs sentiment and summary models over them.
///
/// Every step is best-effort. An article that cannot be fetched or
/// classified comes back with those fields left empty, never dropped.
#[derive(Clone)]
pub struct SentimentPipeline {
    fetcher: Arc<dyn PageFetcher>,
    sentiment: Arc<dyn SentimentModel>,
    summarizer: Arc<dyn Summarizer>,
    config: PipelineConfig,
}

impl SentimentPipeline {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        sentiment: Arc<dyn SentimentModel>,
        summarizer: Arc<dyn Summarizer>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            fetcher,
            sentiment,
            summarizer,
            config,
        }
    }

    /// Enrich a batch. Output order is not guaranteed to match input order.
    pub async fn process(&self, articles: Vec<Article>) -> Vec<Article> {
        stream::iter(articles)
            .map(|article| self.enrich(article))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await
    }

    pub async fn enrich(&self, mut article: Article) -> Article {
        let body = match fetch_body(self.fetcher.as_ref(), &article.link).await {
            Ok(Some(body)) => body,
            Ok(None) => {
                tracing::debug!(link = %article.link, "no article text found");
                return article;
            }
            Err(e) => {
                tracing::warn!(link = %article.link, "failed to fetch article: {}", e);
                return article;
            }
        };

        let classify_input = format!("{}. {}", article.headline, body.text);
        let classify_input = truncate_chars(&classify_input, MAX_CLASSIFY_CHARS);
        let (sentiment, summary) = tokio::join!(
            timeout(self.config.model_timeout, self.sentiment.classify(classify_input)),
            timeout(self.config.model_timeout, self.summarizer.summarize(&body.text)),
        );

        match sentiment {
            Ok(Ok(score)) => article.apply_sentiment(score),
            Ok(Err(e)) => tracing::warn!(link = %article.link, model = self.sentiment.name(), "classification failed: {}", e),
            Err(_) => tracing::warn!(link = %article.link, model = self.sentiment.name(), "classification timed out"),
        }
        match summary {
            Ok(Ok(summary)) if !summary.trim().is_empty() => article.summary = Some(summary),
            Ok(Ok(_)) => tracing::debug!(link = %article.link, "summarizer returned nothing"),
            Ok(Err(e)) => tracing::warn!(link = %article.link, model = self.summarizer.name(), "summary failed: {}", e),
            Err(_) => tracing::warn!(link = %article.link, model = self.summarizer.name(), "summary timed out"),
        }

        article.body = Some(body.text);
        article.image = body.image;
        article
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nm_core::{Error, Result, Sentiment, SentimentScore};
    use url::Url;

    struct Pages;

    #[async_trait]
    impl PageFetcher for Pages {
        fn name(&self) -> &str {
            "pages"
        }

        async fn fetch(&self, url: &Url) -> Result<String> {
            match url.path() {
                "/good" => Ok("<p>Volunteers rebuilt the bridge in record time.</p>".to_string()),
                "/empty" => Ok("<div>nothing to read</div>".to_string()),
                _ => Err(Error::Fetch(format!("{} is gone", url))),
            }
        }
    }

    struct Upbeat;

    #[async_trait]
    impl SentimentModel for Upbeat {
        fn name(&self) -> &str {
            "upbeat"
        }

        async fn classify(&self, text: &str) -> Result<SentimentScore> {
            if text.contains("stall") {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok(SentimentScore::new(Sentiment::Positive, 1.7))
        }
    }

    struct Broken;

    #[async_trait]
    impl Summarizer for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn summarize(&self, _text: &str) -> Result<String> {
            Err(Error::Model("model offline".to_string()))
        }
    }

    struct Echo;

    #[async_trait]
    impl Summarizer for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn summarize(&self, text: &str) -> Result<String> {
            Ok(text.to_string())
        }
    }

    fn pipeline(summarizer: Arc<dyn Summarizer>) -> SentimentPipeline {
        SentimentPipeline::new(
            Arc::new(Pages),
            Arc::new(Upbeat),
            summarizer,
            PipelineConfig {
                concurrency: 2,
                model_timeout: Duration::from_millis(200),
            },
        )
    }

    fn article(path: &str) -> Article {
        Article::new("example", format!("Headline for {}", path), format!("https://news.example{}", path))
    }

    #[tokio::test]
    async fn test_enrich() {
        let enriched = pipeline(Arc::new(Echo)).enrich(article("/good")).await;
        assert_eq!(enriched.body.as_deref(), Some("Volunteers rebuilt the bridge in record time."));
        assert_eq!(enriched.sentiment_label, Some(Sentiment::Positive));
        assert_eq!(enriched.sentiment_score, Some(1.0));
        assert_eq!(enriched.summary.as_deref(), Some("Volunteers rebuilt the bridge in record time."));
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_article() {
        let articles = pipeline(Arc::new(Echo))
            .process(vec![article("/good"), article("/missing"), article("/empty")])
            .await;
        assert_eq!(articles.len(), 3);

        for article in articles.iter().filter(|a| !a.link.ends_with("/good")) {
            assert!(article.body.is_none());
            assert!(article.sentiment_label.is_none());
            assert!(article.sentiment_score.is_none());
            assert!(article.summary.is_none());
        }
    }

    #[tokio::test]
    async fn test_model_error_leaves_field_empty() {
        let enriched = pipeline(Arc::new(Broken)).enrich(article("/good")).await;
        assert!(enriched.body.is_some());
        assert_eq!(enriched.sentiment_label, Some(Sentiment::Positive));
        assert!(enriched.summary.is_none());
    }

    #[tokio::test]
    async fn test_model_timeout() {
        let mut stalled = article("/good");
        stalled.headline = "Talks stall again".to_string();
        let enriched = pipeline(Arc::new(Echo)).enrich(stalled).await;
        assert!(enriched.sentiment_label.is_none());
        assert!(enriched.summary.is_some());
    }
}
