use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use nm_core::{text, Error, Result, SentimentModel, Summarizer};

pub mod chat;
pub mod extractive;
pub mod lexicon;

pub use chat::ChatModel;
pub use extractive::ExtractiveSummarizer;
pub use lexicon::LexiconSentiment;

/// Bodies longer than this are cut before being handed to a summarizer.
pub const MAX_SUMMARY_INPUT_CHARS: usize = 2048;
/// Bodies shorter than this are returned as their own summary.
pub const MIN_SUMMARY_WORDS: usize = 10;
pub const DEFAULT_SUMMARY_TOKENS: u32 = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelKind {
    /// Local keyword sentiment + leading-sentence summaries. No network.
    #[default]
    Lexicon,
    /// OpenAI-compatible chat completion endpoint for both tasks.
    Chat,
}

impl FromStr for ModelKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lexicon" | "local" => Ok(ModelKind::Lexicon),
            "chat" | "openai" => Ok(ModelKind::Chat),
            other => Err(Error::Config(format!(
                "Unknown model '{}'. Available models: lexicon, chat",
                other
            ))),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::Lexicon => f.write_str("lexicon"),
            ModelKind::Chat => f.write_str("chat"),
        }
    }
}

#[derive(Clone)]
pub struct ModelConfig {
    pub kind: ModelKind,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub model_name: Option<String>,
    pub summary_max_tokens: u32,
    pub request_timeout: Duration,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            kind: ModelKind::default(),
            api_url: None,
            api_key: None,
            model_name: None,
            summary_max_tokens: DEFAULT_SUMMARY_TOKENS,
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("kind", &self.kind)
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_deref().map(|_| "<redacted>"))
            .field("model_name", &self.model_name)
            .field("summary_max_tokens", &self.summary_max_tokens)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// The pair of models the sentiment pipeline needs.
#[derive(Clone)]
pub struct Models {
    pub sentiment: Arc<dyn SentimentModel>,
    pub summarizer: Arc<dyn Summarizer>,
}

pub fn create_models(config: &ModelConfig) -> Result<Models> {
    match config.kind {
        ModelKind::Lexicon => Ok(Models {
            sentiment: Arc::new(LexiconSentiment::default()),
            summarizer: Arc::new(ExtractiveSummarizer::with_token_budget(config.summary_max_tokens)),
        }),
        ModelKind::Chat => {
            let model = Arc::new(ChatModel::from_config(config)?);
            Ok(Models {
                sentiment: model.clone(),
                summarizer: model,
            })
        }
    }
}

/// What a summarizer should do with a body.
pub(crate) enum SummaryInput<'a> {
    /// Too short to condense; use this text as the summary.
    Verbatim(String),
    Condense(&'a str),
}

pub(crate) fn prepare_summary_input(body: &str) -> Result<SummaryInput<'_>> {
    let body = body.trim();
    if body.is_empty() {
        return Err(Error::Model("Nothing to summarize".to_string()));
    }
    if text::word_count(body) < MIN_SUMMARY_WORDS {
        return Ok(SummaryInput::Verbatim(text::capitalize_first(body)));
    }
    Ok(SummaryInput::Condense(text::truncate_chars(body, MAX_SUMMARY_INPUT_CHARS)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_kind_parse() {
        assert_eq!("lexicon".parse::<ModelKind>().unwrap(), ModelKind::Lexicon);
        assert_eq!("CHAT".parse::<ModelKind>().unwrap(), ModelKind::Chat);
        assert!("t5-large".parse::<ModelKind>().is_err());
    }

    #[test]
    fn test_chat_requires_endpoint() {
        let config = ModelConfig {
            kind: ModelKind::Chat,
            ..Default::default()
        };
        assert!(create_models(&config).is_err());
    }

    #[tokio::test]
    async fn test_lexicon_models() {
        let models = create_models(&ModelConfig::default()).unwrap();
        assert_eq!(models.sentiment.name(), "lexicon");
        assert_eq!(models.summarizer.name(), "extractive");
    }

    #[test]
    fn test_short_bodies_are_verbatim() {
        match prepare_summary_input("short body here").unwrap() {
            SummaryInput::Verbatim(s) => assert_eq!(s, "Short body here"),
            SummaryInput::Condense(_) => panic!("expected verbatim"),
        }
        assert!(prepare_summary_input("   ").is_err());
    }

    #[test]
    fn test_long_bodies_are_truncated() {
        let body = "word ".repeat(1000);
        match prepare_summary_input(&body).unwrap() {
            SummaryInput::Condense(s) => assert!(s.len() <= MAX_SUMMARY_INPUT_CHARS),
            SummaryInput::Verbatim(_) => panic!("expected condense"),
        }
    }
}
