use std::fmt;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use nm_core::{text, Error, Result, SentimentModel, SentimentScore, Summarizer};
use super::{prepare_summary_input, ModelConfig, SummaryInput, DEFAULT_SUMMARY_TOKENS};

const DEFAULT_MODEL: &str = "gpt-4o-mini";
/// Classification only needs the opening of an article.
const MAX_CLASSIFY_INPUT_CHARS: usize = 2048;

const CLASSIFY_PROMPT: &str = "Classify the sentiment of the news text. \
Reply with JSON only, in the form {\"label\": \"positive\" | \"neutral\" | \"negative\", \"score\": <confidence between 0 and 1>}.";

const SUMMARIZE_PROMPT: &str = "Summarize the news article in two or three plain sentences.";

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: String,
}

#[derive(Deserialize)]
struct Classification {
    label: String,
    score: f32,
}

/// Sentiment and summaries from an OpenAI-compatible `/chat/completions` API.
pub struct ChatModel {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    summary_max_tokens: u32,
}

impl ChatModel {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, model: Option<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        url::Url::parse(&base_url)?;
        Ok(Self {
            client: Client::new(),
            api_key,
            base_url,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            summary_max_tokens: DEFAULT_SUMMARY_TOKENS,
        })
    }

    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let base_url = config
            .api_url
            .as_deref()
            .ok_or_else(|| Error::Config("The chat model requires a model URL".to_string()))?;
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        let mut model = Self::new(base_url, config.api_key.clone(), config.model_name.clone())?;
        model.client = client;
        model.summary_max_tokens = config.summary_max_tokens;
        Ok(model)
    }

    async fn complete(&self, system: &str, user: &str, max_tokens: u32) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            max_tokens,
            temperature: 0.0,
        };

        let mut builder = self.client.post(format!("{}/chat/completions", self.base_url)).json(&request);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Model(format!("Chat request failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Model(format!("Chat endpoint returned {}", status)));
        }
        let response = response
            .json::<ChatResponse>()
            .await
            .map_err(|e| Error::Model(format!("Malformed chat response: {}", e)))?;

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| Error::Model("Chat response had no choices".to_string()))
    }
}

impl fmt::Debug for ChatModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatModel")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &self.api_key.as_deref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

/// Models like to wrap JSON in prose or code fences.
fn parse_classification(reply: &str) -> Result<SentimentScore> {
    let start = reply.find('{');
    let end = reply.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => return Err(Error::Model(format!("No JSON object in reply: {}", reply))),
    };
    let parsed: Classification = serde_json::from_str(json)
        .map_err(|e| Error::Model(format!("Invalid classification JSON: {}", e)))?;
    Ok(SentimentScore::new(parsed.label.parse()?, parsed.score))
}

#[async_trait]
impl SentimentModel for ChatModel {
    fn name(&self) -> &str {
        "chat"
    }

    async fn classify(&self, input: &str) -> Result<SentimentScore> {
        let input = text::truncate_chars(input, MAX_CLASSIFY_INPUT_CHARS);
        let reply = self.complete(CLASSIFY_PROMPT, input, 32).await?;
        parse_classification(&reply)
    }
}

#[async_trait]
impl Summarizer for ChatModel {
    fn name(&self) -> &str {
        "chat"
    }

    async fn summarize(&self, body: &str) -> Result<String> {
        let summary = match prepare_summary_input(body)? {
            SummaryInput::Verbatim(text) => text,
            SummaryInput::Condense(input) => {
                self.complete(SUMMARIZE_PROMPT, input, self.summary_max_tokens).await?
            }
        };
        Ok(text::clean_summary(&summary))
    }
}
