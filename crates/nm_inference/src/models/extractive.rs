use std::fmt;
use nm_core::{text, Result, Summarizer};
use super::{prepare_summary_input, SummaryInput};

/// Summarizes by keeping leading sentences until a word budget is spent.
pub struct ExtractiveSummarizer {
    max_words: usize,
}

impl ExtractiveSummarizer {
    pub fn new(max_words: usize) -> Self {
        Self { max_words: max_words.max(1) }
    }

    /// Roughly four tokens for every three words.
    pub fn with_token_budget(tokens: u32) -> Self {
        Self::new((tokens as usize * 3) / 4)
    }

    fn condense(&self, body: &str) -> String {
        let mut summary: Vec<&str> = Vec::new();
        let mut words = 0;
        for sentence in split_sentences(body) {
            let count = text::word_count(sentence);
            if words + count > self.max_words {
                if summary.is_empty() {
                    let clipped: Vec<&str> = sentence.split_whitespace().take(self.max_words).collect();
                    return clipped.join(" ");
                }
                break;
            }
            words += count;
            summary.push(sentence);
        }
        summary.join(" ")
    }
}

fn split_sentences(body: &str) -> impl Iterator<Item = &str> {
    body.split_inclusive(|c| c == '.' || c == '!' || c == '?')
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

impl fmt::Debug for ExtractiveSummarizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractiveSummarizer").field("max_words", &self.max_words).finish()
    }
}

#[async_trait::async_trait]
impl Summarizer for ExtractiveSummarizer {
    fn name(&self) -> &str {
        "extractive"
    }

    async fn summarize(&self, body: &str) -> Result<String> {
        let summary = match prepare_summary_input(body)? {
            SummaryInput::Verbatim(text) => text,
            SummaryInput::Condense(text) => self.condense(text),
        };
        Ok(text::clean_summary(&summary))
    }
}
