use std::collections::HashSet;
use std::fmt;
use lazy_static::lazy_static;
use nm_core::{Result, Sentiment, SentimentModel, SentimentScore};

const POSITIVE_WORDS: &[&str] = &[
    "agree", "agreement", "achieve", "advance", "award", "benefit", "best", "boost", "breakthrough",
    "celebrate", "cure", "deal", "ease", "gain", "gains", "good", "great", "grow", "growth", "happy",
    "heal", "help", "hope", "improve", "improved", "innovation", "joy", "launch", "peace", "praise",
    "progress", "profit", "promising", "rally", "record", "recover", "recovery", "relief", "rescue",
    "rise", "rises", "safe", "save", "saved", "strong", "success", "successful", "support", "surge",
    "thrive", "triumph", "unite", "victory", "win", "wins", "won",
];

const NEGATIVE_WORDS: &[&str] = &[
    "abuse", "accident", "attack", "bankrupt", "blast", "collapse", "conflict", "crash", "crime",
    "crisis", "cut", "cuts", "danger", "dead", "deadly", "death", "decline", "defeat", "disaster",
    "drop", "emergency", "fail", "failed", "failure", "fall", "falls", "fear", "fire", "flood", "fraud",
    "hurt", "injured", "kill", "killed", "killing", "lawsuit", "loss", "losses", "murder", "plunge",
    "protest", "recession", "risk", "scandal", "shooting", "slump", "strike", "threat", "tragedy",
    "violence", "war", "warning", "worst",
];

const NEGATIONS: &[&str] = &["not", "no", "never", "without", "nor"];

lazy_static! {
    static ref POSITIVE: HashSet<&'static str> = POSITIVE_WORDS.iter().copied().collect();
    static ref NEGATIVE: HashSet<&'static str> = NEGATIVE_WORDS.iter().copied().collect();
    static ref NEGATION: HashSet<&'static str> = NEGATIONS.iter().copied().collect();
}

/// Keyword-count sentiment. A negation directly before a keyword flips it.
pub struct LexiconSentiment {
    /// Net polarity below this magnitude is reported as neutral.
    neutral_band: f32,
}

impl LexiconSentiment {
    pub fn new(neutral_band: f32) -> Self {
        Self { neutral_band }
    }

    fn tally(&self, text: &str) -> (u32, u32) {
        let lowered = text.to_lowercase();
        let words = lowered
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|w| !w.is_empty());

        let (mut positive, mut negative) = (0, 0);
        let mut negated = false;
        for word in words {
            let word = word.trim_matches('\'');
            if NEGATION.contains(word) || word.ends_with("n't") {
                negated = true;
                continue;
            }
            let polarity = if POSITIVE.contains(word) {
                Some(true)
            } else if NEGATIVE.contains(word) {
                Some(false)
            } else {
                None
            };
            if let Some(is_positive) = polarity {
                if is_positive != negated {
                    positive += 1;
                } else {
                    negative += 1;
                }
            }
            negated = false;
        }
        (positive, negative)
    }
}

impl Default for LexiconSentiment {
    fn default() -> Self {
        Self::new(0.2)
    }
}

impl fmt::Debug for LexiconSentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LexiconSentiment")
            .field("neutral_band", &self.neutral_band)
            .finish()
    }
}

#[async_trait::async_trait]
impl SentimentModel for LexiconSentiment {
    fn name(&self) -> &str {
        "lexicon"
    }

    async fn classify(&self, text: &str) -> Result<SentimentScore> {
        let (positive, negative) = self.tally(text);
        let total = positive + negative;
        if total == 0 {
            return Ok(SentimentScore::new(Sentiment::Neutral, 0.5));
        }

        let net = (positive as f32 - negative as f32) / total as f32;
        let sentiment = if net.abs() < self.neutral_band {
            SentimentScore::new(Sentiment::Neutral, 1.0 - net.abs())
        } else if net > 0.0 {
            SentimentScore::new(Sentiment::Positive, 0.5 + net / 2.0)
        } else {
            SentimentScore::new(Sentiment::Negative, 0.5 - net / 2.0)
        };
        tracing::debug!(positive, negative, label = %sentiment.label, "Lexicon classification");
        Ok(sentiment)
    }
}
