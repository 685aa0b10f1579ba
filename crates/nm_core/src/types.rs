use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub const ALL: [Sentiment; 3] = [Sentiment::Positive, Sentiment::Neutral, Sentiment::Negative];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sentiment {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" | "pos" => Ok(Sentiment::Positive),
            "neutral" => Ok(Sentiment::Neutral),
            "negative" | "neg" => Ok(Sentiment::Negative),
            other => Err(crate::Error::Model(format!("Unknown sentiment label: {}", other))),
        }
    }
}

/// Output of a sentiment model: a label and its confidence in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentScore {
    pub label: Sentiment,
    pub score: f32,
}

impl SentimentScore {
    pub fn new(label: Sentiment, score: f32) -> Self {
        let score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) };
        Self { label, score }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub source: String,
    pub headline: String,
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub sentiment_label: Option<Sentiment>,
    #[serde(default)]
    pub sentiment_score: Option<f32>,
    #[serde(default)]
    pub summary: Option<String>,
}

impl Article {
    /// A freshly scraped article with only its identity and headline set.
    pub fn new(source: impl Into<String>, headline: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            headline: headline.into(),
            link: link.into(),
            body: None,
            image: None,
            sentiment_label: None,
            sentiment_score: None,
            summary: None,
        }
    }

    pub fn key(&self) -> (&str, &str) {
        (&self.source, &self.link)
    }

    pub fn apply_sentiment(&mut self, sentiment: SentimentScore) {
        self.sentiment_label = Some(sentiment.label);
        self.sentiment_score = Some(sentiment.score);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    #[serde(flatten)]
    pub article: Article,
    pub stored_at: DateTime<Utc>,
}

impl StoredRecord {
    pub fn new(article: Article) -> Self {
        Self {
            article,
            stored_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RecordFilter {
    pub sentiment: Option<Sentiment>,
    pub source: Option<String>,
    pub limit: Option<usize>,
}

impl RecordFilter {
    pub fn matches(&self, record: &StoredRecord) -> bool {
        if let Some(sentiment) = self.sentiment {
            if record.article.sentiment_label != Some(sentiment) {
                return false;
            }
        }
        if let Some(ref source) = self.source {
            if &record.article.source != source {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentiment_parse() {
        assert_eq!("Positive".parse::<Sentiment>().unwrap(), Sentiment::Positive);
        assert_eq!(" negative ".parse::<Sentiment>().unwrap(), Sentiment::Negative);
        assert!("angry".parse::<Sentiment>().is_err());
    }

    #[test]
    fn test_score_is_clamped() {
        assert_eq!(SentimentScore::new(Sentiment::Neutral, 1.7).score, 1.0);
        assert_eq!(SentimentScore::new(Sentiment::Neutral, -0.2).score, 0.0);
        assert_eq!(SentimentScore::new(Sentiment::Neutral, f32::NAN).score, 0.0);
    }

    #[test]
    fn test_stored_record_serializes_flat() {
        let mut article = Article::new("bbc", "Markets rally on hopes", "https://bbc.co.uk/a");
        article.apply_sentiment(SentimentScore::new(Sentiment::Positive, 0.9));
        let record = StoredRecord::new(article);

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["source"], "bbc");
        assert_eq!(value["sentiment_label"], "positive");
        assert!(value.get("stored_at").is_some());
        assert!(value.get("body").is_none());
    }

    #[test]
    fn test_filter_matches() {
        let mut article = Article::new("bbc", "Markets rally on hopes", "https://bbc.co.uk/a");
        article.apply_sentiment(SentimentScore::new(Sentiment::Positive, 0.9));
        let record = StoredRecord::new(article);

        assert!(RecordFilter::default().matches(&record));
        let filter = RecordFilter { sentiment: Some(Sentiment::Negative), ..Default::default() };
        assert!(!filter.matches(&record));
        let filter = RecordFilter { source: Some("bbc".to_string()), ..Default::default() };
        assert!(filter.matches(&record));
    }
}
