use std::sync::Arc;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use nm_core::{Error, RecordFilter, Sentiment, StoredRecord};
use serde::{Deserialize, Serialize};
use serde_json::json;
use crate::AppState;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("storage unavailable")]
    Unavailable(#[source] Error),
    #[error("internal error")]
    Internal(#[source] Error),
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        if e.is_storage() {
            ApiError::Unavailable(e)
        } else {
            ApiError::Internal(e)
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unavailable(ref e) => {
                tracing::error!("storage error: {}", e);
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Internal(ref e) => {
                tracing::error!("internal error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        // Only the variant's own message goes out, never the underlying error.
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ArticleQuery {
    pub sentiment: Option<String>,
    pub source: Option<String>,
    pub limit: Option<usize>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl ArticleQuery {
    fn into_filter(self) -> Result<RecordFilter, ApiError> {
        let sentiment = non_empty(self.sentiment)
            .map(|s| s.parse::<Sentiment>())
            .transpose()
            .map_err(|_| ApiError::BadRequest("sentiment must be one of positive, neutral, negative".to_string()))?;
        Ok(RecordFilter {
            sentiment,
            source: non_empty(self.source),
            limit: self.limit,
        })
    }
}

pub async fn list_articles(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ArticleQuery>, QueryRejection>,
) -> Result<Json<Vec<StoredRecord>>, ApiError> {
    let Query(query) = query?;
    let filter = query.into_filter()?;
    let records = state.storage.list(&filter).await?;
    Ok(Json(records))
}

#[derive(Debug, Default, Serialize)]
pub struct SentimentGroups {
    pub positive: Vec<StoredRecord>,
    pub neutral: Vec<StoredRecord>,
    pub negative: Vec<StoredRecord>,
}

impl SentimentGroups {
    fn push(&mut self, record: StoredRecord) {
        match record.article.sentiment_label {
            Some(Sentiment::Positive) => self.positive.push(record),
            Some(Sentiment::Neutral) => self.neutral.push(record),
            Some(Sentiment::Negative) => self.negative.push(record),
            None => {}
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct GroupQuery {
    pub source: Option<String>,
}

/// Classified articles bucketed by label, newest first within each bucket.
pub async fn by_sentiment(
    State(state): State<Arc<AppState>>,
    query: Result<Query<GroupQuery>, QueryRejection>,
) -> Result<Json<SentimentGroups>, ApiError> {
    let Query(query) = query?;
    let filter = RecordFilter {
        source: non_empty(query.source),
        ..Default::default()
    };
    let mut groups = SentimentGroups::default();
    for record in state.storage.list(&filter).await? {
        groups.push(record);
    }
    Ok(Json(groups))
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "status": "ok", "storage": state.storage.name() }))
}
