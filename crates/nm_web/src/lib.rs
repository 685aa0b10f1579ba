use std::future::Future;
use std::sync::Arc;
use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod handlers;
pub mod state;

pub use state::AppState;

pub async fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::permissive();

    Router::new()
        .route("/api/articles", get(handlers::list_articles))
        .route("/api/articles/by-sentiment", get(handlers::by_sentiment))
        .route("/api/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

/// Serve the API on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_app(state).await;
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "🌐 API listening");
    }
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await
}

pub mod prelude {
    pub use nm_core::{Error, RecordFilter, Result, StoredRecord};
    pub use crate::AppState;
}
