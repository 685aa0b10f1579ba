use std::time::Duration;
use async_trait::async_trait;
use nm_core::{Error, Result};
use reqwest::{Client, StatusCode};
use serde_json::json;
use url::Url;

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Anything that can turn a URL into HTML.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, url: &Url) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub user_agent: String,
    /// Pause before the single retry some sites need after answering 403.
    pub forbidden_retry_delay: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: USER_AGENT.to_string(),
            forbidden_retry_delay: Duration::from_secs(2),
        }
    }
}

fn build_client(config: &FetchConfig) -> Result<Client> {
    Client::builder()
        .timeout(config.timeout)
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))
}

fn fetch_err(url: &Url, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Fetch(format!("Timed out fetching {}", url))
    } else {
        Error::Fetch(format!("Failed to fetch {}: {}", url, e))
    }
}

/// Plain GET with browser-like headers.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    forbidden_retry_delay: Duration,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            forbidden_retry_delay: config.forbidden_retry_delay,
        })
    }

    async fn get(&self, url: &Url) -> Result<reqwest::Response> {
        self.client
            .get(url.clone())
            .header("Accept", "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await
            .map_err(|e| fetch_err(url, e))
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, url: &Url) -> Result<String> {
        let mut response = self.get(url).await?;
        if response.status() == StatusCode::FORBIDDEN {
            tracing::debug!(%url, "got 403, retrying once");
            tokio::time::sleep(self.forbidden_retry_delay).await;
            response = self.get(url).await?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!("{} returned {}", url, status)));
        }
        response.text().await.map_err(|e| fetch_err(url, e))
    }
}

/// Fetches pages through a headless-browser rendering service.
///
/// The service receives `{"url": "..."}` and answers with the rendered HTML.
#[derive(Debug, Clone)]
pub struct RenderFetcher {
    client: Client,
    endpoint: Url,
    token: Option<String>,
}

impl RenderFetcher {
    pub fn new(endpoint: &str, token: Option<String>, config: &FetchConfig) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| Error::Config(format!("Invalid render endpoint '{}': {}", endpoint, e)))?;
        Ok(Self {
            client: build_client(config)?,
            endpoint,
            token,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl PageFetcher for RenderFetcher {
    fn name(&self) -> &str {
        "render"
    }

    async fn fetch(&self, url: &Url) -> Result<String> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .json(&json!({ "url": url.as_str() }));
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| fetch_err(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!("Renderer returned {} for {}", status, url)));
        }
        response.text().await.map_err(|e| fetch_err(url, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::Value;

    async fn serve(router: Router) -> Url {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Url::parse(&format!("http://{}/", addr)).unwrap()
    }

    fn quick_config() -> FetchConfig {
        FetchConfig {
            timeout: Duration::from_secs(5),
            forbidden_retry_delay: Duration::from_millis(10),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_http_fetch() {
        let router = Router::new().route(
            "/",
            get(|headers: HeaderMap| async move {
                let agent = headers.get("user-agent").and_then(|v| v.to_str().ok()).unwrap_or("");
                format!("<html><body>{}</body></html>", agent.contains("Mozilla"))
            }),
        );
        let base = serve(router).await;
        let fetcher = HttpFetcher::new(&quick_config()).unwrap();
        let html = fetcher.fetch(&base).await.unwrap();
        assert_eq!(html, "<html><body>true</body></html>");
    }

    #[tokio::test]
    async fn test_http_retries_forbidden_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/",
                get(|State(hits): State<Arc<AtomicUsize>>| async move {
                    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(AxumStatus::FORBIDDEN)
                    } else {
                        Ok("<p>second time lucky</p>")
                    }
                }),
            )
            .with_state(hits.clone());
        let base = serve(router).await;

        let fetcher = HttpFetcher::new(&quick_config()).unwrap();
        assert_eq!(fetcher.fetch(&base).await.unwrap(), "<p>second time lucky</p>");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_http_error_status_is_fetch_error() {
        let router = Router::new().route("/", get(|| async { AxumStatus::INTERNAL_SERVER_ERROR }));
        let base = serve(router).await;
        let fetcher = HttpFetcher::new(&quick_config()).unwrap();
        assert!(matches!(fetcher.fetch(&base).await, Err(Error::Fetch(_))));
    }

    #[tokio::test]
    async fn test_http_unreachable_is_fetch_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher = HttpFetcher::new(&quick_config()).unwrap();
        let url = Url::parse(&format!("http://{}/", addr)).unwrap();
        let err = fetcher.fetch(&url).await.unwrap_err();
        assert!(err.is_fetch());
    }

    #[tokio::test]
    async fn test_render_fetch() {
        let router = Router::new().route(
            "/render",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let authorized = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    == Some("Bearer secret");
                if !authorized {
                    return Err(AxumStatus::UNAUTHORIZED);
                }
                Ok(format!("<h2>rendered {}</h2>", body["url"].as_str().unwrap_or_default()))
            }),
        );
        let base = serve(router).await;
        let endpoint = base.join("render").unwrap();

        let fetcher = RenderFetcher::new(endpoint.as_str(), Some("secret".to_string()), &quick_config()).unwrap();
        let html = fetcher.fetch(&Url::parse("https://news.example/").unwrap()).await.unwrap();
        assert_eq!(html, "<h2>rendered https://news.example/</h2>");

        let anonymous = RenderFetcher::new(endpoint.as_str(), None, &quick_config()).unwrap();
        assert!(matches!(
            anonymous.fetch(&Url::parse("https://news.example/").unwrap()).await,
            Err(Error::Fetch(_))
        ));
    }

    #[test]
    fn test_render_endpoint_must_parse() {
        assert!(matches!(
            RenderFetcher::new("not a url", None, &FetchConfig::default()),
            Err(Error::Config(_))
        ));
    }
}
