use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use anyhow::Context;
use clap::Parser;
use nm_core::{ArticleStorage, RecordFilter};
use nm_inference::{create_models, ModelConfig, ModelKind};
use nm_scrapers::cli::{handle_command, ScraperArgs};
use nm_scrapers::{
    init_logging, FetchConfig, HttpFetcher, PageFetcher, PipelineConfig, RenderFetcher, RunReport,
    SentimentPipeline, SiteRegistry, SiteScraper, Worker, WorkerConfig,
};
use nm_storage::StorageConfig;
use nm_web::AppState;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq)]
struct HumanDuration(Duration);

impl FromStr for HumanDuration {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut total_seconds = 0u64;
        let mut current_number = String::new();
        let mut has_unit = false;

        for c in s.chars() {
            if c.is_ascii_digit() {
                current_number.push(c);
            } else if let Ok(num) = current_number.parse::<u64>() {
                let unit = match c {
                    's' => 1,
                    'm' => 60,
                    'h' => 3600,
                    'd' => 86400,
                    _ => return Err(format!("Invalid duration unit: {}", c)),
                };
                total_seconds = num
                    .checked_mul(unit)
                    .and_then(|secs| total_seconds.checked_add(secs))
                    .ok_or_else(|| format!("Duration is too large: {}", s))?;
                current_number.clear();
                has_unit = true;
            } else if !c.is_whitespace() {
                return Err(format!("Invalid character in duration: {}", c));
            }
        }

        // A trailing bare number counts as seconds
        if !current_number.is_empty() {
            let secs = current_number
                .parse::<u64>()
                .map_err(|_| "Invalid number in duration".to_string())?;
            total_seconds = total_seconds
                .checked_add(secs)
                .ok_or_else(|| format!("Duration is too large: {}", s))?;
            has_unit = true;
        }

        if !has_unit {
            return Err("Duration must include a number".to_string());
        }
        if total_seconds == 0 {
            return Err("Duration must be greater than zero".to_string());
        }

        Ok(HumanDuration(Duration::from_secs(total_seconds)))
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Scrape news headlines, score their sentiment and serve them", long_about = None)]
struct Cli {
    /// Site configuration file
    #[arg(long, env = "NEWSMOOD_SITES", default_value = "news_sites.json", global = true)]
    sites: PathBuf,
    /// Storage backend URL: memory:// or sqlite://<directory>
    #[arg(long, env = "NEWSMOOD_STORAGE_URL", default_value = "memory://", global = true)]
    storage_url: String,
    #[arg(long, env = "NEWSMOOD_DATABASE", default_value = nm_storage::DEFAULT_DATABASE, global = true)]
    database: String,
    #[arg(long, env = "NEWSMOOD_COLLECTION", default_value = nm_storage::DEFAULT_COLLECTION, global = true)]
    collection: String,
    /// Model family: lexicon (default) or chat
    #[arg(long, env = "NEWSMOOD_MODEL", default_value = "lexicon", global = true)]
    model: ModelKind,
    /// OpenAI-compatible endpoint for the chat model
    #[arg(long, env = "NEWSMOOD_MODEL_URL", global = true)]
    model_url: Option<String>,
    #[arg(long, env = "NEWSMOOD_MODEL_API_KEY", hide_env_values = true, global = true)]
    model_api_key: Option<String>,
    #[arg(long, env = "NEWSMOOD_MODEL_NAME", global = true)]
    model_name: Option<String>,
    /// Headless rendering service for sites marked dynamic
    #[arg(long, env = "NEWSMOOD_RENDER_URL", global = true)]
    render_url: Option<String>,
    #[arg(long, env = "NEWSMOOD_RENDER_TOKEN", hide_env_values = true, global = true)]
    render_token: Option<String>,
    /// Sites scraped at the same time
    #[arg(long, env = "NEWSMOOD_CONCURRENCY", default_value_t = 4, global = true)]
    concurrency: usize,
    /// Per-request timeout (e.g. 30s, 1m)
    #[arg(long, env = "NEWSMOOD_REQUEST_TIMEOUT", default_value = "30s", global = true)]
    request_timeout: HumanDuration,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Inspect the configured sites
    Sites(ScraperArgs),
    /// Scrape every site (or one), enrich and store the articles
    Run {
        /// Only run this site
        #[arg(long)]
        site: Option<String>,
        /// Keep running with this interval between runs (e.g. 1h, 30m, 1h15m30s)
        #[arg(long)]
        interval: Option<HumanDuration>,
    },
    /// Serve the read API, optionally running the worker alongside it
    Serve {
        #[arg(long, env = "NEWSMOOD_BIND", default_value = "127.0.0.1:8000")]
        bind: String,
        /// Also run the worker with this interval between runs
        #[arg(long)]
        interval: Option<HumanDuration>,
    },
}

impl Cli {
    fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            timeout: self.request_timeout.0,
            ..Default::default()
        }
    }

    fn storage_config(&self) -> StorageConfig {
        StorageConfig {
            url: self.storage_url.clone(),
            database: self.database.clone(),
            collection: self.collection.clone(),
        }
    }

    fn model_config(&self) -> ModelConfig {
        ModelConfig {
            kind: self.model,
            api_url: self.model_url.clone(),
            api_key: self.model_api_key.clone(),
            model_name: self.model_name.clone(),
            request_timeout: self.request_timeout.0.saturating_mul(2),
            ..Default::default()
        }
    }

    fn site_scraper(&self) -> anyhow::Result<SiteScraper> {
        let fetch_config = self.fetch_config();
        let mut scraper = SiteScraper::new(Arc::new(HttpFetcher::new(&fetch_config)?));
        if let Some(ref endpoint) = self.render_url {
            let renderer = RenderFetcher::new(endpoint, self.render_token.clone(), &fetch_config)?;
            info!("🖥️ Rendering dynamic sites through {}", renderer.endpoint());
            scraper = scraper.with_renderer(Arc::new(renderer));
        }
        Ok(scraper)
    }

    fn registry(&self) -> anyhow::Result<SiteRegistry> {
        let registry = SiteRegistry::load(&self.sites)
            .with_context(|| format!("Failed to load site configuration from {}", self.sites.display()))?;
        info!("🦗 Loaded {} sites: {}", registry.len(), registry.names().collect::<Vec<_>>().join(", "));
        Ok(registry)
    }

    fn worker(&self, registry: SiteRegistry, storage: Arc<dyn ArticleStorage>) -> anyhow::Result<Worker> {
        let models = create_models(&self.model_config())?;
        info!(
            "🧠 Models ready (sentiment: {}, summary: {})",
            models.sentiment.name(),
            models.summarizer.name()
        );

        let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpFetcher::new(&self.fetch_config())?);
        let pipeline = SentimentPipeline::new(
            fetcher,
            models.sentiment,
            models.summarizer,
            PipelineConfig {
                concurrency: self.concurrency.max(1),
                model_timeout: self.request_timeout.0.saturating_mul(2),
            },
        );
        let config = WorkerConfig {
            max_concurrent_sites: self.concurrency.max(1),
            ..Default::default()
        };
        Ok(Worker::new(registry, self.site_scraper()?, pipeline, storage, config))
    }
}

/// Open storage and make sure it answers, retrying a few times.
async fn open_storage(config: &StorageConfig, max_retries: u32) -> anyhow::Result<Arc<dyn ArticleStorage>> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = async {
            let storage = nm_storage::create_storage(config).await?;
            storage.list(&RecordFilter { limit: Some(1), ..Default::default() }).await?;
            Ok::<_, nm_core::Error>(storage)
        }
        .await;

        match result {
            Ok(storage) => return Ok(storage),
            Err(e) if e.is_storage() && attempt < max_retries => {
                info!("Storage not ready ({}), retrying {}/{}...", e, attempt, max_retries);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
            Err(e) => return Err(e).context("Failed to open storage"),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("👋 Shutting down");
}

fn print_report(report: &RunReport) {
    for site in &report.sites {
        println!("{:<16} {} ({:.1}s)", site.site, site.outcome, site.elapsed.as_secs_f32());
    }
    println!(
        "{} new articles, {} of {} sites failed",
        report.inserted(),
        report.failures(),
        report.sites.len()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Sites(ref args) => {
            let registry = cli.registry()?;
            let scraper = cli.site_scraper()?;
            handle_command(args.clone(), &registry, &scraper).await?;
        }
        Commands::Run { ref site, interval } => {
            let mut registry = cli.registry()?;
            if let Some(site) = site {
                registry = registry.only(site)?;
            }
            let storage = open_storage(&cli.storage_config(), 3).await?;
            let worker = cli.worker(registry, storage)?;

            match interval {
                Some(interval) => {
                    info!("⏱️ Running every {}s", interval.0.as_secs());
                    let runs = worker.run_every(interval.0, shutdown_signal()).await;
                    info!("Completed {} runs", runs);
                }
                None => print_report(&worker.run_once().await),
            }
        }
        Commands::Serve { ref bind, interval } => {
            let storage = open_storage(&cli.storage_config(), 3).await?;
            let listener = tokio::net::TcpListener::bind(bind)
                .await
                .with_context(|| format!("Failed to bind {}", bind))?;

            let background = match interval {
                Some(interval) => {
                    let worker = cli.worker(cli.registry()?, storage.clone())?;
                    info!("⏱️ Worker running every {}s", interval.0.as_secs());
                    Some(tokio::spawn(async move { worker.run_every(interval.0, shutdown_signal()).await }))
                }
                None => None,
            };

            nm_web::serve(listener, AppState::new(storage), shutdown_signal()).await?;
            if let Some(handle) = background {
                handle.abort();
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_human_duration() {
        assert_eq!("90".parse::<HumanDuration>().unwrap().0, Duration::from_secs(90));
        assert_eq!("30m".parse::<HumanDuration>().unwrap().0, Duration::from_secs(1800));
        assert_eq!("1h15m30s".parse::<HumanDuration>().unwrap().0, Duration::from_secs(4530));
        assert_eq!("1d".parse::<HumanDuration>().unwrap().0, Duration::from_secs(86400));
        assert!("".parse::<HumanDuration>().is_err());
        assert!("5x".parse::<HumanDuration>().is_err());
        assert!("0s".parse::<HumanDuration>().is_err());
        assert!("h".parse::<HumanDuration>().is_err());
    }

    #[test]
    fn test_human_duration_overflow_is_an_error() {
        let err = "300000000000000d".parse::<HumanDuration>().unwrap_err();
        assert!(err.contains("too large"));
        assert!("18446744073709551615s1s".parse::<HumanDuration>().is_err());
        assert!("18446744073709551615s 1".parse::<HumanDuration>().is_err());
        assert_eq!(
            "18446744073709551615s".parse::<HumanDuration>().unwrap().0,
            Duration::from_secs(u64::MAX)
        );
    }

    #[test]
    fn test_bundled_site_config_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../news_sites.json");
        let registry = SiteRegistry::load(path).unwrap();
        assert!(registry.len() >= 4);
        assert!(registry.get("reuters").unwrap().dynamic);
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "newsmood",
            "run",
            "--site",
            "bbc",
            "--interval",
            "15m",
            "--storage-url",
            "sqlite:///tmp/newsmood",
        ])
        .unwrap();
        assert_eq!(cli.storage_url, "sqlite:///tmp/newsmood");
        match cli.command {
            Commands::Run { site, interval } => {
                assert_eq!(site.as_deref(), Some("bbc"));
                assert_eq!(interval, Some(HumanDuration(Duration::from_secs(900))));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
