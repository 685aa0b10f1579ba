//! The scrape → enrich → save loop over every configured site.
//!
//! Sites are isolated from each other: each one runs on its own task, under
//! its own timeout, and whatever goes wrong there ends up in that site's
//! [`SiteOutcome`] rather than in the caller's lap.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use nm_core::{Article, ArticleStorage, Error, Result};
use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, JoinSet};
use tokio::time::{sleep, timeout, MissedTickBehavior};
use crate::logging::Logger;
use crate::pipeline::SentimentPipeline;
use crate::registry::{SiteConfig, SiteRegistry};
use crate::site::SiteScraper;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub max_concurrent_sites: usize,
    /// Budget for one site: scrape, enrich and save.
    pub site_timeout: Duration,
    pub save_timeout: Duration,
    /// Extra attempts after a failed save.
    pub save_retries: usize,
    pub retry_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sites: 4,
            site_timeout: Duration::from_secs(600),
            save_timeout: Duration::from_secs(30),
            save_retries: 2,
            retry_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SiteOutcome {
    Stored { scraped: usize, inserted: usize },
    Failed(String),
    TimedOut,
    Cancelled,
}

impl SiteOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SiteOutcome::Stored { .. })
    }
}

impl fmt::Display for SiteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SiteOutcome::Stored { scraped, inserted } => {
                write!(f, "{} headlines, {} new", scraped, inserted)
            }
            SiteOutcome::Failed(reason) => write!(f, "failed: {}", reason),
            SiteOutcome::TimedOut => f.write_str("timed out"),
            SiteOutcome::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SiteReport {
    pub site: String,
    pub outcome: SiteOutcome,
    pub elapsed: Duration,
}

/// Per-site results of one run, in registry order.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub sites: Vec<SiteReport>,
}

impl RunReport {
    pub fn outcome(&self, site: &str) -> Option<&SiteOutcome> {
        self.sites.iter().find(|r| r.site == site).map(|r| &r.outcome)
    }

    pub fn inserted(&self) -> usize {
        self.sites
            .iter()
            .map(|r| match r.outcome {
                SiteOutcome::Stored { inserted, .. } => inserted,
                _ => 0,
            })
            .sum()
    }

    pub fn failures(&self) -> usize {
        self.sites.iter().filter(|r| !r.outcome.is_success()).count()
    }
}

/// A run in flight. Sites can be cancelled individually until [`join`](Self::join).
pub struct RunHandle {
    tasks: JoinSet<SiteReport>,
    aborts: HashMap<String, AbortHandle>,
    cancelled: HashSet<String>,
    order: Vec<String>,
}

impl RunHandle {
    /// Stop one site's work. Returns false for unknown sites.
    pub fn cancel(&mut self, site: &str) -> bool {
        match self.aborts.get(site) {
            Some(handle) => {
                handle.abort();
                self.cancelled.insert(site.to_string());
                true
            }
            None => false,
        }
    }

    pub fn sites(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub async fn join(mut self) -> RunReport {
        let mut finished: HashMap<String, SiteReport> = HashMap::new();
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(report) => {
                    finished.insert(report.site.clone(), report);
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => tracing::error!("site task panicked: {}", e),
            }
        }

        let sites = self
            .order
            .into_iter()
            .map(|site| match finished.remove(&site) {
                Some(report) => report,
                None => {
                    // Tasks that never reported were either aborted or panicked.
                    let outcome = if self.cancelled.contains(&site) {
                        SiteOutcome::Cancelled
                    } else {
                        SiteOutcome::Failed("site task panicked".to_string())
                    };
                    SiteReport {
                        site,
                        outcome,
                        elapsed: Duration::ZERO,
                    }
                }
            })
            .collect();
        RunReport { sites }
    }
}

#[derive(Clone)]
pub struct Worker {
    registry: Arc<SiteRegistry>,
    scraper: SiteScraper,
    pipeline: SentimentPipeline,
    storage: Arc<dyn ArticleStorage>,
    config: WorkerConfig,
    semaphore: Arc<Semaphore>,
}

impl Worker {
    pub fn new(
        registry: SiteRegistry,
        scraper: SiteScraper,
        pipeline: SentimentPipeline,
        storage: Arc<dyn ArticleStorage>,
        config: WorkerConfig,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_sites.max(1)));
        Self {
            registry: Arc::new(registry),
            scraper,
            pipeline,
            storage,
            config,
            semaphore,
        }
    }

    pub fn registry(&self) -> &SiteRegistry {
        &self.registry
    }

    /// Scrape, enrich and store one site. Returns `(scraped, inserted)`.
    pub async fn run_site(&self, site: &SiteConfig) -> Result<(usize, usize)> {
        let logger = Logger::new().with_prefix(site.name.as_str());

        let headlines = self.scraper.scrape(site).await?;
        logger.info(&format!("found {} headlines", headlines.len()));
        if headlines.is_empty() {
            return Ok((0, 0));
        }

        let scraped = headlines.len();
        let articles = self.pipeline.process(headlines).await;
        let classified = articles.iter().filter(|a| a.sentiment_label.is_some()).count();
        logger.debug(&format!("classified {}/{} articles", classified, scraped));

        let inserted = self.save(&articles, &logger.with_prefix("save")).await?;
        Ok((scraped, inserted))
    }

    async fn save(&self, articles: &[Article], logger: &Logger) -> Result<usize> {
        let mut attempt = 0;
        loop {
            let result = match timeout(self.config.save_timeout, self.storage.save(articles)).await {
                Ok(result) => result,
                Err(_) => Err(Error::Storage(format!("Timed out saving to {}", self.storage.name()))),
            };
            match result {
                Err(e) if e.is_storage() && attempt < self.config.save_retries => {
                    attempt += 1;
                    logger.warn(&format!("attempt {} failed: {}", attempt, e));
                    sleep(self.config.retry_delay).await;
                }
                Ok(inserted) => {
                    logger.info(&format!("stored {} new of {}", inserted, articles.len()));
                    return Ok(inserted);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn site_task(self, site: SiteConfig) -> SiteReport {
        let started = Instant::now();
        let outcome = match self.semaphore.clone().acquire_owned().await {
            Ok(_permit) => match timeout(self.config.site_timeout, self.run_site(&site)).await {
                Ok(Ok((scraped, inserted))) => SiteOutcome::Stored { scraped, inserted },
                Ok(Err(e)) => SiteOutcome::Failed(e.to_string()),
                Err(_) => SiteOutcome::TimedOut,
            },
            Err(_) => SiteOutcome::Failed("worker is shutting down".to_string()),
        };

        let logger = Logger::new().with_prefix(site.name.as_str());
        match &outcome {
            SiteOutcome::Stored { .. } => logger.info(&outcome.to_string()),
            SiteOutcome::Failed(_) => logger.error(&outcome.to_string()),
            _ => logger.warn(&outcome.to_string()),
        }
        SiteReport {
            site: site.name,
            outcome,
            elapsed: started.elapsed(),
        }
    }

    /// Spawn one task per site and hand back control over them.
    pub fn start(&self) -> RunHandle {
        let mut tasks = JoinSet::new();
        let mut aborts = HashMap::new();
        let mut order = Vec::with_capacity(self.registry.len());

        for site in self.registry.iter() {
            let handle = tasks.spawn(self.clone().site_task(site.clone()));
            aborts.insert(site.name.clone(), handle);
            order.push(site.name.clone());
        }

        RunHandle {
            tasks,
            aborts,
            cancelled: HashSet::new(),
            order,
        }
    }

    /// One pass over every site. Never fails; problems are in the report.
    pub async fn run_once(&self) -> RunReport {
        let started = Instant::now();
        let report = self.start().join().await;
        tracing::info!(
            sites = report.sites.len(),
            failures = report.failures(),
            inserted = report.inserted(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "run finished"
        );
        report
    }

    /// Run now and then once per `interval` until `shutdown` resolves.
    /// A run in progress at shutdown is abandoned. Returns the number of
    /// completed runs.
    pub async fn run_every<F>(&self, interval: Duration, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut runs = 0;
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = self.run_once() => runs += 1,
            }
        }
        tracing::info!(runs, "worker stopped");
        runs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use async_trait::async_trait;
    use nm_core::{RecordFilter, Sentiment, SentimentModel, SentimentScore, StoredRecord, Summarizer};
    use url::Url;
    use crate::fetch::PageFetcher;
    use crate::pipeline::PipelineConfig;
    use crate::selector::SelectorExpr;

    /// Front pages by host. Hosts named `slow.*` hang, unknown hosts fail.
    struct Sites;

    #[async_trait]
    impl PageFetcher for Sites {
        fn name(&self) -> &str {
            "sites"
        }

        async fn fetch(&self, url: &Url) -> Result<String> {
            match url.host_str() {
                Some("good.example") if url.path() == "/" => Ok(r#"
                    <h2><a href="/one">First good story today</a></h2>
                    <h2><a href="/two">Second good story today</a></h2>
                "#
                .to_string()),
                Some("good.example") => Ok("<p>Everyone was pleased.</p>".to_string()),
                Some(host) if host.starts_with("slow.") => {
                    sleep(Duration::from_secs(30)).await;
                    Ok(String::new())
                }
                _ => Err(Error::Fetch(format!("cannot reach {}", url))),
            }
        }
    }

    struct Fixed;

    #[async_trait]
    impl SentimentModel for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn classify(&self, _text: &str) -> Result<SentimentScore> {
            Ok(SentimentScore::new(Sentiment::Positive, 0.9))
        }
    }

    #[async_trait]
    impl Summarizer for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn summarize(&self, _text: &str) -> Result<String> {
            Ok("Pleased.".to_string())
        }
    }

    /// Fails the first `failures` saves, then records everything.
    #[derive(Default)]
    struct Flaky {
        failures: usize,
        attempts: AtomicUsize,
        saved: tokio::sync::Mutex<Vec<Article>>,
    }

    #[async_trait]
    impl ArticleStorage for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn save(&self, articles: &[Article]) -> Result<usize> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(Error::Storage("connection reset".to_string()));
            }
            self.saved.lock().await.extend_from_slice(articles);
            Ok(articles.len())
        }

        async fn list(&self, _filter: &RecordFilter) -> Result<Vec<StoredRecord>> {
            Ok(Vec::new())
        }
    }

    fn site(name: &str, host: &str) -> SiteConfig {
        SiteConfig::new(
            name,
            &format!("https://{}/", host),
            SelectorExpr::css("h2").unwrap(),
            SelectorExpr::css("a").unwrap(),
            false,
        )
        .unwrap()
    }

    fn worker(sites: Vec<SiteConfig>, storage: Arc<dyn ArticleStorage>) -> Worker {
        let fetcher: Arc<dyn PageFetcher> = Arc::new(Sites);
        let pipeline = SentimentPipeline::new(fetcher.clone(), Arc::new(Fixed), Arc::new(Fixed), PipelineConfig::default());
        Worker::new(
            SiteRegistry::from_sites(sites).unwrap(),
            SiteScraper::new(fetcher),
            pipeline,
            storage,
            WorkerConfig {
                site_timeout: Duration::from_millis(500),
                retry_delay: Duration::from_millis(10),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_failing_site_does_not_stop_others() {
        let storage = Arc::new(Flaky::default());
        let worker = worker(
            vec![site("good", "good.example"), site("down", "down.example"), site("slow", "slow.example")],
            storage.clone(),
        );

        let report = worker.run_once().await;
        assert_eq!(report.sites.len(), 3);
        assert_eq!(report.outcome("good"), Some(&SiteOutcome::Stored { scraped: 2, inserted: 2 }));
        assert!(matches!(report.outcome("down"), Some(SiteOutcome::Failed(_))));
        assert_eq!(report.outcome("slow"), Some(&SiteOutcome::TimedOut));
        assert_eq!(report.failures(), 2);

        let saved = storage.saved.lock().await;
        assert_eq!(saved.len(), 2);
        assert!(saved.iter().all(|a| a.source == "good" && a.summary.as_deref() == Some("Pleased.")));
    }

    #[tokio::test]
    async fn test_save_is_retried() {
        let storage = Arc::new(Flaky { failures: 2, ..Default::default() });
        let recovering = worker(vec![site("good", "good.example")], storage.clone());
        let report = recovering.run_once().await;
        assert!(report.outcome("good").unwrap().is_success());
        assert_eq!(storage.attempts.load(Ordering::SeqCst), 3);

        let storage = Arc::new(Flaky { failures: 5, ..Default::default() });
        let exhausted = worker(vec![site("good", "good.example")], storage.clone());
        let report = exhausted.run_once().await;
        assert!(matches!(report.outcome("good"), Some(SiteOutcome::Failed(_))));
        assert_eq!(storage.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancel_site() {
        let storage = Arc::new(Flaky::default());
        let worker = worker(vec![site("good", "good.example"), site("slow", "slow.example")], storage);

        let mut handle = worker.start();
        assert_eq!(handle.sites().collect::<Vec<_>>(), vec!["good", "slow"]);
        assert!(handle.cancel("slow"));
        assert!(!handle.cancel("unknown"));

        let report = handle.join().await;
        assert_eq!(report.outcome("slow"), Some(&SiteOutcome::Cancelled));
        assert!(report.outcome("good").unwrap().is_success());
    }

    #[tokio::test]
    async fn test_run_every_stops_on_shutdown() {
        let storage = Arc::new(Flaky::default());
        let worker = worker(vec![site("good", "good.example")], storage.clone());

        let runs = worker.run_every(Duration::from_millis(50), sleep(Duration::from_millis(180))).await;
        assert!(runs >= 2, "expected repeated runs, got {}", runs);
        assert!(storage.attempts.load(Ordering::SeqCst) >= runs);
    }
}
