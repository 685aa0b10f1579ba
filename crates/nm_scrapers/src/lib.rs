pub mod article;
pub mod cli;
pub mod fetch;
pub mod logging;
pub mod pipeline;
pub mod registry;
pub mod selector;
pub mod site;
pub mod worker;

pub use cli::{handle_command, ScraperArgs, ScraperCommands};
pub use fetch::{FetchConfig, HttpFetcher, PageFetcher, RenderFetcher};
pub use logging::{init_logging, Logger};
pub use pipeline::{PipelineConfig, SentimentPipeline};
pub use registry::{SiteConfig, SiteRegistry};
pub use selector::SelectorExpr;
pub use site::{extract_headlines, HeadlineFilter, SiteScraper};
pub use worker::{RunHandle, RunReport, SiteOutcome, SiteReport, Worker, WorkerConfig};

pub mod prelude {
    pub use super::fetch::PageFetcher;
    pub use super::registry::{SiteConfig, SiteRegistry};
    pub use super::worker::{Worker, WorkerConfig};
    pub use nm_core::{Article, Error, Result};
}
