use clap::{Args, Subcommand};
use nm_core::{Article, Result};
use crate::registry::SiteRegistry;
use crate::site::SiteScraper;

#[derive(Args, Debug, Clone)]
pub struct ScraperArgs {
    #[command(subcommand)]
    pub command: ScraperCommands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ScraperCommands {
    /// List the configured sites
    List,
    /// Fetch a site's front page and print its headlines without storing them
    Scrape {
        /// Site name as it appears in the site configuration
        site: String,
    },
}

pub async fn handle_command(args: ScraperArgs, registry: &SiteRegistry, scraper: &SiteScraper) -> Result<()> {
    match args.command {
        ScraperCommands::List => {
            for line in site_lines(registry) {
                println!("{}", line);
            }
        }
        ScraperCommands::Scrape { site } => {
            let registry = registry.only(&site)?;
            for config in registry.iter() {
                let articles = scraper.scrape(config).await?;
                println!("Found {} headlines on {}", articles.len(), config.name);
                for article in &articles {
                    println!("{}", headline_line(article));
                }
            }
        }
    }
    Ok(())
}

fn site_lines(registry: &SiteRegistry) -> Vec<String> {
    registry
        .iter()
        .map(|site| {
            format!(
                "{:<16} {} ({}{})",
                site.name,
                site.base_url,
                site.headline.kind(),
                if site.dynamic { ", rendered" } else { "" }
            )
        })
        .collect()
}

fn headline_line(article: &Article) -> String {
    format!("  - {} - {}", article.headline, article.link)
}
