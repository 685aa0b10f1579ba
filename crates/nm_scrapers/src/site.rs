use std::collections::HashSet;
use std::sync::Arc;
use nm_core::text::{clean_text, word_count};
use nm_core::{Article, Error, Result};
use scraper::Html;
use url::Url;
use crate::fetch::PageFetcher;
use crate::registry::SiteConfig;

/// Drops headlines that are too short or that point at non-article content.
#[derive(Debug, Clone)]
pub struct HeadlineFilter {
    pub min_words: usize,
    pub blocked_terms: Vec<String>,
}

impl Default for HeadlineFilter {
    fn default() -> Self {
        Self {
            min_words: 3,
            blocked_terms: vec!["video".to_string(), "advertisement".to_string()],
        }
    }
}

impl HeadlineFilter {
    /// Keeps everything that is not empty.
    pub fn permissive() -> Self {
        Self {
            min_words: 1,
            blocked_terms: Vec::new(),
        }
    }

    pub fn accepts(&self, headline: &str) -> bool {
        if word_count(headline) < self.min_words {
            return false;
        }
        let lower = headline.to_lowercase();
        !self.blocked_terms.iter().any(|term| lower.contains(term.as_str()))
    }
}

/// Resolve an href against the page it was found on.
///
/// Only http(s) results are kept and the fragment is dropped, so
/// `/story#comments` and `/story` are the same article.
pub fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let mut url = base.join(href).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}

/// Pull headline and link pairs out of a page.
///
/// Fails with a selector error when the headline selector matches nothing,
/// which usually means the site changed its markup.
pub fn extract_headlines(html: &str, site: &SiteConfig, filter: &HeadlineFilter) -> Result<Vec<Article>> {
    let document = Html::parse_document(html);
    let matches = site.headline.select_document(&document);
    if matches.is_empty() {
        return Err(Error::Selector(format!(
            "Headline {} selector '{}' matched nothing on {}",
            site.headline.kind(),
            site.headline.source(),
            site.base_url
        )));
    }

    let mut seen = HashSet::new();
    let mut articles = Vec::new();
    for found in &matches {
        let headline = clean_text(&found.text());
        if headline.is_empty() || !filter.accepts(&headline) {
            continue;
        }

        let Some(href) = site.link.select_relative(found.anchor()).and_then(|m| m.link()) else {
            tracing::debug!(site = %site.name, %headline, "no link for headline, skipping");
            continue;
        };
        let Some(link) = resolve_link(&site.base_url, &href) else {
            tracing::debug!(site = %site.name, %href, "unusable link, skipping");
            continue;
        };

        if seen.insert((headline.clone(), link.to_string())) {
            articles.push(Article::new(site.name.clone(), headline, link.to_string()));
        }
    }
    Ok(articles)
}

/// Fetches a site's front page and extracts its headlines.
#[derive(Clone)]
pub struct SiteScraper {
    static_fetcher: Arc<dyn PageFetcher>,
    render_fetcher: Option<Arc<dyn PageFetcher>>,
    filter: HeadlineFilter,
}

impl SiteScraper {
    pub fn new(static_fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            static_fetcher,
            render_fetcher: None,
            filter: HeadlineFilter::default(),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn PageFetcher>) -> Self {
        self.render_fetcher = Some(renderer);
        self
    }

    pub fn with_filter(mut self, filter: HeadlineFilter) -> Self {
        self.filter = filter;
        self
    }

    fn fetcher_for(&self, site: &SiteConfig) -> Result<&dyn PageFetcher> {
        if !site.dynamic {
            return Ok(self.static_fetcher.as_ref());
        }
        self.render_fetcher.as_deref().ok_or_else(|| {
            Error::Fetch(format!(
                "Site '{}' needs rendering but no render endpoint is configured",
                site.name
            ))
        })
    }

    /// Fetch and extract. Fetch failures propagate; a selector that matches
    /// nothing is logged and yields no articles.
    pub async fn scrape(&self, site: &SiteConfig) -> Result<Vec<Article>> {
        let fetcher = self.fetcher_for(site)?;
        tracing::debug!(site = %site.name, fetcher = fetcher.name(), url = %site.base_url, "fetching front page");
        let html = fetcher.fetch(&site.base_url).await?;

        match extract_headlines(&html, site, &self.filter) {
            Ok(articles) => Ok(articles),
            Err(Error::Selector(message)) => {
                tracing::warn!(site = %site.name, "{}", message);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use async_trait::async_trait;
    use crate::selector::SelectorExpr;

    const FRONT_PAGE: &str = r#"
        <html><body>
          <div class="story"><a href="/world/flood-warning#comments"><h2>Flood warning issued for the valley</h2></a></div>
          <div class="story"><h2><a href="https://other.example/markets">Markets rally after the rate decision</a></h2></div>
          <div class="story"><a href="/world/flood-warning"><h2>Flood warning issued for the valley</h2></a></div>
          <div class="story"><a href="/video/1"><h2>Video: the storm arrives</h2></a></div>
          <div class="story"><a href="/short"><h2>Too short</h2></a></div>
          <div class="story"><h2>Headline without any link at all</h2></div>
          <div class="story"><a href="javascript:void(0)"><h2>Scripted link goes nowhere useful</h2></a></div>
        </body></html>
    "#;

    fn site(dynamic: bool) -> SiteConfig {
        SiteConfig::new(
            "example",
            "https://news.example/front",
            SelectorExpr::css("div.story h2").unwrap(),
            SelectorExpr::css("a[href]").unwrap(),
            dynamic,
        )
        .unwrap()
    }

    struct FixedPage {
        html: &'static str,
        calls: AtomicUsize,
    }

    impl FixedPage {
        fn new(html: &'static str) -> Arc<Self> {
            Arc::new(Self { html, calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl PageFetcher for FixedPage {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn fetch(&self, _url: &Url) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.html.to_string())
        }
    }

    #[test]
    fn test_extract_headlines() {
        let articles = extract_headlines(FRONT_PAGE, &site(false), &HeadlineFilter::default()).unwrap();
        let pairs: Vec<(&str, &str)> = articles.iter().map(|a| (a.headline.as_str(), a.link.as_str())).collect();
        assert_eq!(
            pairs,
            vec![
                ("Flood warning issued for the valley", "https://news.example/world/flood-warning"),
                ("Markets rally after the rate decision", "https://other.example/markets"),
            ]
        );
        assert!(articles.iter().all(|a| a.source == "example" && a.body.is_none()));
    }

    #[test]
    fn test_links_are_absolute() {
        let articles = extract_headlines(FRONT_PAGE, &site(false), &HeadlineFilter::permissive()).unwrap();
        assert!(!articles.is_empty());
        for article in &articles {
            let url = Url::parse(&article.link).unwrap();
            assert!(matches!(url.scheme(), "http" | "https"));
            assert!(url.fragment().is_none());
        }
        assert!(articles.iter().any(|a| a.headline == "Too short"));
        assert!(articles.iter().any(|a| a.headline.starts_with("Video")));
    }

    #[test]
    fn test_no_headline_match_is_selector_error() {
        let result = extract_headlines("<html><body><p>nothing</p></body></html>", &site(false), &HeadlineFilter::default());
        assert!(matches!(result, Err(Error::Selector(_))));
    }

    #[test]
    fn test_xpath_site() {
        let site = SiteConfig::new(
            "example",
            "https://news.example/",
            SelectorExpr::xpath("//div[@class='story']//h2").unwrap(),
            SelectorExpr::xpath("ancestor-or-self::a/@href").unwrap(),
            false,
        )
        .unwrap();
        let articles = extract_headlines(FRONT_PAGE, &site, &HeadlineFilter::default()).unwrap();
        // The markets link sits below its headline, out of reach of this link path.
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].link, "https://news.example/world/flood-warning");
    }

    #[test]
    fn test_resolve_link() {
        let base = Url::parse("https://news.example/section/").unwrap();
        assert_eq!(resolve_link(&base, "story").unwrap().as_str(), "https://news.example/section/story");
        assert_eq!(resolve_link(&base, "//cdn.example/x").unwrap().as_str(), "https://cdn.example/x");
        assert!(resolve_link(&base, "mailto:desk@news.example").is_none());
        assert!(resolve_link(&base, "  ").is_none());
    }

    #[test]
    fn test_headline_filter() {
        let filter = HeadlineFilter::default();
        assert!(filter.accepts("Three whole words"));
        assert!(!filter.accepts("Two words"));
        assert!(!filter.accepts("Sponsored ADVERTISEMENT for new cars"));
    }

    #[tokio::test]
    async fn test_scrape_is_deterministic() {
        let page = FixedPage::new(FRONT_PAGE);
        let scraper = SiteScraper::new(page.clone());
        let first = scraper.scrape(&site(false)).await.unwrap();
        let second = scraper.scrape(&site(false)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(page.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_scrape_selector_miss_is_empty() {
        let scraper = SiteScraper::new(FixedPage::new("<html><body></body></html>"));
        assert!(scraper.scrape(&site(false)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dynamic_site_uses_renderer() {
        let plain = FixedPage::new("<html></html>");
        let rendered = FixedPage::new(FRONT_PAGE);

        let without = SiteScraper::new(plain.clone());
        assert!(matches!(without.scrape(&site(true)).await, Err(Error::Fetch(_))));

        let with = SiteScraper::new(plain.clone()).with_renderer(rendered.clone());
        assert_eq!(with.scrape(&site(true)).await.unwrap().len(), 2);
        assert_eq!(rendered.calls.load(Ordering::SeqCst), 1);
        assert_eq!(plain.calls.load(Ordering::SeqCst), 0);
    }
}
