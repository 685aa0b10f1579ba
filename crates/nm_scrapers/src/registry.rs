//! Site registry: the JSON file that says where headlines live.
//!
//! ```json
//! {
//!   "guardian": {
//!     "base_url": "https://www.theguardian.com/international",
//!     "headline_xpath": "//h3[contains(@class, 'card-headline')]",
//!     "link_xpath": "ancestor::a/@href",
//!     "dynamic": false
//!   },
//!   "bbc": {
//!     "base_url": "https://www.bbc.com/news",
//!     "headline_selector": "h2[data-testid='card-headline']",
//!     "link_selector": "a[href]"
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use nm_core::{Error, Result};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use url::Url;
use crate::selector::SelectorExpr;

#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub name: String,
    pub base_url: Url,
    pub headline: SelectorExpr,
    pub link: SelectorExpr,
    /// Content is filled in by client-side script and needs rendering.
    pub dynamic: bool,
}

impl SiteConfig {
    pub fn new(
        name: impl Into<String>,
        base_url: &str,
        headline: SelectorExpr,
        link: SelectorExpr,
        dynamic: bool,
    ) -> Result<Self> {
        let name = name.into();
        let base_url = parse_base_url(&name, base_url)?;
        Ok(Self {
            name,
            base_url,
            headline,
            link,
            dynamic,
        })
    }
}

fn parse_base_url(name: &str, raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| Error::Config(format!("Site '{}': invalid base_url '{}': {}", name, raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(Error::Config(format!(
            "Site '{}': base_url must be an absolute http(s) URL, got '{}'",
            name, raw
        )));
    }
    Ok(url)
}

#[derive(Debug, Deserialize)]
struct RawSite {
    base_url: Option<String>,
    headline_xpath: Option<String>,
    headline_selector: Option<String>,
    link_xpath: Option<String>,
    link_selector: Option<String>,
    #[serde(default)]
    dynamic: bool,
}

fn pick_selector(name: &str, field: &str, xpath: Option<String>, css: Option<String>) -> Result<SelectorExpr> {
    match (xpath, css) {
        (Some(xpath), None) => SelectorExpr::xpath(&xpath)
            .map_err(|e| Error::Config(format!("Site '{}': {}_xpath: {}", name, field, e))),
        (None, Some(css)) => SelectorExpr::css(&css)
            .map_err(|e| Error::Config(format!("Site '{}': {}_selector: {}", name, field, e))),
        (Some(_), Some(_)) => Err(Error::Config(format!(
            "Site '{}': give either {}_xpath or {}_selector, not both",
            name, field, field
        ))),
        (None, None) => Err(Error::Config(format!(
            "Site '{}': missing required field {}_xpath or {}_selector",
            name, field, field
        ))),
    }
}

impl RawSite {
    fn compile(self, name: String) -> Result<SiteConfig> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::Config(format!("Site '{}': missing required field base_url", name)))?;
        let headline = pick_selector(&name, "headline", self.headline_xpath, self.headline_selector)?;
        let link = pick_selector(&name, "link", self.link_xpath, self.link_selector)?;
        SiteConfig::new(name, &base_url, headline, link, self.dynamic)
    }
}

/// Entries in file order. A plain map would silently drop repeated names.
struct SiteEntries(Vec<(String, RawSite)>);

impl<'de> Deserialize<'de> for SiteEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = SiteEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object mapping site names to site definitions")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<SiteEntries, A::Error> {
                let mut entries = Vec::new();
                while let Some((name, site)) = map.next_entry::<String, RawSite>()? {
                    entries.push((name, site));
                }
                Ok(SiteEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SiteRegistry {
    sites: BTreeMap<String, SiteConfig>,
}

impl SiteRegistry {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let SiteEntries(entries) = serde_json::from_str(raw)
            .map_err(|e| Error::Config(format!("Malformed site configuration: {}", e)))?;
        let sites = entries
            .into_iter()
            .map(|(name, raw)| raw.compile(name))
            .collect::<Result<Vec<_>>>()?;
        Self::from_sites(sites)
    }

    pub fn from_sites(sites: impl IntoIterator<Item = SiteConfig>) -> Result<Self> {
        let mut registry = BTreeMap::new();
        for site in sites {
            if site.name.trim().is_empty() {
                return Err(Error::Config("Site names must not be empty".to_string()));
            }
            if registry.contains_key(&site.name) {
                return Err(Error::Config(format!("Duplicate site name '{}'", site.name)));
            }
            registry.insert(site.name.clone(), site);
        }
        Ok(Self { sites: registry })
    }

    pub fn get(&self, name: &str) -> Option<&SiteConfig> {
        self.sites.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SiteConfig> {
        self.sites.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sites.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// A registry holding only the named site.
    pub fn only(&self, name: &str) -> Result<Self> {
        let site = self
            .get(name)
            .ok_or_else(|| Error::Config(format!("No site named '{}' in the registry", name)))?;
        Self::from_sites([site.clone()])
    }
}
