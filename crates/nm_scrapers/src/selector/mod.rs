//! Selector expressions from the site configuration.
//!
//! A site may describe its headlines with CSS selectors or XPath. Both forms
//! compile into [`SelectorExpr`] and are evaluated the same way by the
//! scraper: once against the whole document for headlines, then relative to
//! each headline for its link.

use nm_core::{Error, Result};
use scraper::{ElementRef, Html, Selector};

pub mod xpath;

pub use xpath::XPath;

/// A node or string picked out of a page.
#[derive(Debug, Clone)]
pub enum Match<'a> {
    Element(ElementRef<'a>),
    /// An attribute value or text node, with the element it came from.
    Value { value: String, owner: ElementRef<'a> },
}

impl<'a> Match<'a> {
    pub fn text(&self) -> String {
        match self {
            Match::Element(el) => el.text().collect::<Vec<_>>().join(" "),
            Match::Value { value, .. } => value.clone(),
        }
    }

    /// The href of an element match, or the matched string itself.
    pub fn link(&self) -> Option<String> {
        match self {
            Match::Element(el) => el.value().attr("href").map(str::to_string),
            Match::Value { value, .. } => Some(value.clone()),
        }
    }

    /// The element to evaluate relative selectors against.
    pub fn anchor(&self) -> ElementRef<'a> {
        match self {
            Match::Element(el) => *el,
            Match::Value { owner, .. } => *owner,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SelectorExpr {
    Css { source: String, selector: Selector },
    XPath(XPath),
}

impl SelectorExpr {
    pub fn css(source: &str) -> Result<Self> {
        let selector = Selector::parse(source)
            .map_err(|e| Error::Config(format!("Invalid CSS selector '{}': {}", source, e)))?;
        Ok(SelectorExpr::Css {
            source: source.to_string(),
            selector,
        })
    }

    pub fn xpath(source: &str) -> Result<Self> {
        Ok(SelectorExpr::XPath(XPath::parse(source)?))
    }

    pub fn source(&self) -> &str {
        match self {
            SelectorExpr::Css { source, .. } => source,
            SelectorExpr::XPath(path) => path.source(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SelectorExpr::Css { .. } => "css",
            SelectorExpr::XPath(_) => "xpath",
        }
    }

    pub fn select_document<'a>(&self, document: &'a Html) -> Vec<Match<'a>> {
        match self {
            SelectorExpr::Css { selector, .. } => document.select(selector).map(Match::Element).collect(),
            SelectorExpr::XPath(path) => path.select_document(document),
        }
    }

    /// First match relative to `node`.
    ///
    /// CSS has no upward axis, so a CSS selector is tried against the node
    /// itself, then its descendants, then its ancestors nearest first. This
    /// covers both `<a><h2>..</h2></a>` and `<h2><a>..</a></h2>` layouts.
    pub fn select_relative<'a>(&self, node: ElementRef<'a>) -> Option<Match<'a>> {
        match self {
            SelectorExpr::Css { selector, .. } => {
                if selector.matches(&node) {
                    return Some(Match::Element(node));
                }
                node.select(selector)
                    .find(|el| el.id() != node.id())
                    .or_else(|| {
                        node.ancestors()
                            .filter_map(ElementRef::wrap)
                            .find(|ancestor| selector.matches(ancestor))
                    })
                    .map(Match::Element)
            }
            SelectorExpr::XPath(path) => path.select_from(node).into_iter().next(),
        }
    }
}
