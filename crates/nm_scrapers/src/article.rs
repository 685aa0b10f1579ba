use lazy_static::lazy_static;
use nm_core::text::clean_text;
use nm_core::Result;
use scraper::{Html, Selector};
use url::Url;
use crate::fetch::PageFetcher;

lazy_static! {
    static ref PARAGRAPHS: Selector = Selector::parse("p").unwrap();
    static ref OG_IMAGE: Selector = Selector::parse("meta[property='og:image']").unwrap();
}

/// The readable part of an article page.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleBody {
    pub text: String,
    pub image: Option<String>,
}

/// Paragraph text of a page, or `None` when there is nothing to read.
pub fn extract_body(html: &str) -> Option<ArticleBody> {
    let document = Html::parse_document(html);
    let text = document
        .select(&PARAGRAPHS)
        .map(|p| clean_text(&p.text().collect::<String>()))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if text.is_empty() {
        return None;
    }

    let image = document
        .select(&OG_IMAGE)
        .filter_map(|meta| meta.value().attr("content"))
        .map(str::trim)
        .find(|content| !content.is_empty())
        .map(str::to_string);

    Some(ArticleBody { text, image })
}

pub async fn fetch_body(fetcher: &dyn PageFetcher, link: &str) -> Result<Option<ArticleBody>> {
    let url = Url::parse(link)?;
    let html = fetcher.fetch(&url).await?;
    Ok(extract_body(&html))
}
