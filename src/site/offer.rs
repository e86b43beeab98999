//! Parsing of the free learning offer page.

use crate::error::SiteError;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;

/// Claim links look like `/freelearning-claim/{book id}/{offer id}`, sometimes absolute.
static CLAIM_PATH_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://[^/]+)?/?freelearning-claim/(\d+)/(\d+)/?$").unwrap()
});

/// CSS selectors used for parsing.
struct Selectors {
    /// Anchor inside the claim box.
    claim_link: Selector,
    /// Primary title selector (offer heading).
    title_primary: Selector,
    /// Fallback title selector (cover image).
    title_fallback: Selector,
}

static SELECTORS: LazyLock<Selectors> = LazyLock::new(|| Selectors {
    claim_link: Selector::parse(".free-ebook a[href]").unwrap(),
    title_primary: Selector::parse(".dotd-title h2").unwrap(),
    title_fallback: Selector::parse("img.bookimage").unwrap(),
});

/// The day's free book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offer {
    /// Book identifier, as used for `nid` in the library.
    pub id: String,

    /// Book title.
    pub title: String,

    /// Claim link; site-relative unless the page gave an absolute URL.
    pub claim_path: String,
}

impl Offer {
    /// Extracts the offer from the free learning page.
    pub fn parse(html: &str) -> Result<Self, SiteError> {
        let doc = Html::parse_document(html);

        let href = doc
            .select(&SELECTORS.claim_link)
            .next()
            .and_then(|a| a.value().attr("href"))
            .ok_or_else(|| SiteError::ElementNotFound("offer claim link".to_string()))?
            .trim();

        let id = Self::extract_book_id(href)?;
        let title = Self::extract_title(&doc)?;
        let claim_path = if href.starts_with("http://") || href.starts_with("https://") {
            href.to_string()
        } else {
            format!("/{}", href.trim_start_matches('/'))
        };

        Ok(Self {
            id,
            title,
            claim_path,
        })
    }

    /// Extracts the book id from a claim path.
    fn extract_book_id(href: &str) -> Result<String, SiteError> {
        CLAIM_PATH_REGEX
            .captures(href)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| SiteError::ParseError(format!("unrecognised claim link: {}", href)))
    }

    fn extract_title(doc: &Html) -> Result<String, SiteError> {
        if let Some(elem) = doc.select(&SELECTORS.title_primary).next() {
            let title = normalize_whitespace(&elem.text().collect::<String>());
            if !title.is_empty() {
                return Ok(title);
            }
        }

        // The cover image carries the title in its alt or title attribute
        if let Some(elem) = doc.select(&SELECTORS.title_fallback).next() {
            let attr = elem.value().attr("alt").or_else(|| elem.value().attr("title"));
            if let Some(title) = attr.map(normalize_whitespace).filter(|t| !t.is_empty()) {
                return Ok(title);
            }
        }

        Err(SiteError::ElementNotFound("offer title".to_string()))
    }
}

/// Collapses runs of whitespace into single spaces.
pub(crate) fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
