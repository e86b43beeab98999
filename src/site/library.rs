//! Parsing of the account's ebook library.

use super::offer::{Offer, normalize_whitespace};
use super::resolve_url;
use crate::config::BookFormat;
use crate::error::SiteError;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use url::Url;

/// CSS selectors used for parsing.
struct Selectors {
    /// Container whose direct children are the owned books.
    list: Selector,
    /// Any link inside a book entry.
    link: Selector,
    /// Title text inside a book entry.
    title: Selector,
}

static SELECTORS: LazyLock<Selectors> = LazyLock::new(|| Selectors {
    list: Selector::parse("#product-account-list").unwrap(),
    link: Selector::parse("a[href]").unwrap(),
    title: Selector::parse(".title").unwrap(),
});

/// A book listed in the account's library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedBook {
    /// Book identifier (`nid`).
    pub id: String,

    /// Book title.
    pub title: String,

    /// Every href found inside the book's entry.
    pub links: Vec<String>,
}

/// A resolved download link for an owned book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadLink {
    pub format: BookFormat,
    pub url: Url,
}

impl OwnedBook {
    /// Site-relative path the library uses for a format, if one can be built.
    ///
    /// Code bundles are published under the id following the book's own.
    fn format_path(&self, format: BookFormat) -> Option<String> {
        match format {
            BookFormat::Code => {
                let id: u64 = self.id.parse().ok()?;
                Some(format!("/code_download/{}", id + 1))
            }
            other => Some(format!("/ebook_download/{}/{}", self.id, other.name())),
        }
    }

    /// Builds download links for the requested formats.
    ///
    /// Formats the entry doesn't link to are skipped.
    pub fn download_links(
        &self,
        formats: &[BookFormat],
        base: &Url,
    ) -> Result<Vec<DownloadLink>, SiteError> {
        let mut links = Vec::new();

        for &format in formats {
            let Some(path) = self.format_path(format) else {
                continue;
            };

            if !self.links.iter().any(|href| href.trim_end_matches('/') == path) {
                tracing::debug!(book = %self.id, format = format.name(), "format not offered");
                continue;
            }

            if links.iter().any(|l: &DownloadLink| l.format == format) {
                continue;
            }

            links.push(DownloadLink {
                format,
                url: resolve_url(base, &path)?,
            });
        }

        Ok(links)
    }

    /// Checks whether this entry is the given offer, by id or by title.
    pub fn matches(&self, offer: &Offer) -> bool {
        self.id == offer.id || self.title.to_lowercase() == offer.title.to_lowercase()
    }
}

/// The account's library listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Library {
    pub books: Vec<OwnedBook>,
}

impl Library {
    /// Parses the library listing page.
    ///
    /// The list container must be present; an empty container is an empty library.
    pub fn parse(html: &str) -> Result<Self, SiteError> {
        let doc = Html::parse_document(html);

        let list = doc
            .select(&SELECTORS.list)
            .next()
            .ok_or_else(|| SiteError::ElementNotFound("library list".to_string()))?;

        let books = list
            .children()
            .filter_map(ElementRef::wrap)
            .filter_map(Self::parse_book)
            .collect();

        Ok(Self { books })
    }

    fn parse_book(elem: ElementRef<'_>) -> Option<OwnedBook> {
        let id = elem.value().attr("nid")?.trim().to_string();
        if id.is_empty() {
            return None;
        }

        let title = elem
            .value()
            .attr("title")
            .map(normalize_whitespace)
            .filter(|t| !t.is_empty())
            .or_else(|| {
                elem.select(&SELECTORS.title)
                    .next()
                    .map(|t| normalize_whitespace(&t.text().collect::<String>()))
            })
            .unwrap_or_default();

        let links = elem
            .select(&SELECTORS.link)
            .filter_map(|a| a.value().attr("href"))
            .map(|href| href.trim().to_string())
            .collect();

        Some(OwnedBook { id, title, links })
    }

    /// Finds the library entry for an offer.
    pub fn find(&self, offer: &Offer) -> Option<&OwnedBook> {
        self.books.iter().find(|book| book.matches(offer))
    }

    /// Checks whether the offer is already owned.
    pub fn owns(&self, offer: &Offer) -> bool {
        self.find(offer).is_some()
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}
