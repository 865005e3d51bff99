//! Listing page extractor
//!
//! Every structural lookup on the result listing lives here:
//! - Page count from the navigation landmark (`ol[role="navigation"]`)
//! - Result count from the results heading (`h3.heading`)
//! - One story record per listing element (`li[role="article"]`)
//!
//! Scalar fields absent from an element are recorded as `None`. The listing
//! omits them routinely depending on the kind of work.

use crate::output::StoryRecord;
use crate::url::story_id_from_link;
use crate::HarvestError;
use scraper::{ElementRef, Html, Selector};

/// Pagination metadata of a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub total_pages: u32,
    pub total_results: u64,
}

/// Listing element that ended extraction for its page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MalformedBoundary {
    /// Zero-based position among the page's listing elements
    pub element_index: usize,
    /// Hyperlinks found in it (always fewer than two)
    pub links_found: usize,
}

/// Records extracted from one page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    pub records: Vec<StoryRecord>,
    /// Elements with two links but no usable title or story link
    pub skipped: usize,
    /// Set when a link-poor element cut the page short
    pub boundary: Option<MalformedBoundary>,
}

/// Compiled selectors for the listing markup
#[derive(Debug, Clone)]
pub struct PageExtractor {
    navigation: Selector,
    anchor: Selector,
    results_heading: Selector,
    listing: Selector,
    summary: Selector,
    language: Selector,
    words: Selector,
    chapters: Selector,
    comments: Selector,
    kudos: Selector,
    hits: Selector,
}

fn selector(css: &str) -> Result<Selector, HarvestError> {
    Selector::parse(css).map_err(|_| HarvestError::Selector(css.to_string()))
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Parses a results heading such as `"1,234 Found"`
///
/// The first whitespace-delimited token, with thousands separators removed,
/// must be an integer.
pub fn parse_result_count(heading: &str) -> Option<u64> {
    heading
        .split_whitespace()
        .next()?
        .replace(',', "")
        .parse()
        .ok()
}

impl PageExtractor {
    pub fn new() -> Result<Self, HarvestError> {
        Ok(Self {
            navigation: selector(r#"ol[role="navigation"]"#)?,
            anchor: selector("a")?,
            results_heading: selector("h3.heading")?,
            listing: selector(r#"li[role="article"]"#)?,
            summary: selector("blockquote")?,
            language: selector("dd.language")?,
            words: selector("dd.words")?,
            chapters: selector("dd.chapters")?,
            comments: selector("dd.comments")?,
            kudos: selector("dd.kudos")?,
            hits: selector("dd.hits")?,
        })
    }

    /// Parses a page body into a document
    pub fn parse(&self, body: &str) -> Html {
        Html::parse_document(body)
    }

    /// Reads the page count and result count
    ///
    /// A listing without navigation has exactly one page.
    ///
    /// # Errors
    ///
    /// `HarvestError::Parse` if no results heading carries a count, or if the
    /// navigation's last page link is not a number.
    pub fn extract_pagination(&self, document: &Html, url: &str) -> Result<Pagination, HarvestError> {
        let total_pages = self.total_pages(document, url)?;

        let total_results = document
            .select(&self.results_heading)
            .find_map(|heading| parse_result_count(&text_of(heading)))
            .ok_or_else(|| HarvestError::Parse {
                url: url.to_string(),
                message: "no results heading with a result count".to_string(),
            })?;

        Ok(Pagination {
            total_pages,
            total_results,
        })
    }

    fn total_pages(&self, document: &Html, url: &str) -> Result<u32, HarvestError> {
        let Some(nav) = document.select(&self.navigation).next() else {
            return Ok(1);
        };

        // The final anchor is the "next" control; the one before it is the last page
        let links: Vec<ElementRef<'_>> = nav.select(&self.anchor).collect();
        let Some(last_page) = links.len().checked_sub(2).map(|i| links[i]) else {
            tracing::debug!("Navigation on {} has no page links, assuming 1 page", url);
            return Ok(1);
        };

        let text = text_of(last_page);
        text.replace(',', "")
            .parse::<u32>()
            .map_err(|_| HarvestError::Parse {
                url: url.to_string(),
                message: format!("last page link is not a number: {:?}", text),
            })
    }

    /// Extracts the story records of a page
    ///
    /// Elements are read in document order. An element with fewer than two
    /// hyperlinks ends extraction for the page; records already read are
    /// kept. An element whose first link lacks text or `href` is skipped.
    pub fn extract_records(&self, document: &Html) -> ListingPage {
        let mut page = ListingPage::default();

        for (index, element) in document.select(&self.listing).enumerate() {
            let links: Vec<ElementRef<'_>> = element.select(&self.anchor).take(2).collect();
            if links.len() < 2 {
                tracing::debug!(
                    "Listing element {} has {} link(s), ending page extraction",
                    index,
                    links.len()
                );
                page.boundary = Some(MalformedBoundary {
                    element_index: index,
                    links_found: links.len(),
                });
                break;
            }

            match self.record_from(element, links[0], links[1]) {
                Some(record) => page.records.push(record),
                None => {
                    tracing::debug!("Skipping listing element {} without title or link", index);
                    page.skipped += 1;
                }
            }
        }

        page
    }

    fn record_from(
        &self,
        element: ElementRef<'_>,
        story: ElementRef<'_>,
        author: ElementRef<'_>,
    ) -> Option<StoryRecord> {
        let title = text_of(story);
        let link = story.value().attr("href")?.trim().to_string();
        if title.is_empty() || link.is_empty() {
            return None;
        }

        Some(StoryRecord {
            story_id: story_id_from_link(&link),
            title,
            link,
            author: text_of(author),
            author_link: author
                .value()
                .attr("href")
                .map(|href| href.trim().to_string())
                .unwrap_or_default(),
            summary: self.field(element, &self.summary),
            language: self.field(element, &self.language),
            word_count: self.field(element, &self.words),
            chapters: self.field(element, &self.chapters),
            comments: self.field(element, &self.comments),
            kudos: self.field(element, &self.kudos),
            hits: self.field(element, &self.hits),
        })
    }

    /// Text of the first match; a present but empty element yields `Some("")`
    fn field(&self, element: ElementRef<'_>, selector: &Selector) -> Option<String> {
        element.select(selector).next().map(text_of)
    }

    /// Parses a body and extracts both pagination and records
    pub fn extract_page(
        &self,
        body: &str,
        url: &str,
    ) -> Result<(Pagination, ListingPage), HarvestError> {
        let document = self.parse(body);
        let pagination = self.extract_pagination(&document, url)?;
        Ok((pagination, self.extract_records(&document)))
    }

    /// Parses a body and extracts its records only
    pub fn extract_listing(&self, body: &str) -> ListingPage {
        self.extract_records(&self.parse(body))
    }
}
