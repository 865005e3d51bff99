use crate::UrlError;
use url::Url;

/// Query parameter carrying the 1-based page number
pub const PAGE_PARAM: &str = "page";

/// Parses a job's opening search URL
///
/// Only HTTP and HTTPS URLs are accepted.
pub fn parse_search_url(raw: &str) -> Result<Url, UrlError> {
    let url = Url::parse(raw.trim()).map_err(|e| UrlError::Parse(format!("{}: {}", raw, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(UrlError::InvalidScheme(other.to_string())),
    }
}

/// Builds the URL of a given result page
///
/// The page number is appended as a `page=<n>` query parameter. Existing query
/// parameters are preserved verbatim. A `page` parameter already present on
/// the base URL is replaced rather than duplicated.
///
/// # Examples
///
/// ```
/// use story_harvest::url::page_url;
/// use url::Url;
///
/// let base = Url::parse("https://example.org/works?tag_id=Poetry").unwrap();
/// let url = page_url(&base, 3).unwrap();
/// assert_eq!(url.as_str(), "https://example.org/works?tag_id=Poetry&page=3");
/// ```
pub fn page_url(base: &Url, page: u32) -> Result<Url, UrlError> {
    if page == 0 {
        return Err(UrlError::InvalidPage(page));
    }

    let mut url = base.clone();
    let has_page_param = base.query_pairs().any(|(key, _)| key == PAGE_PARAM);

    if has_page_param {
        let retained: Vec<(String, String)> = base
            .query_pairs()
            .filter(|(key, _)| key != PAGE_PARAM)
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (key, value) in &retained {
            pairs.append_pair(key, value);
        }
        pairs.append_pair(PAGE_PARAM, &page.to_string());
    } else {
        url.query_pairs_mut()
            .append_pair(PAGE_PARAM, &page.to_string());
    }

    Ok(url)
}

/// Derives the numeric story identifier from a story link
///
/// The identifier is the final path segment of the link, which may be
/// relative (`/works/12345`) or absolute.
pub fn story_id_from_link(link: &str) -> String {
    link.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}
