//! HTML title extraction
//!
//! Pure and infallible: malformed or title-less documents produce [`NO_TITLE`]
//! rather than an error, since a missing title is not a pipeline failure.

use scraper::{Html, Selector};

/// Title recorded for pages without a usable title element
pub const NO_TITLE: &str = "No title";

/// Extracts the page title from raw HTML bytes
///
/// Title-like elements are checked in order: `<title>`, then
/// `<meta property="og:title">`. The first one with non-blank text wins; its
/// text is trimmed and inner whitespace runs are collapsed to one space.
///
/// # Example
///
/// ```
/// use pagetide::pipeline::extract_title;
///
/// assert_eq!(extract_title(b"<title> Hi </title>"), "Hi");
/// assert_eq!(extract_title(b"<html><body>no title here</body></html>"), "No title");
/// ```
pub fn extract_title(html: &[u8]) -> String {
    let source = String::from_utf8_lossy(html);
    let document = Html::parse_document(&source);

    title_element(&document)
        .or_else(|| og_title(&document))
        .unwrap_or_else(|| NO_TITLE.to_string())
}

fn title_element(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;

    document
        .select(&selector)
        .next()
        .map(|element| normalize_whitespace(&element.text().collect::<String>()))
        .filter(|s| !s.is_empty())
}

fn og_title(document: &Html) -> Option<String> {
    let selector = Selector::parse(r#"meta[property="og:title"][content]"#).ok()?;

    document
        .select(&selector)
        .filter_map(|element| element.value().attr("content"))
        .map(normalize_whitespace)
        .find(|s| !s.is_empty())
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
