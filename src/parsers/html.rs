use crate::error::CrawlError;
use scraper::{Html, Selector};

/// Compile a CSS selector, reporting failures as configuration errors
pub fn selector(css: &str) -> Result<Selector, CrawlError> {
    Selector::parse(css).map_err(|e| CrawlError::Config(format!("invalid selector {css:?}: {e}")))
}

/// Hrefs of every anchor nested inside an element matching `rows`
pub fn row_hrefs(doc: &Html, rows: &Selector, anchors: &Selector) -> Vec<String> {
    doc.select(rows)
        .flat_map(|row| row.select(anchors))
        .filter_map(|a| a.value().attr("href"))
        .map(|s| s.to_string())
        .collect()
}

/// First element matching `indicator` whose trimmed text is a page number
pub fn page_number(doc: &Html, indicator: &Selector) -> Option<u64> {
    doc.select(indicator).find_map(|e| {
        let text = e.text().collect::<String>();
        text.trim().parse::<u64>().ok()
    })
}
