pub mod web;

use crate::error::CrawlError;
use crate::links::CollectedLink;
use async_trait::async_trait;

pub use web::WebNavigator;

/// Where a resume skip left the browser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipOutcome {
    /// Positioned on the first unprocessed page
    Positioned,
    /// Pagination ended before the target page was reached
    Exhausted,
}

/// Paginated browsing of the remote results feed.
///
/// This is the only way the crawl touches the browser, so tests can swap in a
/// scripted page sequence.
#[async_trait]
pub trait Navigator: Send {
    /// Load the first page of the feed
    async fn open(&mut self) -> Result<(), CrawlError>;

    /// Report links on the current page. May be empty.
    async fn current_links(&mut self) -> Result<Vec<CollectedLink>, CrawlError>;

    /// Whether an enabled "next page" control exists
    async fn has_next(&mut self) -> Result<bool, CrawlError>;

    /// Trigger the "next page" control, retrying with backoff
    async fn advance(&mut self) -> Result<(), CrawlError>;

    /// Move `pages` pages forward from the start of the feed
    async fn skip(&mut self, pages: u64) -> Result<SkipOutcome, CrawlError>;

    /// Release the browser session
    async fn close(&mut self) {}
}
