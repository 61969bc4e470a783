pub mod html;


use crate::config::SelectorConfig;
use crate::error::CrawlError;

/// What a rendered feed page tells us
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedPage {
    /// Raw hrefs of anchors inside result rows, in document order
    pub hrefs: Vec<String>,
    /// Current page number reported by the pagination indicator
    pub page_number: Option<u64>,
}

/// Parses feed page source using the configured selectors
pub struct FeedParser {
    rows: scraper::Selector,
    anchors: scraper::Selector,
    indicator: Option<scraper::Selector>,
}

impl FeedParser {
    pub fn new(selectors: &SelectorConfig) -> Result<Self, CrawlError> {
        Ok(Self {
            rows: html::selector(&selectors.row)?,
            anchors: html::selector("a[href]")?,
            indicator: selectors
                .page_indicator
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .map(html::selector)
                .transpose()?,
        })
    }

    pub fn parse(&self, source: &str) -> FeedPage {
        let doc = scraper::Html::parse_document(source);
        let hrefs = html::row_hrefs(&doc, &self.rows, &self.anchors);
        let page_number = self
            .indicator
            .as_ref()
            .and_then(|indicator| html::page_number(&doc, indicator));

        ::log::debug!(
            "Feed parser found {} row links (page indicator: {:?})",
            hrefs.len(),
            page_number
        );

        FeedPage { hrefs, page_number }
    }

    /// Read only the pagination indicator
    pub fn page_number(&self, source: &str) -> Option<u64> {
        let indicator = self.indicator.as_ref()?;
        html::page_number(&scraper::Html::parse_document(source), indicator)
    }
}
