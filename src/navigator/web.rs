use crate::config::{BrowserConfig, HarvestConfig, SelectorConfig};
use crate::error::CrawlError;
use crate::filter::LinkFilter;
use crate::links::CollectedLink;
use crate::navigator::{Navigator, SkipOutcome};
use crate::parsers::FeedParser;
use crate::utils::{backoff_delay, secs_f64};
use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::error::CmdError;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{Map, Value, json};
use std::future::Future;
use std::time::Duration;
use url::Url;

const SETTLE_POLL: Duration = Duration::from_millis(250);

/// Chrome options applied to every session
fn chrome_capabilities(headless: bool) -> Map<String, Value> {
    let mut args = vec![
        "--disable-gpu",
        "--window-size=1920,1200",
        "--no-sandbox",
        "--disable-dev-shm-usage",
        "--disable-blink-features=AutomationControlled",
    ];
    if headless {
        args.insert(0, "--headless=new");
    }

    let mut caps = Map::new();
    caps.insert(
        "goog:chromeOptions".to_string(),
        json!({ "args": args, "excludeSwitches": ["enable-automation"] }),
    );
    caps
}

async fn try_connect(url: &str, caps: &Map<String, Value>) -> Result<Client, String> {
    let mut builder = ClientBuilder::native();
    builder.capabilities(caps.clone());
    builder.connect(url).await.map_err(|e| e.to_string())
}

/// Connects to the WebDriver instance, trying common local ports if the configured one fails
pub async fn connect(config: &BrowserConfig) -> Result<Client, CrawlError> {
    let caps = chrome_capabilities(config.headless);

    let primary_error = match try_connect(&config.webdriver_url, &caps).await {
        Ok(client) => {
            ::log::debug!("Connected to WebDriver at {}", config.webdriver_url);
            return Ok(client);
        }
        Err(e) => e,
    };
    ::log::warn!(
        "Failed to connect to WebDriver at {}: {}",
        config.webdriver_url,
        primary_error
    );

    let fallback_urls = [
        "http://localhost:9515", // ChromeDriver default
        "http://localhost:4444", // Selenium / geckodriver default
        "http://127.0.0.1:4444",
    ];

    for url in fallback_urls.iter() {
        if *url == config.webdriver_url {
            continue;
        }

        ::log::info!("Trying fallback WebDriver URL: {}", url);
        if let Ok(client) = try_connect(url, &caps).await {
            ::log::debug!("Connected to fallback WebDriver at {}", url);
            return Ok(client);
        }
    }

    ::log::error!(
        "Make sure a WebDriver server is running or set the WEBDRIVER_URL environment variable"
    );
    Err(CrawlError::WebDriver(format!(
        "{}: {}",
        config.webdriver_url, primary_error
    )))
}

/// Runs `op` up to `attempts` times, sleeping with exponential backoff in between
async fn retry<T, E, F, Fut>(
    action: &str,
    attempts: u32,
    backoff_ms: u64,
    mut op: F,
) -> Result<T, CrawlError>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                ::log::warn!("Failed {} (attempt {}/{}): {}", action, attempt, attempts, e);
                last_error = e.to_string();
                if attempt < attempts {
                    tokio::time::sleep(backoff_delay(backoff_ms, attempt)).await;
                }
            }
        }
    }

    Err(CrawlError::navigation(action, last_error))
}

/// Whether a pagination control is usable, judged from its attributes
pub fn control_enabled(disabled: Option<&str>, aria_disabled: Option<&str>, class: Option<&str>) -> bool {
    if disabled.is_some() {
        return false;
    }
    if aria_disabled.is_some_and(|v| v.trim().eq_ignore_ascii_case("true")) {
        return false;
    }
    !class.unwrap_or_default().to_lowercase().contains("disabled")
}

/// Treat a wait that timed out as "not there"; other failures stay errors
fn absent_on_timeout<T>(lookup: Result<T, CmdError>) -> Result<Option<T>, CmdError> {
    match lookup {
        Ok(found) => Ok(Some(found)),
        Err(CmdError::WaitTimeout) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Next move while seeking the first unprocessed page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipStep {
    Arrived,
    Advance,
}

/// Decide the next skip move for `pages` processed pages.
///
/// The indicator wins when it is readable; otherwise `advanced` counts
/// clicks made since the feed was opened at its first page.
fn skip_step(current_page: Option<u64>, pages: u64, advanced: u64) -> SkipStep {
    match current_page {
        Some(current) if current > pages => SkipStep::Arrived,
        Some(_) => SkipStep::Advance,
        None if advanced >= pages => SkipStep::Arrived,
        None => SkipStep::Advance,
    }
}

/// Upper bound on skip iterations for `pages` processed pages
fn skip_attempts(pages: u64) -> u64 {
    (pages + 3).max(5)
}

async fn is_enabled(button: &Element) -> Result<bool, CmdError> {
    let disabled = button.attr("disabled").await?;
    let aria_disabled = button.attr("aria-disabled").await?;
    let class = button.attr("class").await?;
    Ok(control_enabled(
        disabled.as_deref(),
        aria_disabled.as_deref(),
        class.as_deref(),
    ))
}

/// Navigator driving a real browser through WebDriver
pub struct WebNavigator {
    client: Client,
    base_url: Url,
    selectors: SelectorConfig,
    parser: FeedParser,
    filter: LinkFilter,
    wait_timeout: Duration,
    max_retries: u32,
    retry_backoff_ms: u64,
    skip_delay: Duration,
}

impl WebNavigator {
    pub fn new(client: Client, config: &HarvestConfig) -> Result<Self, CrawlError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| CrawlError::Config(format!("base_url {:?}: {}", config.base_url, e)))?;

        Ok(Self {
            client,
            base_url,
            selectors: config.selectors.clone(),
            parser: FeedParser::new(&config.selectors)?,
            filter: LinkFilter::new(&config.link_filter)?,
            wait_timeout: Duration::from_secs(config.browser.wait_timeout_secs),
            max_retries: config.browser.max_retries,
            retry_backoff_ms: config.browser.retry_backoff_ms,
            skip_delay: secs_f64(config.page_delay_secs),
        })
    }

    /// Wait until the feed table is present, retrying with backoff
    async fn wait_for_table(&self) -> Result<(), CrawlError> {
        let client = &self.client;
        let table = self.selectors.table.as_str();
        let timeout = self.wait_timeout;

        retry(
            "waiting for the feed table",
            self.max_retries,
            self.retry_backoff_ms,
            || async move {
                client
                    .wait()
                    .at_most(timeout)
                    .for_element(Locator::Css(table))
                    .await
                    .map(|_| ())
            },
        )
        .await
    }

    async fn current_page_number(&self) -> Option<u64> {
        let source = self.client.source().await.ok()?;
        self.parser.page_number(&source)
    }

    /// After a click, give the feed time to replace its rows
    async fn settle(&self, previous_page: Option<u64>) {
        let Some(previous) = previous_page else {
            tokio::time::sleep(Duration::from_millis(500)).await;
            return;
        };

        let deadline = tokio::time::Instant::now() + self.wait_timeout;
        while tokio::time::Instant::now() < deadline {
            if let Some(current) = self.current_page_number().await {
                if current != previous {
                    ::log::debug!("Pagination moved from page {} to {}", previous, current);
                    return;
                }
            }
            tokio::time::sleep(SETTLE_POLL).await;
        }
        ::log::debug!(
            "Pagination indicator still reports page {} after advancing",
            previous
        );
    }
}

#[async_trait]
impl Navigator for WebNavigator {
    async fn open(&mut self) -> Result<(), CrawlError> {
        ::log::info!("Opening feed at {}", self.base_url);
        let client = &self.client;
        let url = self.base_url.as_str();
        retry(
            "opening the feed",
            self.max_retries,
            self.retry_backoff_ms,
            || async move { client.goto(url).await },
        )
        .await
    }

    async fn current_links(&mut self) -> Result<Vec<CollectedLink>, CrawlError> {
        self.wait_for_table().await?;

        let client = &self.client;
        let source = retry(
            "reading the page source",
            self.max_retries,
            self.retry_backoff_ms,
            || async move { client.source().await },
        )
        .await?;
        let page_url = self
            .client
            .current_url()
            .await
            .unwrap_or_else(|_| self.base_url.clone());

        let page = self.parser.parse(&source);
        let links: Vec<CollectedLink> = page
            .hrefs
            .iter()
            .filter_map(|href| self.filter.resolve(&page_url, href))
            .collect();

        ::log::info!(
            "Found {} report links on {} (indicator page {:?})",
            links.len(),
            page_url,
            page.page_number
        );
        Ok(links)
    }

    async fn has_next(&mut self) -> Result<bool, CrawlError> {
        let client = &self.client;
        let next = self.selectors.next_button.as_str();
        let timeout = self.wait_timeout;

        retry(
            "inspecting the next page control",
            self.max_retries,
            self.retry_backoff_ms,
            || async move {
                let lookup = client
                    .wait()
                    .at_most(timeout)
                    .for_element(Locator::Css(next))
                    .await;
                match absent_on_timeout(lookup)? {
                    Some(button) => is_enabled(&button).await,
                    None => {
                        ::log::info!("No next page control appeared within {:?}", timeout);
                        Ok(false)
                    }
                }
            },
        )
        .await
    }

    async fn advance(&mut self) -> Result<(), CrawlError> {
        let previous_page = self.current_page_number().await;
        let client = &self.client;
        let next = self.selectors.next_button.as_str();

        retry(
            "clicking the next page control",
            self.max_retries,
            self.retry_backoff_ms,
            || async move {
                let button = client.find(Locator::Css(next)).await?;
                match serde_json::to_value(&button) {
                    Ok(arg) => {
                        if let Err(e) = client
                            .execute(
                                "arguments[0].scrollIntoView({block: 'center'});",
                                vec![arg],
                            )
                            .await
                        {
                            ::log::debug!("Could not scroll the next control into view: {}", e);
                        }
                    }
                    Err(e) => ::log::debug!("Could not reference the next control: {}", e),
                }
                button.click().await
            },
        )
        .await?;

        self.settle(previous_page).await;
        self.wait_for_table().await
    }

    async fn skip(&mut self, pages: u64) -> Result<SkipOutcome, CrawlError> {
        if pages == 0 {
            return Ok(SkipOutcome::Positioned);
        }

        let target = pages + 1;
        let max_attempts = skip_attempts(pages);
        ::log::info!(
            "Skipping {} previously processed page(s) to reach page {}",
            pages,
            target
        );

        // Click counting is only meaningful from the first page
        self.wait_for_table().await?;
        if self.current_page_number().await.is_none() {
            ::log::debug!("No readable page indicator; reopening {} before skipping", self.base_url);
            self.open().await?;
        }

        let mut advanced = 0u64;
        for attempt in 1..=max_attempts {
            self.wait_for_table().await?;

            let current = self.current_page_number().await;
            if skip_step(current, pages, advanced) == SkipStep::Arrived {
                match current {
                    Some(current) if current > target => ::log::warn!(
                        "Pagination reports page {} beyond resume target {}; continuing from here",
                        current,
                        target
                    ),
                    _ => ::log::debug!("Positioned on page {}", target),
                }
                return Ok(SkipOutcome::Positioned);
            }
            if let Some(current) = current {
                ::log::debug!("On page {} while seeking page {}", current, target);
            }

            if !self.has_next().await? {
                ::log::info!("Reached the end of the feed while skipping processed pages");
                return Ok(SkipOutcome::Exhausted);
            }

            ::log::debug!(
                "Advancing to align with saved progress (attempt {}/{})",
                attempt,
                max_attempts
            );
            self.advance().await?;
            advanced += 1;

            if !self.skip_delay.is_zero() {
                tokio::time::sleep(self.skip_delay).await;
            }
        }

        Err(CrawlError::navigation(
            "skipping processed pages",
            format!("could not reach page {target} after {max_attempts} attempts"),
        ))
    }

    async fn close(&mut self) {
        if let Err(e) = self.client.clone().close().await {
            ::log::warn!("Failed to close WebDriver session: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_enabled() {
        assert!(control_enabled(None, None, Some("history-pagination__next")));
        assert!(control_enabled(None, Some("false"), None));
        assert!(!control_enabled(Some("true"), None, None));
        assert!(!control_enabled(Some(""), None, None));
        assert!(!control_enabled(None, Some("TRUE"), None));
        assert!(!control_enabled(None, None, Some("btn btn--Disabled")));
    }

    #[test]
    fn test_timed_out_wait_means_absent() {
        assert_eq!(absent_on_timeout(Ok(7)).unwrap(), Some(7));
        assert_eq!(absent_on_timeout::<u8>(Err(CmdError::WaitTimeout)).unwrap(), None);
        assert!(absent_on_timeout::<u8>(Err(CmdError::NotJson("<html>".into()))).is_err());
    }

    #[test]
    fn test_skip_step_follows_indicator() {
        // resume target is page 5
        assert_eq!(skip_step(Some(3), 4, 0), SkipStep::Advance);
        assert_eq!(skip_step(Some(5), 4, 0), SkipStep::Arrived);
        assert_eq!(skip_step(Some(6), 4, 0), SkipStep::Arrived);
        // the indicator outranks the click count
        assert_eq!(skip_step(Some(4), 4, 9), SkipStep::Advance);
    }

    #[test]
    fn test_skip_step_counts_clicks_without_indicator() {
        assert_eq!(skip_step(None, 4, 0), SkipStep::Advance);
        assert_eq!(skip_step(None, 4, 3), SkipStep::Advance);
        assert_eq!(skip_step(None, 4, 4), SkipStep::Arrived);
    }

    #[test]
    fn test_skip_attempt_bound() {
        assert_eq!(skip_attempts(1), 5);
        assert_eq!(skip_attempts(2), 5);
        assert_eq!(skip_attempts(10), 13);
    }

    #[test]
    fn test_headless_capabilities() {
        let caps = chrome_capabilities(true);
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert_eq!(args[0], "--headless=new");

        let caps = chrome_capabilities(false);
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(args.iter().all(|a| a != "--headless=new"));
        assert!(args.iter().any(|a| a == "--no-sandbox"));
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_attempts() {
        let mut calls = 0;
        let result: Result<(), CrawlError> = retry("testing", 3, 1, || {
            calls += 1;
            async { Err::<(), _>("not yet") }
        })
        .await;

        assert_eq!(calls, 3);
        assert!(matches!(result, Err(CrawlError::Navigation { .. })));
    }

    #[tokio::test]
    async fn test_retry_returns_first_success() {
        let mut calls = 0;
        let result = retry("testing", 3, 1, || {
            calls += 1;
            let outcome = if calls < 2 {
                Err("not yet")
            } else {
                Ok(calls)
            };
            async move { outcome }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
    }
}
