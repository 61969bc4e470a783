pub mod challenge;
pub mod checkpoint;
pub mod config;
pub mod controller;
pub mod error;
pub mod filter;
pub mod links;
pub mod navigator;
pub mod notifier;
pub mod parsers;
pub mod results;
pub mod utils;

// Re-export commonly used types for convenience
pub use config::HarvestConfig;
pub use controller::{CrawlController, CrawlOutcome, CrawlPhase, CrawlReport};
pub use error::{CrawlError, CrawlFailure};
pub use links::{CollectedLink, LinkSet};

use challenge::{ChallengeDetector, NoChallenge, WebChallengeDetector};
use checkpoint::CheckpointStore;
use controller::ControllerSettings;
use navigator::WebNavigator;
use results::CsvResultSink;
use tokio_util::sync::CancellationToken;

/// Main builder for a harvesting run against a live browser
pub struct Harvest {
    config: HarvestConfig,
    cancel: CancellationToken,
}

impl Harvest {
    pub fn new(config: HarvestConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop the run gracefully once this token is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Connect to the WebDriver, wire up the controller and crawl the feed
    pub async fn run(self) -> Result<CrawlReport, CrawlFailure> {
        let mut config = self.config;
        let checkpoint = CheckpointStore::new(&config.checkpoint_path);

        // Override the WebDriver URL with an environment variable if provided
        if let Ok(webdriver_url) = std::env::var("WEBDRIVER_URL") {
            if !webdriver_url.is_empty() {
                config.browser.webdriver_url = webdriver_url;
            }
        }

        let controller = match Self::build(&config, checkpoint.clone()).await {
            Ok(controller) => controller,
            Err(source) => {
                return Err(CrawlFailure {
                    pages_persisted: checkpoint.load().pages_processed,
                    source,
                });
            }
        };

        controller.with_cancellation(self.cancel).run().await
    }

    async fn build(
        config: &HarvestConfig,
        checkpoint: CheckpointStore,
    ) -> Result<CrawlController, CrawlError> {
        config.validate()?;

        let client = navigator::web::connect(&config.browser).await?;
        let navigator = match WebNavigator::new(client.clone(), config) {
            Ok(navigator) => navigator,
            Err(e) => {
                let _ = client.close().await;
                return Err(e);
            }
        };

        let detector: Box<dyn ChallengeDetector> = if config.challenge.enabled {
            Box::new(WebChallengeDetector::new(
                client,
                config.challenge.all_selectors(),
            ))
        } else {
            ::log::info!("Bot challenge detection disabled");
            Box::new(NoChallenge)
        };

        let settings = ControllerSettings {
            feed_url: config.base_url.clone(),
            page_delay: utils::secs_f64(config.page_delay_secs),
            poll_interval: utils::secs_f64(config.challenge.poll_interval_secs),
            max_empty_pages: config.max_empty_pages,
        };

        Ok(CrawlController::new(
            Box::new(navigator),
            detector,
            notifier::from_config(config.smtp.as_ref()),
            Box::new(CsvResultSink::new(&config.output_path)),
            checkpoint,
        )
        .with_settings(settings))
    }
}
