
use crate::challenge::{ChallengeDetector, ChallengeTracker};
use crate::checkpoint::{CheckpointStore, CrawlState};
use crate::error::{CrawlError, CrawlFailure};
use crate::links::LinkSet;
use crate::navigator::{Navigator, SkipOutcome};
use crate::notifier::{ChallengeContext, Notifier};
use crate::results::ResultSink;
use chrono::Utc;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// States of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlPhase {
    Init,
    Resuming,
    FetchingPage,
    ChallengeWait,
    Advancing,
    Done,
    Failed,
}

/// How a run ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlOutcome {
    /// Pagination was exhausted and the checkpoint cleared
    Completed,
    /// A stop was requested; the checkpoint holds the last finished page
    Interrupted,
}

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlReport {
    pub outcome: CrawlOutcome,
    /// Unique links held at the end of the run
    pub total_links: usize,
    /// Links first discovered during this run
    pub new_links: usize,
    /// Pages processed across this and resumed runs
    pub pages_processed: u64,
    /// Challenge episodes waited out during this run
    pub challenges: u64,
}

/// Timing and limits for the crawl loop
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Feed location, used in operator alerts
    pub feed_url: String,
    /// Courtesy delay between pages
    pub page_delay: Duration,
    /// Re-check interval while a challenge is present
    pub poll_interval: Duration,
    /// Consecutive link-less pages that fail the run
    pub max_empty_pages: u32,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            feed_url: String::new(),
            page_delay: Duration::from_secs(1),
            poll_interval: Duration::from_secs(15),
            max_empty_pages: 5,
        }
    }
}

enum Step {
    Next(CrawlPhase),
    Interrupted,
}

/// Await `fut` unless `cancel` fires first
async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        output = fut => Some(output),
    }
}

/// Drives the navigator through the feed, persisting progress after every page.
///
/// The controller owns the collected set, the page counter and the challenge
/// episode state, and is the only writer of the checkpoint.
pub struct CrawlController {
    navigator: Box<dyn Navigator>,
    detector: Box<dyn ChallengeDetector>,
    notifier: Box<dyn Notifier>,
    sink: Box<dyn ResultSink>,
    checkpoint: CheckpointStore,
    settings: ControllerSettings,
    cancel: CancellationToken,

    collected: LinkSet,
    pages_processed: u64,
    pages_persisted: u64,
    links_at_start: usize,
    empty_streak: u32,
    challenge: ChallengeTracker,
    phase: CrawlPhase,
    resume_phase: CrawlPhase,
}

impl CrawlController {
    pub fn new(
        navigator: Box<dyn Navigator>,
        detector: Box<dyn ChallengeDetector>,
        notifier: Box<dyn Notifier>,
        sink: Box<dyn ResultSink>,
        checkpoint: CheckpointStore,
    ) -> Self {
        Self {
            navigator,
            detector,
            notifier,
            sink,
            checkpoint,
            settings: ControllerSettings::default(),
            cancel: CancellationToken::new(),
            collected: LinkSet::new(),
            pages_processed: 0,
            pages_persisted: 0,
            links_at_start: 0,
            empty_streak: 0,
            challenge: ChallengeTracker::new(),
            phase: CrawlPhase::Init,
            resume_phase: CrawlPhase::FetchingPage,
        }
    }

    pub fn with_settings(mut self, settings: ControllerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Stop the run promptly when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run until pagination is exhausted, a stop is requested, or a fatal error.
    ///
    /// On error the checkpoint is left as of the last finished page, so a new
    /// controller resumes it exactly like an interrupted run.
    pub async fn run(mut self) -> Result<CrawlReport, CrawlFailure> {
        let result = self.drive().await;
        self.navigator.close().await;

        result.map_err(|source| {
            self.transition(CrawlPhase::Failed);
            ::log::error!(
                "Crawl failed after {} persisted page(s): {}",
                self.pages_persisted,
                source
            );
            CrawlFailure {
                pages_persisted: self.pages_persisted,
                source,
            }
        })
    }

    async fn drive(&mut self) -> Result<CrawlReport, CrawlError> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(self.interrupted());
            }

            let step = match self.phase {
                CrawlPhase::Init => self.init().await?,
                CrawlPhase::Resuming => self.resume().await?,
                CrawlPhase::FetchingPage => self.fetch_page().await?,
                CrawlPhase::ChallengeWait => self.wait_out_challenge().await?,
                CrawlPhase::Advancing => self.advance().await?,
                CrawlPhase::Done => return self.finish(),
                CrawlPhase::Failed => unreachable!("a failed controller is consumed by run"),
            };

            match step {
                Step::Next(phase) => self.transition(phase),
                Step::Interrupted => return Ok(self.interrupted()),
            }
        }
    }

    fn transition(&mut self, next: CrawlPhase) {
        if next != self.phase {
            ::log::debug!("Crawl phase {:?} -> {:?}", self.phase, next);
            self.phase = next;
        }
    }

    async fn init(&mut self) -> Result<Step, CrawlError> {
        let state = self.checkpoint.load();
        self.collected = state.collected_urls.into_iter().collect();
        self.pages_processed = state.pages_processed;
        self.pages_persisted = state.pages_processed;
        self.links_at_start = self.collected.len();

        match until_cancelled(&self.cancel, self.navigator.open()).await {
            None => return Ok(Step::Interrupted),
            Some(result) => result?,
        }

        if self.pages_processed > 0 {
            Ok(Step::Next(CrawlPhase::Resuming))
        } else {
            Ok(Step::Next(CrawlPhase::FetchingPage))
        }
    }

    /// Divert to the challenge wait if the page is blocked, resuming at `phase` afterwards
    async fn challenge_gate(&mut self, phase: CrawlPhase) -> Option<Step> {
        let present = until_cancelled(&self.cancel, self.detector.is_challenge_present()).await;
        let Some(present) = present else {
            return Some(Step::Interrupted);
        };
        if present {
            self.resume_phase = phase;
            Some(Step::Next(CrawlPhase::ChallengeWait))
        } else {
            self.challenge.observe(false);
            None
        }
    }

    /// Turn a navigation error into a challenge wait when a challenge explains it
    async fn recover_or_fail(
        &mut self,
        phase: CrawlPhase,
        error: CrawlError,
    ) -> Result<Step, CrawlError> {
        if matches!(error, CrawlError::Navigation { .. }) {
            if let Some(step) = self.challenge_gate(phase).await {
                if matches!(step, Step::Next(_)) {
                    ::log::warn!("Navigation failed while a challenge is showing: {}", error);
                }
                return Ok(step);
            }
        }
        Err(error)
    }

    async fn resume(&mut self) -> Result<Step, CrawlError> {
        if let Some(step) = self.challenge_gate(CrawlPhase::Resuming).await {
            return Ok(step);
        }

        let pages = self.pages_processed;
        let outcome = match until_cancelled(&self.cancel, self.navigator.skip(pages)).await {
            None => return Ok(Step::Interrupted),
            Some(Ok(outcome)) => outcome,
            Some(Err(e)) => return self.recover_or_fail(CrawlPhase::Resuming, e).await,
        };

        match outcome {
            SkipOutcome::Positioned => {
                ::log::info!("Resumed after {} processed page(s)", pages);
                Ok(Step::Next(CrawlPhase::FetchingPage))
            }
            SkipOutcome::Exhausted => Ok(Step::Next(CrawlPhase::Done)),
        }
    }

    async fn fetch_page(&mut self) -> Result<Step, CrawlError> {
        if let Some(step) = self.challenge_gate(CrawlPhase::FetchingPage).await {
            return Ok(step);
        }

        let page = self.pages_processed + 1;
        ::log::info!("Processing page {}...", page);

        let links = match until_cancelled(&self.cancel, self.navigator.current_links()).await {
            None => return Ok(Step::Interrupted),
            Some(Ok(links)) => links,
            Some(Err(e)) => return self.recover_or_fail(CrawlPhase::FetchingPage, e).await,
        };

        if links.is_empty() {
            self.empty_streak += 1;
            if self.empty_streak >= self.settings.max_empty_pages {
                return Err(CrawlError::EmptyPages {
                    count: self.empty_streak,
                });
            }
            ::log::warn!(
                "Page {} yielded no links ({} in a row)",
                page,
                self.empty_streak
            );
        } else {
            self.empty_streak = 0;
        }

        let found = links.len();
        let new = self.collected.merge(links);
        self.pages_processed = page;
        self.persist()?;

        ::log::info!(
            "Page {}: {} links, {} new, {} unique in total",
            page,
            found,
            new,
            self.collected.len()
        );
        Ok(Step::Next(CrawlPhase::Advancing))
    }

    async fn wait_out_challenge(&mut self) -> Result<Step, CrawlError> {
        if self.challenge.observe(true) {
            ::log::warn!(
                "Bot or captcha challenge detected. Complete the verification manually in the browser window"
            );
            let context = ChallengeContext {
                feed_url: self.settings.feed_url.clone(),
                pages_processed: self.pages_processed,
                links_collected: self.collected.len(),
                detected_at: Utc::now(),
            };
            match until_cancelled(&self.cancel, self.notifier.notify(&context)).await {
                None => return Ok(Step::Interrupted),
                Some(Err(e)) => ::log::warn!("Failed to send bot challenge notification: {}", e),
                Some(Ok(())) => {}
            }
        }

        loop {
            let poll = tokio::time::sleep(self.settings.poll_interval);
            if until_cancelled(&self.cancel, poll).await.is_none() {
                return Ok(Step::Interrupted);
            }

            let present = until_cancelled(&self.cancel, self.detector.is_challenge_present()).await;
            let Some(present) = present else {
                return Ok(Step::Interrupted);
            };
            if !present {
                self.challenge.observe(false);
                ::log::info!("Challenge cleared; resuming crawl");
                return Ok(Step::Next(self.resume_phase));
            }
            ::log::trace!("Challenge still present");
        }
    }

    async fn advance(&mut self) -> Result<Step, CrawlError> {
        if let Some(step) = self.challenge_gate(CrawlPhase::Advancing).await {
            return Ok(step);
        }

        let has_next = match until_cancelled(&self.cancel, self.navigator.has_next()).await {
            None => return Ok(Step::Interrupted),
            Some(Ok(has_next)) => has_next,
            Some(Err(e)) => return self.recover_or_fail(CrawlPhase::Advancing, e).await,
        };
        if !has_next {
            ::log::info!("No further pages detected. Wrapping up");
            return Ok(Step::Next(CrawlPhase::Done));
        }

        match until_cancelled(&self.cancel, self.navigator.advance()).await {
            None => return Ok(Step::Interrupted),
            Some(Ok(())) => {}
            Some(Err(e)) => return self.recover_or_fail(CrawlPhase::Advancing, e).await,
        }

        if !self.settings.page_delay.is_zero() {
            ::log::debug!(
                "Sleeping {:.2}s before the next page",
                self.settings.page_delay.as_secs_f64()
            );
            let delay = tokio::time::sleep(self.settings.page_delay);
            if until_cancelled(&self.cancel, delay).await.is_none() {
                return Ok(Step::Interrupted);
            }
        }

        Ok(Step::Next(CrawlPhase::FetchingPage))
    }

    /// Write the checkpoint and the result file. Any failure is fatal.
    fn persist(&mut self) -> Result<(), CrawlError> {
        let state = CrawlState::snapshot(&self.collected, self.pages_processed);
        self.checkpoint.save(&state)?;
        self.pages_persisted = self.pages_processed;
        self.sink.write(&state.collected_urls)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<CrawlReport, CrawlError> {
        self.sink.write(&self.collected.sorted())?;
        self.checkpoint.clear()?;
        ::log::info!(
            "Crawl complete: {} unique report links across {} page(s)",
            self.collected.len(),
            self.pages_processed
        );
        Ok(self.report(CrawlOutcome::Completed))
    }

    fn interrupted(&self) -> CrawlReport {
        ::log::info!(
            "Crawl interrupted; progress saved through page {}",
            self.pages_persisted
        );
        self.report(CrawlOutcome::Interrupted)
    }

    fn report(&self, outcome: CrawlOutcome) -> CrawlReport {
        CrawlReport {
            outcome,
            total_links: self.collected.len(),
            new_links: self.collected.len().saturating_sub(self.links_at_start),
            pages_processed: self.pages_processed,
            challenges: self.challenge.episodes(),
        }
    }
}
